use clap::Parser;
use log::info;
use ndarray::Array1;
use std::io::{self, BufRead, Write};
use tabular_mdp::GridWorld;
use thiserror::Error;

const HELP: &str = "
commands:
? - this help
w [<width>] - print or set width
h [<height>] - print or set height
t [<state>,...] - toggle terminal states, or print them if none given
r [<state>,... <reward> [<action>,...]] - set reward for taking actions in states
  (all actions if none given); print rewards if no arguments
s <state> <next_state>,... [<probability>,...] - set transition probabilities
  for every action in state (equally likely if probabilities not given)
eval - run policy evaluation for the random policy
vi - run value iteration
pi - run policy iteration
q - quit
";

/// Interactive grid world solver.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Grid width
    #[arg(default_value_t = 4)]
    width: usize,

    /// Grid height
    #[arg(default_value_t = 4)]
    height: usize,

    /// Stop iterating once the L1 change in values drops below this
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,

    /// Upper bound on iterations per run
    #[arg(long, default_value_t = 10_000)]
    max_iterations: usize,
}

#[derive(Debug, Error)]
enum ShellError {
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("unknown command")]
    UnknownCommand,
    #[error("solver stopped producing values")]
    Exhausted,
    #[error(transparent)]
    Mdp(#[from] tabular_mdp::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Help,
    Width(Option<usize>),
    Height(Option<usize>),
    Terminal(Option<Vec<usize>>),
    ShowRewards,
    Reward {
        states: Vec<usize>,
        reward: f64,
        actions: Option<Vec<usize>>,
    },
    Transition {
        state: usize,
        next_states: Vec<usize>,
        probabilities: Option<Vec<f64>>,
    },
    Evaluate,
    ValueIteration,
    PolicyIteration,
    Quit,
}

fn arg<T: std::str::FromStr>(args: &[&str], n: usize) -> Result<T, ShellError> {
    args.get(n)
        .ok_or(ShellError::InvalidArguments)?
        .parse()
        .map_err(|_| ShellError::InvalidArguments)
}

fn optional_arg<T: std::str::FromStr>(args: &[&str], n: usize) -> Result<Option<T>, ShellError> {
    if args.len() <= n {
        return Ok(None);
    }
    arg(args, n).map(Some)
}

fn list_arg<T: std::str::FromStr>(args: &[&str], n: usize) -> Result<Vec<T>, ShellError> {
    args.get(n)
        .ok_or(ShellError::InvalidArguments)?
        .split(',')
        .map(|v| v.parse().map_err(|_| ShellError::InvalidArguments))
        .collect()
}

fn optional_list_arg<T: std::str::FromStr>(
    args: &[&str],
    n: usize,
) -> Result<Option<Vec<T>>, ShellError> {
    if args.len() <= n {
        return Ok(None);
    }
    list_arg(args, n).map(Some)
}

fn parse(line: &str) -> Result<Command, ShellError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (cmd, args) = match tokens.split_first() {
        Some((cmd, args)) => (*cmd, args),
        None => return Err(ShellError::UnknownCommand),
    };

    let command = match cmd {
        "?" => Command::Help,
        "w" => Command::Width(optional_arg(args, 0)?),
        "h" => Command::Height(optional_arg(args, 0)?),
        "t" => Command::Terminal(optional_list_arg(args, 0)?),
        "r" if args.is_empty() => Command::ShowRewards,
        "r" => Command::Reward {
            states: list_arg(args, 0)?,
            reward: arg(args, 1)?,
            actions: optional_list_arg(args, 2)?,
        },
        "s" => Command::Transition {
            state: arg(args, 0)?,
            next_states: list_arg(args, 1)?,
            probabilities: optional_list_arg(args, 2)?,
        },
        "eval" => Command::Evaluate,
        "vi" => Command::ValueIteration,
        "pi" => Command::PolicyIteration,
        "q" => Command::Quit,
        _ => return Err(ShellError::UnknownCommand),
    };
    Ok(command)
}

/// Distribution over `n_states` putting `probabilities` (uniform when `None`)
/// on `next_states`.
fn transition_row(
    n_states: usize,
    next_states: &[usize],
    probabilities: Option<&[f64]>,
) -> Result<Array1<f64>, ShellError> {
    let mut row = Array1::zeros(n_states);
    let uniform = vec![1.0 / next_states.len() as f64; next_states.len()];
    let probabilities = probabilities.unwrap_or(&uniform[..]);
    if probabilities.len() != next_states.len() {
        return Err(ShellError::InvalidArguments);
    }
    for (&s, &p) in next_states.iter().zip(probabilities) {
        if s >= n_states {
            return Err(tabular_mdp::Error::InvalidState { state: s, n_states }.into());
        }
        row[s] += p;
    }
    Ok(row)
}

struct Shell {
    gw: GridWorld,
    tolerance: f64,
    max_iterations: usize,
}

impl Shell {
    /// Pulls from an endless solver sequence until epsilon drops below the
    /// tolerance or the iteration cap is reached.
    fn converge<T>(
        &self,
        steps: impl Iterator<Item = T>,
        epsilon: impl Fn(&T) -> f64,
    ) -> Result<(usize, T), ShellError> {
        let mut n = 0;
        for step in steps {
            n += 1;
            if epsilon(&step) < self.tolerance || n >= self.max_iterations {
                return Ok((n, step));
            }
        }
        Err(ShellError::Exhausted)
    }

    /// Runs one command. Returns `false` when the shell should exit.
    fn execute(&mut self, command: Command, out: &mut impl Write) -> Result<bool, ShellError> {
        match command {
            Command::Help => write!(out, "{}", HELP)?,
            Command::Width(None) => writeln!(out, "{}", self.gw.width())?,
            Command::Width(Some(w)) => self.gw.set_width(w)?,
            Command::Height(None) => writeln!(out, "{}", self.gw.height())?,
            Command::Height(Some(h)) => self.gw.set_height(h)?,
            Command::Terminal(None) => writeln!(out, "{:?}", self.gw.terminal_states())?,
            Command::Terminal(Some(states)) => {
                for s in states {
                    self.gw.toggle_terminal_state(s)?;
                }
            }
            Command::ShowRewards => write!(out, "{}", self.gw.render_rewards())?,
            Command::Reward {
                states,
                reward,
                actions,
            } => self.gw.set_rewards(&states, reward, actions.as_deref())?,
            Command::Transition {
                state,
                next_states,
                probabilities,
            } => {
                let row =
                    transition_row(self.gw.n_states(), &next_states, probabilities.as_deref())?;
                self.gw.set_transition_probs(state, row.view(), None)?;
            }
            Command::Evaluate => {
                let steps = self.gw.mdp().evaluate_policy(None, None)?;
                let (n, (v, epsilon)) = self.converge(steps, |(_, e)| *e)?;
                info!("policy evaluation stopped after {} iterations, epsilon {}", n, epsilon);
                write!(out, "{}", self.gw.render_values(&v))?;
            }
            Command::ValueIteration => {
                let steps = self.gw.mdp().value_iteration();
                let (n, (v, epsilon)) = self.converge(steps, |(_, e)| *e)?;
                info!("value iteration stopped after {} iterations, epsilon {}", n, epsilon);
                let policy = self.gw.mdp().greedy_policy(&v);
                let (values, policy) = (self.gw.render_values(&v), self.gw.render_policy(&policy));
                write!(out, "{}\n{}", values, policy)?;
            }
            Command::PolicyIteration => {
                let steps = self.gw.mdp().policy_iteration(None)?;
                let (n, (v, policy, epsilon)) = self.converge(steps, |(_, _, e)| *e)?;
                info!("policy iteration stopped after {} iterations, epsilon {}", n, epsilon);
                let (values, policy) = (self.gw.render_values(&v), self.gw.render_policy(&policy));
                write!(out, "{}\n{}", values, policy)?;
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let gw = match GridWorld::new(args.width, args.height, &[0]) {
        Ok(gw) => gw,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let mut shell = Shell {
        gw,
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse(line).and_then(|command| shell.execute(command, &mut stdout)) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => writeln!(stdout, "{}", e)?,
        }
    }
    Ok(())
}
