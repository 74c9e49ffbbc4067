use ndarray::{Array1, Array2};

/// Pivots smaller than this are treated as zero.
pub const SINGULAR_PIVOT: f64 = 1e-10;

/// Solves the square system `a * x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when `a` is singular (some pivot falls below [`SINGULAR_PIVOT`])
/// or when the dimensions of `a` and `b` disagree.
///
/// # Examples
///
/// ```
/// use ndarray::{array, Array1};
/// use tabular_mdp::math::linear_system::solve;
///
/// let a = array![[2.0, 1.0], [1.0, 3.0]];
/// let b = array![3.0, 5.0];
/// let x: Array1<f64> = solve(&a, &b).unwrap();
///
/// assert!((x[0] - 0.8).abs() < 1e-12);
/// assert!((x[1] - 1.4).abs() < 1e-12);
/// ```
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }

    // Augmented matrix [a | b]
    let mut augmented = Array2::<f64>::zeros((n, n + 1));
    augmented.slice_mut(ndarray::s![.., ..n]).assign(a);
    augmented.column_mut(n).assign(b);

    for i in 0..n {
        let mut max_idx = i;
        let mut max_val = augmented[[i, i]].abs();
        for j in (i + 1)..n {
            let val = augmented[[j, i]].abs();
            if val > max_val {
                max_idx = j;
                max_val = val;
            }
        }

        if max_val < SINGULAR_PIVOT {
            return None;
        }

        if max_idx != i {
            for k in i..=n {
                augmented.swap([i, k], [max_idx, k]);
            }
        }

        let pivot_row = augmented.row(i).to_owned();
        let pivot = pivot_row[i];
        for j in (i + 1)..n {
            let factor = augmented[[j, i]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in i..=n {
                augmented[[j, k]] -= factor * pivot_row[k];
            }
        }
    }

    // Back substitution
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = augmented[[i, n]];
        for j in (i + 1)..n {
            sum -= augmented[[i, j]] * x[j];
        }
        x[i] = sum / augmented[[i, i]];
    }

    Some(x)
}
