pub mod linear_system;

pub use linear_system::solve;
