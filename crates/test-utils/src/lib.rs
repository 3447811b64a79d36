//! Shared test utilities for the pointcast workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic forecast archive trees
//! - Production location fixtures
//! - Approximate float assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod archive;
pub mod fixtures;
pub mod paths;

// Re-export commonly used items at the crate root
pub use archive::*;
pub use fixtures::*;
pub use paths::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality for an optional cell value.
///
/// ```ignore
/// assert_cell_approx_eq!(table.float_column("t_2m").unwrap()[0], 280.5, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_cell_approx_eq {
    ($cell:expr, $expected:expr, $epsilon:expr) => {{
        match $cell {
            Some(value) => $crate::assert_approx_eq!(value, $expected, $epsilon),
            None => panic!("expected a value ≈ {:?}, found null", $expected),
        }
    }};
}
