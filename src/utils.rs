use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Tolerance used when checking that probabilities sum to one.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Compares two probabilities within [`PROBABILITY_EPSILON`].
///
/// ```
/// assert!(cykbender::utils::approx_eq(0.1 + 0.2, 0.3));
/// assert!(!cykbender::utils::approx_eq(0.3, 0.31));
/// ```
pub fn approx_eq(a: f64, b: f64) -> bool {
  (a - b).abs() <= PROBABILITY_EPSILON
}
