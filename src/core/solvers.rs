use roots::{find_root_brent, SimpleConvergency};
use thiserror::Error;

/// Iteration cap for the root finders used in the economic analysis.
pub(crate) const MAX_ITERATIONS: usize = 100;

/// Root of `func` within the bracket [a, b] using Brent's method.
/// The function must change sign over the bracket.
pub(crate) fn brent(
    func: impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    xtol: f64,
) -> Result<f64, SolverError> {
    let mut convergency = SimpleConvergency {
        eps: xtol,
        max_iter: MAX_ITERATIONS,
    };

    find_root_brent::<f64, _>(a, b, func, &mut convergency)
        .map_err(|e| SolverError::NoConvergence(e.to_string()))
}

/// Scan [lower, upper] in steps of `step` for the first interval over which `func`
/// changes sign, then refine the root inside it. Returns Ok(None) if there is no
/// sign change in the range.
pub(crate) fn scan_and_refine(
    func: impl Fn(f64) -> f64,
    lower: f64,
    upper: f64,
    step: f64,
    xtol: f64,
) -> Result<Option<f64>, SolverError> {
    let steps = ((upper - lower) / step).ceil() as usize;
    let mut previous_x = lower;
    let mut previous_value = func(lower);
    if previous_value == 0. {
        return Ok(Some(lower));
    }

    for i in 1..=steps {
        let x = (lower + i as f64 * step).min(upper);
        let value = func(x);
        if value == 0. {
            return Ok(Some(x));
        }
        if value.is_finite()
            && previous_value.is_finite()
            && value.signum() != previous_value.signum()
        {
            return brent(&func, previous_x, x, xtol).map(Some);
        }
        previous_x = x;
        previous_value = value;
    }

    Ok(None)
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Root finder did not converge: {0}")]
    NoConvergence(String),
}
