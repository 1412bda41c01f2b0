use crate::core::building::{BuildingLoadModel, LoadLine, LoadModelError};
use polyfit_rs::polyfit_rs::polyfit;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// This module calibrates a building load line against historical fuel bills.
///
/// Daily heat delivered by the existing system in each billing period is regressed
/// on heating degree-days per day for a range of candidate balance points; the
/// candidate giving the best fit is taken as the building's balance point and the
/// regression slope gives its UA.

pub const MIN_BILLING_PERIODS: usize = 6;

/// Spacing of the candidate balance points searched, in deg F.
const BALANCE_POINT_STEP: f64 = 0.5;

/// Minimum number of periods with heating degree-days needed for a regression.
const MIN_HEATING_PERIODS: usize = 3;

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingPeriod {
    pub days: f64,
    /// average outdoor temperature over the period, in deg F
    pub average_temperature: f64,
    /// fuel used by the existing heating system over the period, in the fuel's units
    pub fuel_used: f64,
}

/// Range of balance points considered physically plausible, in deg F: not below
/// the outdoor design temperature and not above the indoor setpoint.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationLimits {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Calibration {
    /// in Btu/h.degF
    pub ua: f64,
    /// in deg F
    pub balance_point: f64,
    /// heat delivered per day that does not depend on weather, in Btu/day
    pub base_load_per_day: f64,
    pub r_squared: f64,
    pub periods_used: usize,
}

impl Calibration {
    pub fn load_model(&self, indoor_setpoint: f64) -> Result<BuildingLoadModel, LoadModelError> {
        Ok(BuildingLoadModel::from_load_line(
            LoadLine::new(self.ua, self.balance_point)?,
            Some(indoor_setpoint),
        ))
    }
}

/// Arguments:
/// * `periods` - billing history of the existing heating system
/// * `btu_per_unit` - heat content of the fuel, in Btu per fuel unit
/// * `efficiency` - seasonal efficiency of the existing heating system
/// * `limits` - plausible range of balance points
pub fn calibrate(
    periods: &[BillingPeriod],
    btu_per_unit: f64,
    efficiency: f64,
    limits: CalibrationLimits,
) -> Result<Calibration, LoadModelError> {
    if periods.len() < MIN_BILLING_PERIODS {
        return Err(LoadModelError::InsufficientData {
            supplied: periods.len(),
            required: MIN_BILLING_PERIODS,
        });
    }
    for period in periods {
        if !(period.days.is_finite() && period.days > 0.)
            || !period.average_temperature.is_finite()
            || !(period.fuel_used.is_finite() && period.fuel_used >= 0.)
        {
            return Err(LoadModelError::InvalidParameter(format!(
                "Billing period is invalid: {period:?}"
            )));
        }
    }
    if !(limits.upper - limits.lower >= 2. * BALANCE_POINT_STEP) {
        return Err(LoadModelError::InvalidParameter(format!(
            "Balance point search range {} to {} deg F is too narrow",
            limits.lower, limits.upper
        )));
    }

    let heat_per_day = periods
        .iter()
        .map(|period| period.fuel_used * btu_per_unit * efficiency / period.days)
        .collect::<Vec<f64>>();

    let heating_periods = periods
        .iter()
        .filter(|period| period.average_temperature < limits.upper)
        .count();
    if heating_periods < MIN_HEATING_PERIODS {
        return Err(LoadModelError::InsufficientData {
            supplied: heating_periods,
            required: MIN_HEATING_PERIODS,
        });
    }

    let candidate_count = ((limits.upper - limits.lower) / BALANCE_POINT_STEP).floor() as usize;
    let mut best: Option<(usize, Fit)> = None;
    for step in 0..=candidate_count {
        let balance_point = limits.lower + step as f64 * BALANCE_POINT_STEP;
        let degree_days_per_day = periods
            .iter()
            .map(|period| (balance_point - period.average_temperature).max(0.))
            .collect::<Vec<f64>>();
        if degree_days_per_day.iter().filter(|dd| **dd > 0.).count() < MIN_HEATING_PERIODS {
            continue;
        }
        let Some(fit) = linear_fit(&degree_days_per_day, &heat_per_day)? else {
            continue;
        };
        if best
            .as_ref()
            .map_or(true, |(_, best_fit)| fit.r_squared > best_fit.r_squared)
        {
            best = Some((step, fit));
        }
    }

    let (step, fit) = best.ok_or(LoadModelError::InsufficientData {
        supplied: 0,
        required: MIN_HEATING_PERIODS,
    })?;
    let balance_point = limits.lower + step as f64 * BALANCE_POINT_STEP;
    debug!(
        balance_point,
        slope = fit.slope,
        r_squared = fit.r_squared,
        "building calibration best fit"
    );

    // without a period warmer than the balance point, any higher balance point
    // fits equally well and the missing heat ends up in the base load
    let warmest_temperature = periods
        .iter()
        .map(|period| period.average_temperature)
        .fold(f64::NEG_INFINITY, f64::max);
    if warmest_temperature <= balance_point {
        return Err(LoadModelError::UnidentifiableBalancePoint {
            balance_point,
            warmest_temperature,
        });
    }

    // a best fit at the edge of the search means the optimum lies outside the plausible range
    if step == 0 || step == candidate_count {
        return Err(LoadModelError::ImplausibleBalancePoint {
            balance_point,
            lower: limits.lower,
            upper: limits.upper,
        });
    }
    if fit.slope <= 0. {
        return Err(LoadModelError::NonPositiveSlope { slope: fit.slope });
    }

    Ok(Calibration {
        ua: fit.slope / 24.,
        balance_point,
        base_load_per_day: fit.intercept,
        r_squared: fit.r_squared,
        periods_used: periods.len(),
    })
}

struct Fit {
    intercept: f64,
    slope: f64,
    r_squared: f64,
}

fn linear_fit(x: &[f64], y: &[f64]) -> Result<Option<Fit>, LoadModelError> {
    let coeffs = polyfit(x, y, 1).map_err(|e| LoadModelError::Regression(e.to_string()))?;
    let (intercept, slope) = match coeffs.as_slice() {
        [intercept, slope] if intercept.is_finite() && slope.is_finite() => (*intercept, *slope),
        _ => return Ok(None),
    };

    let mean_y = y.iter().sum::<f64>() / y.len() as f64;
    let total_sum_squares: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
    let residual_sum_squares: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - (intercept + slope * xi)).powi(2))
        .sum();
    let r_squared = if total_sum_squares > 0. {
        1. - residual_sum_squares / total_sum_squares
    } else {
        0.
    };

    Ok(Some(Fit {
        intercept,
        slope,
        r_squared,
    }))
}
