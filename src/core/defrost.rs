use serde::{Deserialize, Serialize};

/// Derating applied to heat pump capacity and COP in the frosting temperature range.
///
/// The factor never decreases as the outdoor temperature rises.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum DefrostDerating {
    /// No derating. Used where the performance data already includes defrost losses.
    #[default]
    None,
    /// A constant factor at and below `upper_temp`.
    FixedBand { upper_temp: f64, factor: f64 },
    /// A factor falling linearly from 1 at `upper_temp` to `min_factor` at
    /// `lower_temp`, and held at `min_factor` below that.
    Linear {
        upper_temp: f64,
        lower_temp: f64,
        min_factor: f64,
    },
}

/// Derating used for manufacturer curves that do not already include defrost losses.
pub const DEFAULT_MANUFACTURER_DEFROST: DefrostDerating = DefrostDerating::FixedBand {
    upper_temp: 40.,
    factor: 0.9,
};

impl DefrostDerating {
    pub fn validate(&self) -> Result<(), String> {
        let valid_factor = |factor: f64| factor > 0. && factor <= 1.;
        match *self {
            Self::None => Ok(()),
            Self::FixedBand { upper_temp, factor } => {
                if !upper_temp.is_finite() || !valid_factor(factor) {
                    return Err(format!(
                        "Defrost factor must be in (0, 1] with a finite upper temperature, got {factor} at {upper_temp} deg F"
                    ));
                }
                Ok(())
            }
            Self::Linear {
                upper_temp,
                lower_temp,
                min_factor,
            } => {
                if !(lower_temp < upper_temp) || !upper_temp.is_finite() || !lower_temp.is_finite()
                {
                    return Err(format!(
                        "Defrost lower temperature ({lower_temp}) must be below the upper temperature ({upper_temp})"
                    ));
                }
                if !valid_factor(min_factor) {
                    return Err(format!(
                        "Defrost minimum factor must be in (0, 1], got {min_factor}"
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn factor_at(&self, outdoor_temp: f64) -> f64 {
        match *self {
            Self::None => 1.,
            Self::FixedBand { upper_temp, factor } => {
                if outdoor_temp <= upper_temp {
                    factor
                } else {
                    1.
                }
            }
            Self::Linear {
                upper_temp,
                lower_temp,
                min_factor,
            } => {
                if outdoor_temp >= upper_temp {
                    1.
                } else if outdoor_temp <= lower_temp {
                    min_factor
                } else {
                    let fraction = (outdoor_temp - lower_temp) / (upper_temp - lower_temp);
                    min_factor + (1. - min_factor) * fraction
                }
            }
        }
    }
}
