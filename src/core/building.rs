use serde::{Deserialize, Serialize};
use thiserror::Error;

// This module provides the building heat load model: the rate of heat demand
// (Btu/h) as a function of outdoor temperature (deg F).
//
// The building is described by one or two straight load lines: the main living
// space and, optionally, an attached garage held at a lower setpoint. Each line
// is zero at and above its balance point and rises linearly with UA below it.

/// Garage heating setpoint, in deg F.
pub const GARAGE_HEATING_SETPOINT: f64 = 55.;

/// UA per square foot of floor area (Btu/h.degF.ft2) of a typical home with
/// 2x6 walls.
const UA_PER_FT2: f64 = 0.189;

/// Garages are leakier than the main home.
const GARAGE_UA_MULTIPLIER: f64 = 1.1;

/// UA adjustment for insulation levels 1 (2x4 walls), 2 (2x6 walls) and 3 (better than 2x6).
const INSULATION_UA_FACTORS: [f64; 3] = [1.25, 1., 0.75];

/// Internal and solar heating effect (deg F) of a level 2 home and garage.
const MAIN_HEATING_EFFECT: f64 = 10.;
const GARAGE_HEATING_EFFECT: f64 = 5.;

/// Floor area (ft2) of a garage by number of stalls.
const GARAGE_AREAS: [f64; 5] = [0., 14. * 22., 22. * 22., 36. * 25., 48. * 28.];

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LoadLine {
    /// heat loss coefficient, in Btu/h.degF
    ua: f64,
    /// outdoor temperature at and above which no heat is needed, in deg F
    balance_point: f64,
}

impl LoadLine {
    pub fn new(ua: f64, balance_point: f64) -> Result<Self, LoadModelError> {
        if !(ua.is_finite() && ua >= 0.) {
            return Err(LoadModelError::InvalidParameter(format!(
                "UA must be a non-negative number, got {ua}"
            )));
        }
        if !balance_point.is_finite() {
            return Err(LoadModelError::InvalidParameter(format!(
                "Balance point must be a finite temperature, got {balance_point}"
            )));
        }

        Ok(Self { ua, balance_point })
    }

    pub fn ua(&self) -> f64 {
        self.ua
    }

    pub fn balance_point(&self) -> f64 {
        self.balance_point
    }

    /// Heat demand in Btu/h at the given outdoor temperature
    pub fn load_at(&self, outdoor_temp: f64) -> f64 {
        if outdoor_temp >= self.balance_point {
            0.
        } else {
            self.ua * (self.balance_point - outdoor_temp)
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BuildingCharacteristics {
    /// heated floor area of the main home, in ft2
    pub floor_area: f64,
    /// 1 - 2x4 walls, 2 - 2x6 walls, 3 - better than 2x6 walls
    pub insulation_level: u8,
    /// in deg F
    pub indoor_setpoint: f64,
    #[serde(default)]
    pub garage_stalls: u8,
    /// multiplier used to true the estimate up to actual fuel use
    #[serde(default = "default_ua_true_up")]
    pub ua_true_up: f64,
}

fn default_ua_true_up() -> f64 {
    1.
}

#[derive(Clone, Debug)]
pub struct BuildingLoadModel {
    main: LoadLine,
    garage: Option<LoadLine>,
    indoor_setpoint: Option<f64>,
    /// fraction of the main space load the heat pump can reach
    fraction_served: f64,
    garage_heated_by_heat_pump: bool,
}

impl BuildingLoadModel {
    pub fn from_ua(ua: f64, balance_point: f64) -> Result<Self, LoadModelError> {
        Ok(Self::from_load_line(LoadLine::new(ua, balance_point)?, None))
    }

    /// Arguments:
    /// * `design_heat_loss` - heat loss rate at design conditions, in Btu/h
    /// * `indoor_temp` - indoor temperature the design heat loss refers to, in deg F
    /// * `design_outdoor_temp` - outdoor temperature the design heat loss refers to, in deg F
    /// * `internal_gains` - internal and solar gains offsetting the load, in Btu/h
    pub fn from_design_load(
        design_heat_loss: f64,
        indoor_temp: f64,
        design_outdoor_temp: f64,
        internal_gains: f64,
    ) -> Result<Self, LoadModelError> {
        if !(design_heat_loss.is_finite() && design_heat_loss > 0.) {
            return Err(LoadModelError::InvalidParameter(format!(
                "Design heat loss must be positive, got {design_heat_loss}"
            )));
        }
        if !(indoor_temp - design_outdoor_temp > 0.) {
            return Err(LoadModelError::InvalidParameter(format!(
                "Indoor temperature ({indoor_temp}) must be above the outdoor design temperature ({design_outdoor_temp})"
            )));
        }
        if !(internal_gains.is_finite() && internal_gains >= 0.) {
            return Err(LoadModelError::InvalidParameter(format!(
                "Internal gains must be non-negative, got {internal_gains}"
            )));
        }

        let ua = design_heat_loss / (indoor_temp - design_outdoor_temp);
        let balance_point = indoor_temp - internal_gains / ua;

        Ok(Self::from_load_line(
            LoadLine::new(ua, balance_point)?,
            Some(indoor_temp),
        ))
    }

    /// Estimate the load lines from the size and construction of the home.
    pub fn from_characteristics(
        characteristics: &BuildingCharacteristics,
    ) -> Result<Self, LoadModelError> {
        let BuildingCharacteristics {
            floor_area,
            insulation_level,
            indoor_setpoint,
            garage_stalls,
            ua_true_up,
        } = *characteristics;

        let insulation_factor = match insulation_level {
            1..=3 => INSULATION_UA_FACTORS[(insulation_level - 1) as usize],
            _ => {
                return Err(LoadModelError::InvalidParameter(format!(
                    "Insulation level must be 1, 2 or 3, got {insulation_level}"
                )))
            }
        };
        let garage_area = *GARAGE_AREAS.get(garage_stalls as usize).ok_or_else(|| {
            LoadModelError::InvalidParameter(format!(
                "Garage stall count must be between 0 and 4, got {garage_stalls}"
            ))
        })?;
        if !(floor_area.is_finite() && floor_area > 0.) {
            return Err(LoadModelError::InvalidParameter(format!(
                "Floor area must be positive, got {floor_area}"
            )));
        }
        if !(ua_true_up.is_finite() && ua_true_up > 0.) {
            return Err(LoadModelError::InvalidParameter(format!(
                "UA true-up factor must be positive, got {ua_true_up}"
            )));
        }

        let ua_home = UA_PER_FT2 * insulation_factor * floor_area * ua_true_up;
        let balance_point_home = indoor_setpoint - MAIN_HEATING_EFFECT / insulation_factor;
        let main = LoadLine::new(ua_home, balance_point_home)?;

        let garage = if garage_area > 0. {
            let ua_garage =
                UA_PER_FT2 * GARAGE_UA_MULTIPLIER * insulation_factor * garage_area * ua_true_up;
            let balance_point_garage =
                GARAGE_HEATING_SETPOINT - GARAGE_HEATING_EFFECT / insulation_factor;
            Some(LoadLine::new(ua_garage, balance_point_garage)?)
        } else {
            None
        };

        Ok(Self {
            garage,
            ..Self::from_load_line(main, Some(indoor_setpoint))
        })
    }

    pub(crate) fn from_load_line(main: LoadLine, indoor_setpoint: Option<f64>) -> Self {
        Self {
            main,
            garage: None,
            indoor_setpoint,
            fraction_served: 1.,
            garage_heated_by_heat_pump: false,
        }
    }

    /// Limit the heat pump to a share of the main space load (e.g. back bedrooms served
    /// by another heat source), and say whether it also heats the garage.
    pub fn with_heat_pump_coverage(
        self,
        fraction_served: f64,
        garage_heated_by_heat_pump: bool,
    ) -> Result<Self, LoadModelError> {
        if !(0. ..=1.).contains(&fraction_served) {
            return Err(LoadModelError::InvalidParameter(format!(
                "Fraction of the building served by the heat pump must be between 0 and 1, got {fraction_served}"
            )));
        }

        Ok(Self {
            fraction_served,
            garage_heated_by_heat_pump,
            ..self
        })
    }

    /// Total heat demand in Btu/h at the given outdoor temperature
    pub fn load_at(&self, outdoor_temp: f64) -> f64 {
        self.main.load_at(outdoor_temp) + self.garage_load_at(outdoor_temp)
    }

    /// Portion of the heat demand (Btu/h) that the heat pump is able to reach
    pub fn heat_pump_eligible_at(&self, outdoor_temp: f64) -> f64 {
        let garage_load = if self.garage_heated_by_heat_pump {
            self.garage_load_at(outdoor_temp)
        } else {
            0.
        };
        self.main.load_at(outdoor_temp) * self.fraction_served + garage_load
    }

    fn garage_load_at(&self, outdoor_temp: f64) -> f64 {
        self.garage
            .as_ref()
            .map_or(0., |garage| garage.load_at(outdoor_temp))
    }

    /// Outdoor temperature at and above which the whole building needs no heat
    pub fn balance_point(&self) -> f64 {
        match &self.garage {
            Some(garage) => self.main.balance_point.max(garage.balance_point),
            None => self.main.balance_point,
        }
    }

    pub fn ua(&self) -> f64 {
        self.main.ua + self.garage.as_ref().map_or(0., |garage| garage.ua)
    }

    pub fn indoor_setpoint(&self) -> Option<f64> {
        self.indoor_setpoint
    }

    /// Conventional design heat load (Btu/h), ignoring internal and solar gains.
    /// Where no indoor setpoint is known the balance point is used instead.
    pub fn design_heat_load(&self, design_temp: f64) -> f64 {
        let indoor = self.indoor_setpoint.unwrap_or(self.main.balance_point);
        let main = self.main.ua * (indoor - design_temp).max(0.);
        let garage = self.garage.as_ref().map_or(0., |garage| {
            garage.ua * (GARAGE_HEATING_SETPOINT - design_temp).max(0.)
        });
        main + garage
    }
}

#[derive(Debug, Error)]
pub enum LoadModelError {
    #[error("{0}")]
    InvalidParameter(String),
    #[error("At least {required} billing periods are needed to calibrate the building model, {supplied} were supplied")]
    InsufficientData { supplied: usize, required: usize },
    #[error("Calibrated balance point of {balance_point} deg F is outside the plausible range {lower} to {upper} deg F")]
    ImplausibleBalancePoint {
        balance_point: f64,
        lower: f64,
        upper: f64,
    },
    #[error("Balance point cannot be identified: the best fit of {balance_point} deg F is not below the warmest billing period ({warmest_temperature} deg F)")]
    UnidentifiableBalancePoint {
        balance_point: f64,
        warmest_temperature: f64,
    },
    #[error("Calibration found no increase in fuel use with colder weather (slope {slope} Btu/degF-day)")]
    NonPositiveSlope { slope: f64 },
    #[error("Regression of billing data failed: {0}")]
    Regression(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn typical_home() -> BuildingCharacteristics {
        BuildingCharacteristics {
            floor_area: 2000.,
            insulation_level: 2,
            indoor_setpoint: 70.,
            garage_stalls: 2,
            ua_true_up: 1.,
        }
    }

    #[rstest]
    fn should_have_zero_load_at_and_above_balance_point() {
        let building = BuildingLoadModel::from_ua(500., 60.).unwrap();
        assert_eq!(building.load_at(60.), 0.);
        assert_eq!(building.load_at(75.), 0.);
        assert_eq!(building.load_at(59.), 500.);
        assert_eq!(building.load_at(-20.), 40_000.);
    }

    #[rstest]
    fn should_be_non_increasing_with_temperature(typical_home: BuildingCharacteristics) {
        let building = BuildingLoadModel::from_characteristics(&typical_home).unwrap();
        let mut previous = f64::INFINITY;
        for tenth in -400..=800 {
            let load = building.load_at(tenth as f64 / 10.);
            assert!(load >= 0.);
            assert!(load <= previous);
            previous = load;
        }
    }

    #[rstest]
    fn should_build_from_design_load() {
        // 36,000 Btu/h at 70F indoor and -10F outdoor, with 4,500 Btu/h of gains
        let building = BuildingLoadModel::from_design_load(36_000., 70., -10., 4_500.).unwrap();
        assert_relative_eq!(building.ua(), 450.);
        assert_relative_eq!(building.balance_point(), 60.);
        assert_relative_eq!(building.design_heat_load(-10.), 36_000.);
        assert_eq!(building.indoor_setpoint(), Some(70.));
    }

    #[rstest]
    #[case(0., 70., -10., 0.)]
    #[case(36_000., -10., -10., 0.)]
    #[case(36_000., 70., -10., -1.)]
    fn should_reject_invalid_design_load(
        #[case] design_heat_loss: f64,
        #[case] indoor: f64,
        #[case] outdoor: f64,
        #[case] gains: f64,
    ) {
        assert!(BuildingLoadModel::from_design_load(design_heat_loss, indoor, outdoor, gains)
            .is_err());
    }

    #[rstest]
    fn should_estimate_from_characteristics(typical_home: BuildingCharacteristics) {
        let building = BuildingLoadModel::from_characteristics(&typical_home).unwrap();
        let ua_home = 0.189 * 2000.;
        let ua_garage = 0.189 * 1.1 * 484.;
        assert_relative_eq!(building.ua(), ua_home + ua_garage);
        // main home balance point 60F, garage 50F
        assert_relative_eq!(building.balance_point(), 60.);
        assert_relative_eq!(building.load_at(50.), ua_home * 10.);
        assert_relative_eq!(
            building.load_at(0.),
            ua_home * 60. + ua_garage * 50.,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_adjust_for_insulation_level(typical_home: BuildingCharacteristics) {
        let leaky = BuildingLoadModel::from_characteristics(&BuildingCharacteristics {
            insulation_level: 1,
            garage_stalls: 0,
            ..typical_home
        })
        .unwrap();
        let tight = BuildingLoadModel::from_characteristics(&BuildingCharacteristics {
            insulation_level: 3,
            garage_stalls: 0,
            ..typical_home
        })
        .unwrap();
        assert!(leaky.ua() > tight.ua());
        assert_relative_eq!(leaky.balance_point(), 62.);
        assert_relative_eq!(tight.balance_point(), 70. - 10. / 0.75);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(4, 0)]
    #[case(2, 5)]
    fn should_reject_invalid_characteristics(#[case] insulation_level: u8, #[case] stalls: u8) {
        let characteristics = BuildingCharacteristics {
            floor_area: 1500.,
            insulation_level,
            indoor_setpoint: 70.,
            garage_stalls: stalls,
            ua_true_up: 1.,
        };
        assert!(matches!(
            BuildingLoadModel::from_characteristics(&characteristics),
            Err(LoadModelError::InvalidParameter(_))
        ));
    }

    #[rstest]
    fn should_split_load_served_by_heat_pump(typical_home: BuildingCharacteristics) {
        let building = BuildingLoadModel::from_characteristics(&typical_home)
            .unwrap()
            .with_heat_pump_coverage(0.5, false)
            .unwrap();
        let ua_home = 0.189 * 2000.;
        assert_relative_eq!(building.heat_pump_eligible_at(0.), ua_home * 60. * 0.5);
        assert!(building.heat_pump_eligible_at(0.) < building.load_at(0.));

        let whole = BuildingLoadModel::from_characteristics(&typical_home)
            .unwrap()
            .with_heat_pump_coverage(1., true)
            .unwrap();
        assert_eq!(whole.heat_pump_eligible_at(0.), whole.load_at(0.));

        assert!(BuildingLoadModel::from_ua(100., 60.)
            .unwrap()
            .with_heat_pump_coverage(1.2, false)
            .is_err());
    }

    #[rstest]
    fn should_calc_design_heat_load_with_garage(typical_home: BuildingCharacteristics) {
        let building = BuildingLoadModel::from_characteristics(&typical_home).unwrap();
        let ua_home = 0.189 * 2000.;
        let ua_garage = 0.189 * 1.1 * 484.;
        assert_relative_eq!(
            building.design_heat_load(-20.),
            ua_home * 90. + ua_garage * 75.,
            max_relative = 1e-12
        );
    }
}
