use crate::core::defrost::DefrostDerating;
use crate::core::units::BTU_PER_KWH;
use interp::{interp, InterpMode};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// This module provides the performance model of an air-source mini-split heat
/// pump: capacity and COP as functions of outdoor temperature, described by
/// control points and interpolated linearly between them.

/// HSPF (Btu/Wh) of the unit that the generic COP curve was derived from.
pub const BASE_HSPF: f64 = 13.3;

/// Generic COP vs. outdoor temperature (deg F) for a unit with an HSPF of `BASE_HSPF`.
const GENERIC_COP_CURVE: [(f64, f64); 9] = [
    (-20., 1.1),
    (0., 2.0),
    (10., 2.2),
    (15., 2.3),
    (20., 2.5),
    (25., 2.7),
    (30., 2.8),
    (40., 3.0),
    (50., 3.2),
];

pub const DEFAULT_MIN_OPERATING_TEMP: f64 = -13.;
pub const DEFAULT_MAX_OPERATING_TEMP: f64 = 75.;

/// Minimum modulating output as a fraction of the maximum 5 deg F capacity.
pub const DEFAULT_TURNDOWN_FRACTION: f64 = 0.2;

/// Indoor setpoint that manufacturer performance data refers to, in deg F.
const RATED_INDOOR_TEMP: f64 = 70.;

/// Extra effective indoor temperature seen by indoor units mounted low on the wall.
const LOW_MOUNTING_PENALTY: f64 = 2.5;

/// Temperature at which the 5 deg F capacity is reported.
const REPORT_TEMP: f64 = 5.;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PerformancePoint {
    /// outdoor temperature, in deg F
    pub temperature: f64,
    /// maximum heat output, in Btu/h
    pub capacity: f64,
    pub cop: f64,
}

/// What to do where the operating range of a unit reaches beyond its performance data.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrapolationPolicy {
    /// Refuse to build the unit.
    Reject,
    /// Hold the end-point values flat.
    #[default]
    Clamp,
}

#[derive(Clone, Debug)]
pub struct PerformanceCurve {
    temperatures: Vec<f64>,
    capacities: Vec<f64>,
    cops: Vec<f64>,
    extrapolation: ExtrapolationPolicy,
}

impl PerformanceCurve {
    pub fn new(
        points: &[PerformancePoint],
        extrapolation: ExtrapolationPolicy,
    ) -> Result<Self, CurveError> {
        if points.is_empty() {
            return Err(CurveError::InvalidCurve(
                "A performance curve needs at least one control point".into(),
            ));
        }
        if let Some(point) = points.iter().find(|point| {
            !point.temperature.is_finite() || !point.capacity.is_finite() || !point.cop.is_finite()
        }) {
            return Err(CurveError::InvalidCurve(format!(
                "Control point contains a non-finite value: {point:?}"
            )));
        }
        if let Some(point) = points
            .iter()
            .find(|point| point.capacity < 0. || point.cop <= 0.)
        {
            return Err(CurveError::InvalidCurve(format!(
                "Control point must have non-negative capacity and positive COP: {point:?}"
            )));
        }

        let sorted = points
            .iter()
            .sorted_by(|a, b| OrderedFloat(a.temperature).cmp(&OrderedFloat(b.temperature)))
            .collect_vec();
        for (lower, upper) in sorted.iter().tuple_windows() {
            if lower.temperature == upper.temperature {
                return Err(CurveError::InvalidCurve(format!(
                    "Duplicate control point temperature {} deg F",
                    lower.temperature
                )));
            }
            if upper.capacity < lower.capacity || upper.cop < lower.cop {
                return Err(CurveError::InvalidCurve(format!(
                    "Capacity and COP must not fall as temperature rises, between {} and {} deg F",
                    lower.temperature, upper.temperature
                )));
            }
        }

        Ok(Self {
            temperatures: sorted.iter().map(|point| point.temperature).collect(),
            capacities: sorted.iter().map(|point| point.capacity).collect(),
            cops: sorted.iter().map(|point| point.cop).collect(),
            extrapolation,
        })
    }

    /// Temperature range covered by the control points
    pub fn domain(&self) -> (f64, f64) {
        (
            self.temperatures[0],
            self.temperatures[self.temperatures.len() - 1],
        )
    }

    /// Capacity (Btu/h) and COP at the given curve temperature.
    pub fn at(&self, temperature: f64) -> Result<(f64, f64), CurveError> {
        let (lower, upper) = self.domain();
        if (temperature < lower || temperature > upper)
            && self.extrapolation == ExtrapolationPolicy::Reject
        {
            return Err(CurveError::OutOfDomain {
                temperature,
                lower,
                upper,
            });
        }
        let temperature = temperature.clamp(lower, upper);

        // control points are reproduced exactly
        if let Ok(index) = self
            .temperatures
            .binary_search_by(|point| OrderedFloat(*point).cmp(&OrderedFloat(temperature)))
        {
            return Ok((self.capacities[index], self.cops[index]));
        }

        Ok((
            interp(
                &self.temperatures,
                &self.capacities,
                temperature,
                &InterpMode::FirstLast,
            ),
            interp(
                &self.temperatures,
                &self.cops,
                temperature,
                &InterpMode::FirstLast,
            ),
        ))
    }
}

/// Operating state of the heat pump for one time step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeatPumpOperation {
    /// in Btu/h
    pub available_capacity: f64,
    /// None when the unit is not running in this temperature
    pub cop: Option<f64>,
    /// in Btu/h
    pub delivered: f64,
    /// in kW
    pub electric_power: f64,
}

impl HeatPumpOperation {
    fn off() -> Self {
        Self {
            available_capacity: 0.,
            cop: None,
            delivered: 0.,
            electric_power: 0.,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HeatPumpUnit {
    curve: PerformanceCurve,
    min_operating_temp: f64,
    max_operating_temp: f64,
    defrost: DefrostDerating,
    /// minimum modulating output, in Btu/h
    min_output: f64,
    /// added to the outdoor temperature before looking up the curve
    curve_temperature_offset: f64,
    /// manufacturer's maximum capacity at 5 deg F, in Btu/h, where published
    rated_capacity_5f: Option<f64>,
}

impl HeatPumpUnit {
    pub fn new(
        curve: PerformanceCurve,
        min_operating_temp: f64,
        max_operating_temp: f64,
        defrost: DefrostDerating,
        min_output: f64,
    ) -> Result<Self, CurveError> {
        if !(min_operating_temp < max_operating_temp) {
            return Err(CurveError::InvalidCurve(format!(
                "Minimum operating temperature ({min_operating_temp}) must be below the maximum ({max_operating_temp})"
            )));
        }
        if !(min_output.is_finite() && min_output >= 0.) {
            return Err(CurveError::InvalidCurve(format!(
                "Minimum output must be non-negative, got {min_output}"
            )));
        }
        defrost.validate().map_err(CurveError::InvalidCurve)?;

        let unit = Self {
            curve,
            min_operating_temp,
            max_operating_temp,
            defrost,
            min_output,
            curve_temperature_offset: 0.,
            rated_capacity_5f: None,
        };
        unit.check_domain()?;
        Ok(unit)
    }

    /// Build a unit from the generic COP curve scaled to the unit's HSPF.
    ///
    /// Arguments:
    /// * `hspf` - heating seasonal performance factor, in Btu/Wh
    /// * `max_input_power_5f` - maximum electrical input at 5 deg F, in kW
    /// * `capacity_5f_max` - manufacturer's maximum capacity at 5 deg F, in Btu/h
    pub fn from_hspf(
        hspf: f64,
        max_input_power_5f: f64,
        capacity_5f_max: f64,
        min_operating_temp: f64,
        max_operating_temp: f64,
    ) -> Result<Self, CurveError> {
        if !(hspf > 0. && max_input_power_5f > 0. && capacity_5f_max > 0.) {
            return Err(CurveError::InvalidCurve(format!(
                "HSPF ({hspf}), input power ({max_input_power_5f}) and 5F capacity ({capacity_5f_max}) must be positive"
            )));
        }
        let cop_multiplier = hspf / BASE_HSPF;
        let points = GENERIC_COP_CURVE
            .iter()
            .map(|(temperature, cop)| {
                let cop = cop * cop_multiplier;
                PerformancePoint {
                    temperature: *temperature,
                    capacity: max_input_power_5f * cop * BTU_PER_KWH,
                    cop,
                }
            })
            .collect_vec();
        let curve = PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp)?;

        Ok(Self {
            rated_capacity_5f: Some(capacity_5f_max),
            ..Self::new(
                curve,
                min_operating_temp,
                max_operating_temp,
                DefrostDerating::None,
                DEFAULT_TURNDOWN_FRACTION * capacity_5f_max,
            )?
        })
    }

    /// Shift the curve lookup for an indoor setpoint other than the rated 70 deg F,
    /// and for indoor units mounted low on the wall.
    pub fn with_indoor_conditions(
        self,
        indoor_setpoint: Option<f64>,
        mounted_high: bool,
    ) -> Result<Self, CurveError> {
        let mut offset = indoor_setpoint.map_or(0., |setpoint| RATED_INDOOR_TEMP - setpoint);
        if !mounted_high {
            offset += LOW_MOUNTING_PENALTY;
        }
        let unit = Self {
            curve_temperature_offset: offset,
            ..self
        };
        unit.check_domain()?;
        Ok(unit)
    }

    fn check_domain(&self) -> Result<(), CurveError> {
        if self.curve.extrapolation == ExtrapolationPolicy::Clamp {
            return Ok(());
        }
        let (lower, upper) = self.curve.domain();
        let needed_lower = self.min_operating_temp + self.curve_temperature_offset;
        let needed_upper = self.max_operating_temp + self.curve_temperature_offset;
        if needed_lower < lower || needed_upper > upper {
            return Err(CurveError::InvalidCurve(format!(
                "Performance data covers {lower} to {upper} deg F but the unit operates from {needed_lower} to {needed_upper} deg F"
            )));
        }
        Ok(())
    }

    pub fn is_operating_at(&self, outdoor_temp: f64) -> bool {
        (self.min_operating_temp..=self.max_operating_temp).contains(&outdoor_temp)
    }

    /// Arguments:
    /// * `outdoor_temp` - in deg F
    /// * `requested_output` - heat demand the heat pump is asked to meet, in Btu/h
    pub fn capacity_and_cop_at(
        &self,
        outdoor_temp: f64,
        requested_output: f64,
    ) -> Result<HeatPumpOperation, CurveError> {
        if !self.is_operating_at(outdoor_temp) {
            return Ok(HeatPumpOperation::off());
        }

        let (capacity, cop) = self
            .curve
            .at(outdoor_temp + self.curve_temperature_offset)?;
        let derating = self.defrost.factor_at(outdoor_temp);
        let capacity = capacity * derating;
        let cop = cop * derating;

        let delivered = requested_output.max(0.).min(capacity);
        let electric_power = if delivered > 0. {
            // the compressor cannot modulate below its minimum output, so cycling
            // losses are charged as if it ran at that output
            let effective_output = delivered.max(self.min_output.min(capacity));
            effective_output / cop / BTU_PER_KWH
        } else {
            0.
        };

        Ok(HeatPumpOperation {
            available_capacity: capacity,
            cop: Some(cop),
            delivered,
            electric_power,
        })
    }

    /// Maximum output at 5 deg F, in Btu/h, or None if the unit does not run at 5 deg F.
    /// Never reported above the manufacturer's rated 5 deg F capacity.
    pub fn max_capacity_5f(&self) -> Result<Option<f64>, CurveError> {
        let operation = self.capacity_and_cop_at(REPORT_TEMP, f64::INFINITY)?;
        Ok(operation.cop.map(|_| {
            self.rated_capacity_5f
                .map_or(operation.available_capacity, |rated| {
                    operation.available_capacity.min(rated)
                })
        }))
    }
}

#[derive(Debug, Error)]
pub enum CurveError {
    #[error("Invalid heat pump performance curve: {0}")]
    InvalidCurve(String),
    #[error("Temperature {temperature} deg F is outside the performance data range {lower} to {upper} deg F")]
    OutOfDomain {
        temperature: f64,
        lower: f64,
        upper: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::defrost::DEFAULT_MANUFACTURER_DEFROST;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn points() -> Vec<PerformancePoint> {
        vec![
            PerformancePoint {
                temperature: 47.,
                capacity: 18_000.,
                cop: 3.8,
            },
            PerformancePoint {
                temperature: -15.,
                capacity: 9_000.,
                cop: 1.6,
            },
            PerformancePoint {
                temperature: 17.,
                capacity: 14_000.,
                cop: 2.6,
            },
            PerformancePoint {
                temperature: 5.,
                capacity: 12_000.,
                cop: 2.2,
            },
        ]
    }

    #[fixture]
    fn unit(points: Vec<PerformancePoint>) -> HeatPumpUnit {
        HeatPumpUnit::new(
            PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp).unwrap(),
            -13.,
            75.,
            DefrostDerating::None,
            3_000.,
        )
        .unwrap()
    }

    #[rstest]
    fn should_interpolate_between_sorted_points(points: Vec<PerformancePoint>) {
        let curve = PerformanceCurve::new(&points, ExtrapolationPolicy::Reject).unwrap();
        assert_eq!(curve.domain(), (-15., 47.));
        let (capacity, cop) = curve.at(11.).unwrap();
        assert_relative_eq!(capacity, 13_000.);
        assert_relative_eq!(cop, 2.4);
        assert_eq!(curve.at(47.).unwrap(), (18_000., 3.8));
    }

    #[rstest]
    fn should_apply_extrapolation_policy(points: Vec<PerformancePoint>) {
        let rejecting = PerformanceCurve::new(&points, ExtrapolationPolicy::Reject).unwrap();
        assert!(matches!(
            rejecting.at(60.),
            Err(CurveError::OutOfDomain { .. })
        ));
        let clamping = PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp).unwrap();
        assert_eq!(clamping.at(60.).unwrap(), (18_000., 3.8));
        assert_eq!(clamping.at(-30.).unwrap(), (9_000., 1.6));
    }

    #[rstest]
    fn should_reject_unit_operating_beyond_data_when_rejecting(points: Vec<PerformancePoint>) {
        let curve = PerformanceCurve::new(&points, ExtrapolationPolicy::Reject).unwrap();
        assert!(matches!(
            HeatPumpUnit::new(curve, -13., 75., DefrostDerating::None, 0.),
            Err(CurveError::InvalidCurve(_))
        ));
    }

    #[rstest]
    fn should_reject_non_monotone_curve(mut points: Vec<PerformancePoint>) {
        points[2].cop = 4.;
        assert!(matches!(
            PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp),
            Err(CurveError::InvalidCurve(_))
        ));
    }

    #[rstest]
    fn should_reject_invalid_points(mut points: Vec<PerformancePoint>) {
        assert!(PerformanceCurve::new(&[], ExtrapolationPolicy::Clamp).is_err());

        let mut duplicated = points.clone();
        duplicated.push(points[0]);
        assert!(PerformanceCurve::new(&duplicated, ExtrapolationPolicy::Clamp).is_err());

        points[1].cop = 0.;
        assert!(PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp).is_err());
    }

    #[rstest]
    fn should_be_off_outside_operating_range(unit: HeatPumpUnit) {
        let below = unit.capacity_and_cop_at(-13.5, 10_000.).unwrap();
        assert_eq!(below, HeatPumpOperation::off());
        let above = unit.capacity_and_cop_at(80., 10_000.).unwrap();
        assert_eq!(above.delivered, 0.);

        // the minimum operating temperature itself is inside the range
        let at_min = unit.capacity_and_cop_at(-13., 10_000.).unwrap();
        assert!(at_min.cop.is_some());
        assert!(at_min.delivered > 0.);
    }

    #[rstest]
    fn should_limit_delivered_to_capacity(unit: HeatPumpUnit) {
        let operation = unit.capacity_and_cop_at(5., 20_000.).unwrap();
        assert_eq!(operation.available_capacity, 12_000.);
        assert_eq!(operation.delivered, 12_000.);
        assert_relative_eq!(operation.electric_power, 12_000. / 2.2 / 3_412.);
    }

    #[rstest]
    fn should_charge_minimum_output_below_turndown(unit: HeatPumpUnit) {
        let operation = unit.capacity_and_cop_at(5., 1_000.).unwrap();
        assert_eq!(operation.delivered, 1_000.);
        assert_relative_eq!(operation.electric_power, 3_000. / 2.2 / 3_412.);

        let idle = unit.capacity_and_cop_at(5., 0.).unwrap();
        assert_eq!(idle.delivered, 0.);
        assert_eq!(idle.electric_power, 0.);
    }

    #[rstest]
    fn should_apply_defrost_to_capacity_and_cop(points: Vec<PerformancePoint>) {
        let unit = HeatPumpUnit::new(
            PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp).unwrap(),
            -13.,
            75.,
            DEFAULT_MANUFACTURER_DEFROST,
            0.,
        )
        .unwrap();
        let operation = unit.capacity_and_cop_at(5., 20_000.).unwrap();
        assert_relative_eq!(operation.available_capacity, 10_800.);
        assert_relative_eq!(operation.cop.unwrap(), 1.98);
    }

    #[rstest]
    fn should_be_monotone_in_temperature(points: Vec<PerformancePoint>) {
        let unit = HeatPumpUnit::new(
            PerformanceCurve::new(&points, ExtrapolationPolicy::Clamp).unwrap(),
            -13.,
            75.,
            DEFAULT_MANUFACTURER_DEFROST,
            0.,
        )
        .unwrap();
        let mut previous = (0., 0.);
        for tenth in -130..=750 {
            let operation = unit
                .capacity_and_cop_at(tenth as f64 / 10., f64::INFINITY)
                .unwrap();
            let cop = operation.cop.unwrap();
            assert!(operation.available_capacity >= previous.0);
            assert!(cop >= previous.1);
            previous = (operation.available_capacity, cop);
        }
    }

    #[rstest]
    fn should_shift_curve_for_indoor_conditions(unit: HeatPumpUnit) {
        // a 65F setpoint with low mounted units looks up the curve 7.5F warmer
        let shifted = unit.with_indoor_conditions(Some(65.), false).unwrap();
        let operation = shifted.capacity_and_cop_at(-2.5, 20_000.).unwrap();
        assert_relative_eq!(operation.available_capacity, 12_000.);
        assert_relative_eq!(operation.cop.unwrap(), 2.2);
    }

    #[rstest]
    fn should_build_from_hspf() {
        let unit = HeatPumpUnit::from_hspf(13.3, 2.0, 15_000., -13., 75.).unwrap();
        let operation = unit.capacity_and_cop_at(0., f64::INFINITY).unwrap();
        assert_relative_eq!(operation.cop.unwrap(), 2.0);
        assert_relative_eq!(operation.available_capacity, 2.0 * 2.0 * 3_412.);
        assert_relative_eq!(
            unit.max_capacity_5f().unwrap().unwrap(),
            2.0 * 2.1 * 3_412.,
            max_relative = 1e-12
        );

        let better = HeatPumpUnit::from_hspf(15.96, 2.0, 15_000., -13., 75.).unwrap();
        let operation = better.capacity_and_cop_at(0., f64::INFINITY).unwrap();
        assert_relative_eq!(operation.cop.unwrap(), 2.4, max_relative = 1e-12);
    }

    #[rstest]
    fn should_cap_5f_capacity_at_rated_value() {
        let unit = HeatPumpUnit::from_hspf(13.3, 3.0, 18_000., -13., 75.).unwrap();
        assert_eq!(unit.max_capacity_5f().unwrap(), Some(18_000.));
    }

    #[rstest]
    fn should_not_report_5f_capacity_when_unit_is_off_at_5f() {
        let unit = HeatPumpUnit::from_hspf(13.3, 2.0, 15_000., 10., 75.).unwrap();
        assert_eq!(unit.max_capacity_5f().unwrap(), None);
    }
}
