use crate::core::backup::Fuel;
use crate::core::climate::{ClimateError, ClimateProfile, TemperatureBin};
use crate::core::defrost::{DefrostDerating, DEFAULT_MANUFACTURER_DEFROST};
use crate::core::electric_rate::ElectricRate;
use crate::core::heat_pump::{
    CurveError, ExtrapolationPolicy, HeatPumpUnit, PerformanceCurve, PerformancePoint,
    DEFAULT_MAX_OPERATING_TEMP, DEFAULT_MIN_OPERATING_TEMP,
};
use crate::read_weather_file::WeatherFile;
use indexmap::IndexMap;
use serde::Deserialize;
use std::io::{BufReader, Read};
use thiserror::Error;
use tracing::debug;

/// Reference data a calculation draws on: climate, equipment, fuels, prices.
///
/// Implementations are shared read-only between concurrent calculations.
pub trait ReferenceLibrary: Sync {
    fn location(&self, location_id: &str) -> Result<&Location, LibraryError>;
    fn climate(&self, location_id: &str) -> Result<ClimateProfile, LibraryError>;
    fn heat_pump(&self, model_id: &str) -> Result<HeatPumpUnit, LibraryError>;
    fn fuel(&self, fuel_id: &str) -> Result<&Fuel, LibraryError>;
}

fn default_co2_lbs_per_kwh() -> f64 {
    1.1
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Location {
    pub name: String,
    pub climate: Option<ClimateData>,
    /// $ per fuel unit, keyed by fuel id
    #[serde(default)]
    pub fuel_prices: IndexMap<String, f64>,
    pub electric_rate: Option<ElectricRate>,
    /// pounds of CO2 per kWh of grid electricity
    #[serde(default = "default_co2_lbs_per_kwh")]
    pub co2_lbs_per_kwh: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClimateData {
    /// hourly temperatures in deg F from 1 January
    Hourly { temperatures: Vec<f64> },
    Bins { bins: Vec<TemperatureBin> },
}

fn default_min_operating_temp() -> f64 {
    DEFAULT_MIN_OPERATING_TEMP
}

fn default_max_operating_temp() -> f64 {
    DEFAULT_MAX_OPERATING_TEMP
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeatPumpSpec {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    pub performance: PerformanceData,
    #[serde(default = "default_min_operating_temp")]
    pub min_operating_temp: f64,
    #[serde(default = "default_max_operating_temp")]
    pub max_operating_temp: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum PerformanceData {
    /// manufacturer's published capacity and COP points
    Curve {
        points: Vec<PerformancePoint>,
        #[serde(default)]
        extrapolation: ExtrapolationPolicy,
        /// defaults to a fixed band below 40 deg F when not given
        defrost: Option<DefrostDerating>,
        /// minimum modulating output, in Btu/h
        #[serde(default)]
        min_output: f64,
    },
    /// rated efficiency, applied to the generic COP curve
    Hspf {
        hspf: f64,
        /// in kW
        max_input_power_5f: f64,
        /// in Btu/h
        capacity_5f_max: f64,
    },
}

impl HeatPumpSpec {
    pub fn to_unit(&self) -> Result<HeatPumpUnit, CurveError> {
        match &self.performance {
            PerformanceData::Curve {
                points,
                extrapolation,
                defrost,
                min_output,
            } => HeatPumpUnit::new(
                PerformanceCurve::new(points, *extrapolation)?,
                self.min_operating_temp,
                self.max_operating_temp,
                defrost.unwrap_or(DEFAULT_MANUFACTURER_DEFROST),
                *min_output,
            ),
            PerformanceData::Hspf {
                hspf,
                max_input_power_5f,
                capacity_5f_max,
            } => HeatPumpUnit::from_hspf(
                *hspf,
                *max_input_power_5f,
                *capacity_5f_max,
                self.min_operating_temp,
                self.max_operating_temp,
            ),
        }
    }
}

/// A reference library held in memory, typically loaded from a JSON file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InMemoryLibrary {
    #[serde(default)]
    locations: IndexMap<String, Location>,
    #[serde(default)]
    heat_pumps: IndexMap<String, HeatPumpSpec>,
    #[serde(default)]
    fuels: IndexMap<String, Fuel>,
}

impl InMemoryLibrary {
    pub fn from_json(json: impl Read) -> anyhow::Result<Self> {
        let library: Self = serde_json::from_reader(BufReader::new(json))?;
        debug!(
            locations = library.locations.len(),
            heat_pumps = library.heat_pumps.len(),
            fuels = library.fuels.len(),
            "reference library loaded"
        );
        Ok(library)
    }

    pub fn add_location(&mut self, location_id: &str, location: Location) {
        self.locations.insert(location_id.to_string(), location);
    }

    /// Use the hourly temperatures of a weather file as the climate of a location,
    /// creating the location if the library does not have it.
    pub fn with_weather_file(mut self, location_id: &str, weather: WeatherFile) -> Self {
        let climate = ClimateData::Hourly {
            temperatures: weather.air_temperatures,
        };
        match self.locations.get_mut(location_id) {
            Some(location) => location.climate = Some(climate),
            None => self.add_location(
                location_id,
                Location {
                    name: weather.site_name,
                    climate: Some(climate),
                    fuel_prices: IndexMap::new(),
                    electric_rate: None,
                    co2_lbs_per_kwh: default_co2_lbs_per_kwh(),
                },
            ),
        }
        self
    }
}

impl ReferenceLibrary for InMemoryLibrary {
    fn location(&self, location_id: &str) -> Result<&Location, LibraryError> {
        self.locations
            .get(location_id)
            .ok_or_else(|| LibraryError::unavailable("location", location_id))
    }

    fn climate(&self, location_id: &str) -> Result<ClimateProfile, LibraryError> {
        let climate = self
            .location(location_id)?
            .climate
            .as_ref()
            .ok_or_else(|| LibraryError::unavailable("climate", location_id))?;
        Ok(match climate {
            ClimateData::Hourly { temperatures } => ClimateProfile::from_hourly(temperatures)?,
            ClimateData::Bins { bins } => ClimateProfile::from_bins(bins)?,
        })
    }

    fn heat_pump(&self, model_id: &str) -> Result<HeatPumpUnit, LibraryError> {
        let spec = self
            .heat_pumps
            .get(model_id)
            .ok_or_else(|| LibraryError::unavailable("heat pump", model_id))?;
        Ok(spec.to_unit()?)
    }

    fn fuel(&self, fuel_id: &str) -> Result<&Fuel, LibraryError> {
        self.fuels
            .get(fuel_id)
            .ok_or_else(|| LibraryError::unavailable("fuel", fuel_id))
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("No {kind} data available for '{id}'")]
    DataUnavailable { kind: &'static str, id: String },
    #[error("Climate data in library is invalid: {0}")]
    InvalidClimate(#[from] ClimateError),
    #[error(transparent)]
    InvalidHeatPump(#[from] CurveError),
}

impl LibraryError {
    fn unavailable(kind: &'static str, id: &str) -> Self {
        Self::DataUnavailable {
            kind,
            id: id.to_string(),
        }
    }
}
