use crate::core::building::BuildingCharacteristics;
use crate::core::calibration::BillingPeriod;
use crate::core::climate::Resolution;
use crate::core::economics::CostInputs;
use crate::core::electric_rate::ElectricRate;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read};

pub fn ingest(json: impl Read) -> anyhow::Result<CalculationInput> {
    Ok(serde_json::from_reader(BufReader::new(json))?)
}

/// Everything one heat pump retrofit calculation needs besides the reference library.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CalculationInput {
    pub location_id: String,
    pub building: BuildingInput,
    pub heat_pump: HeatPumpInput,
    pub backup: BackupInput,
    #[serde(default)]
    pub electricity: ElectricityInput,
    pub costs: CostInputs,
    #[serde(default)]
    pub simulation: SimulationOptions,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "snake_case", deny_unknown_fields)]
pub enum BuildingInput {
    DesignLoad {
        /// in Btu/h
        design_heat_loss: f64,
        /// in deg F
        indoor_temp: f64,
        /// defaults to the 1% design temperature of the location's climate
        design_outdoor_temp: Option<f64>,
        /// in Btu/h
        #[serde(default)]
        internal_gains: f64,
    },
    LoadLine {
        /// in Btu/h.degF
        ua: f64,
        balance_point: f64,
        indoor_setpoint: Option<f64>,
    },
    Characteristics(BuildingCharacteristics),
    /// Fit the load line to fuel bills of the existing heating system.
    Calibrated {
        billing_periods: Vec<BillingPeriod>,
        indoor_setpoint: f64,
    },
}

fn default_true() -> bool {
    true
}

fn default_fraction_served() -> f64 {
    1.
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeatPumpInput {
    pub model_id: String,
    /// indoor units mounted low on the wall see a warmer return air temperature
    #[serde(default = "default_true")]
    pub indoor_units_mounted_high: bool,
    /// share of the main living space load the heat pump can reach
    #[serde(default = "default_fraction_served")]
    pub fraction_served: f64,
    #[serde(default)]
    pub garage_heated_by_heat_pump: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackupInput {
    pub fuel_id: String,
    /// defaults to the fuel's typical efficiency
    pub efficiency: Option<f64>,
    /// auxiliary electricity of the existing system, in kWh per MMBtu of heat from fuel
    #[serde(default)]
    pub aux_kwh_per_mmbtu: f64,
    /// in $ per fuel unit; defaults to the location's price
    pub fuel_price: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ElectricityInput {
    /// defaults to the location's rate
    pub rate: Option<ElectricRate>,
    /// household electricity use other than heating, in kWh per month
    #[serde(default)]
    pub base_monthly_kwh: f64,
    /// defaults to the location's grid emissions
    pub co2_lbs_per_kwh: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationOptions {
    #[serde(default)]
    pub resolution: Resolution,
    /// outdoor temperature (deg F) at or below which the heat pump is switched off
    pub low_temp_cutoff: Option<f64>,
}
