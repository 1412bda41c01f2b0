use crate::core::units::{btu_to_mmbtu, BTU_PER_MMBTU, MMBTU_PER_KWH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// This module represents the building's existing heating system, which
/// serves whatever load the heat pump does not. It has no capacity ceiling.

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Fuel {
    pub description: String,
    /// unit fuel is bought in, e.g. "gallon", "ccf", "kWh"
    pub unit: String,
    pub btu_per_unit: f64,
    /// pounds of CO2 emitted per MMBtu of fuel burned
    #[serde(default)]
    pub co2_lbs_per_mmbtu: f64,
    /// typical seasonal efficiency of a heating system burning this fuel
    pub default_efficiency: f64,
    /// electric resistance heat is bought through the electric rate
    #[serde(default)]
    pub is_electricity: bool,
}

/// Energy bought by the backup system to produce a quantity of heat.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BackupSupply {
    /// fuel energy burned (or electricity used for resistance heat), in MMBtu
    pub fuel_mmbtu: f64,
    /// fuel bought, in the fuel's units
    pub fuel_units: f64,
    /// auxiliary electricity for pumps, fans and burners, in kWh
    pub aux_kwh: f64,
}

#[derive(Clone, Debug)]
pub struct BackupSystem {
    fuel: Fuel,
    /// seasonal efficiency, or COP for electric resistance
    efficiency: f64,
    aux_kwh_per_mmbtu: f64,
}

impl BackupSystem {
    pub fn new(fuel: Fuel, efficiency: f64, aux_kwh_per_mmbtu: f64) -> Result<Self, BackupError> {
        if !(efficiency.is_finite() && efficiency > 0.) {
            return Err(BackupError::InvalidEfficiency(efficiency));
        }
        if !(fuel.btu_per_unit.is_finite() && fuel.btu_per_unit > 0.) {
            return Err(BackupError::InvalidFuel(format!(
                "Heat content of {} must be positive, got {} Btu/{}",
                fuel.description, fuel.btu_per_unit, fuel.unit
            )));
        }
        if !(aux_kwh_per_mmbtu.is_finite() && aux_kwh_per_mmbtu >= 0.) {
            return Err(BackupError::InvalidFuel(format!(
                "Auxiliary electricity use must be non-negative, got {aux_kwh_per_mmbtu} kWh/MMBtu"
            )));
        }

        Ok(Self {
            fuel,
            efficiency,
            aux_kwh_per_mmbtu,
        })
    }

    pub fn fuel(&self) -> &Fuel {
        &self.fuel
    }

    /// Energy needed to supply `output` Btu of heat to the building. Part of the
    /// heat comes from the auxiliary electricity, the rest from the fuel.
    pub fn supply(&self, output: f64) -> BackupSupply {
        if output <= 0. {
            return BackupSupply::default();
        }
        let fuel_heat_mmbtu =
            btu_to_mmbtu(output) / (1. + self.aux_kwh_per_mmbtu * MMBTU_PER_KWH);
        let fuel_mmbtu = fuel_heat_mmbtu / self.efficiency;

        BackupSupply {
            fuel_mmbtu,
            fuel_units: fuel_mmbtu * BTU_PER_MMBTU / self.fuel.btu_per_unit,
            aux_kwh: fuel_heat_mmbtu * self.aux_kwh_per_mmbtu,
        }
    }

    /// Heat (Btu) that a given supply delivers to the building.
    pub fn heat_delivered(&self, supply: &BackupSupply) -> f64 {
        (supply.fuel_mmbtu * self.efficiency + supply.aux_kwh * MMBTU_PER_KWH) * BTU_PER_MMBTU
    }
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup heating system efficiency must be positive, got {0}")]
    InvalidEfficiency(f64),
    #[error("{0}")]
    InvalidFuel(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn heating_oil() -> Fuel {
        Fuel {
            description: "#1 Oil".into(),
            unit: "gallon".into(),
            btu_per_unit: 135_000.,
            co2_lbs_per_mmbtu: 161.4,
            default_efficiency: 0.8,
            is_electricity: false,
        }
    }

    #[rstest]
    fn should_supply_heat_from_fuel(heating_oil: Fuel) {
        let boiler = BackupSystem::new(heating_oil, 0.8, 0.).unwrap();
        let supply = boiler.supply(1_080_000.);
        assert_relative_eq!(supply.fuel_mmbtu, 1.35);
        assert_relative_eq!(supply.fuel_units, 10.);
        assert_eq!(supply.aux_kwh, 0.);
    }

    #[rstest]
    fn should_split_output_between_fuel_and_aux_electricity(heating_oil: Fuel) {
        let boiler = BackupSystem::new(heating_oil, 0.8, 5.).unwrap();
        let supply = boiler.supply(10_000_000.);
        let fuel_heat = 10. / (1. + 5. * 0.003412);
        assert_relative_eq!(supply.fuel_mmbtu, fuel_heat / 0.8);
        assert_relative_eq!(supply.aux_kwh, fuel_heat * 5.);
        assert_relative_eq!(boiler.heat_delivered(&supply), 10_000_000., max_relative = 1e-12);
    }

    #[rstest]
    fn should_supply_nothing_for_no_output(heating_oil: Fuel) {
        let boiler = BackupSystem::new(heating_oil, 0.8, 5.).unwrap();
        assert_eq!(boiler.supply(0.), BackupSupply::default());
    }

    #[rstest]
    fn should_reject_invalid_backup(heating_oil: Fuel) {
        assert!(matches!(
            BackupSystem::new(heating_oil.clone(), 0., 0.),
            Err(BackupError::InvalidEfficiency(_))
        ));
        assert!(BackupSystem::new(heating_oil, 0.8, -1.).is_err());
    }
}
