use crate::core::backup::BackupSystem;
use crate::core::building::BuildingLoadModel;
use crate::core::climate::ClimateStep;
use crate::core::heat_pump::{CurveError, HeatPumpUnit};
use crate::core::units::{btu_to_kwh, btu_to_mmbtu, BTU_PER_MMBTU, KWH_PER_BTU, MONTHS_PER_YEAR};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// This module splits the building's heat load between the heat pump and the
/// backup system for every step of the year, and totals the energy used.

/// How load is shared between the heat pump and the backup system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// The heat pump meets as much load as it can; the backup system takes the rest.
    #[default]
    HeatPumpPriority,
}

/// Rates for one step of the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StepResult {
    /// in deg F
    pub temperature: f64,
    pub hours: f64,
    pub month: Option<u8>,
    /// building heat load, in Btu/h
    pub load: f64,
    /// in Btu/h
    pub heat_pump_output: f64,
    /// in kW
    pub heat_pump_power: f64,
    /// in Btu/h
    pub backup_output: f64,
    /// fuel energy burned by the backup system, in Btu/h
    pub backup_fuel_rate: f64,
    pub heat_pump_at_capacity: bool,
}

/// Energy use over a period. Quantities are per year of climate data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EnergyTotals {
    pub hours: f64,
    pub load_mmbtu: f64,
    pub heat_pump_output_mmbtu: f64,
    pub heat_pump_kwh: f64,
    pub backup_output_mmbtu: f64,
    /// fuel energy burned by the backup system (or used by resistance heat), in MMBtu
    pub backup_fuel_mmbtu: f64,
    /// fuel bought for the backup system, in fuel units (zero for electric backup)
    pub backup_fuel_units: f64,
    /// electricity bought for electric resistance backup heat
    pub backup_electric_kwh: f64,
    pub backup_aux_kwh: f64,
    /// highest heat pump electrical demand, in kW
    pub heat_pump_peak_kw: f64,
    pub hours_with_load: f64,
    pub hours_at_capacity: f64,
    pub hours_heat_pump_unavailable: f64,
}

impl EnergyTotals {
    fn add_step(
        &mut self,
        step: &StepResult,
        fuel_units_rate: f64,
        aux_kwh_rate: f64,
        electric_backup: bool,
    ) {
        let hours = step.hours;
        self.hours += hours;
        self.load_mmbtu += btu_to_mmbtu(step.load * hours);
        self.heat_pump_output_mmbtu += btu_to_mmbtu(step.heat_pump_output * hours);
        self.heat_pump_kwh += step.heat_pump_power * hours;
        self.backup_output_mmbtu += btu_to_mmbtu(step.backup_output * hours);
        self.backup_fuel_mmbtu += btu_to_mmbtu(step.backup_fuel_rate * hours);
        if electric_backup {
            self.backup_electric_kwh += btu_to_kwh(step.backup_fuel_rate * hours);
        } else {
            self.backup_fuel_units += fuel_units_rate * hours;
        }
        self.backup_aux_kwh += aux_kwh_rate * hours;
        self.heat_pump_peak_kw = self.heat_pump_peak_kw.max(step.heat_pump_power);
        if step.load > 0. {
            self.hours_with_load += hours;
        }
        if step.heat_pump_at_capacity {
            self.hours_at_capacity += hours;
        }
    }

    fn per_year(self, years: f64) -> Self {
        Self {
            hours: self.hours / years,
            load_mmbtu: self.load_mmbtu / years,
            heat_pump_output_mmbtu: self.heat_pump_output_mmbtu / years,
            heat_pump_kwh: self.heat_pump_kwh / years,
            backup_output_mmbtu: self.backup_output_mmbtu / years,
            backup_fuel_mmbtu: self.backup_fuel_mmbtu / years,
            backup_fuel_units: self.backup_fuel_units / years,
            backup_electric_kwh: self.backup_electric_kwh / years,
            backup_aux_kwh: self.backup_aux_kwh / years,
            heat_pump_peak_kw: self.heat_pump_peak_kw,
            hours_with_load: self.hours_with_load / years,
            hours_at_capacity: self.hours_at_capacity / years,
            hours_heat_pump_unavailable: self.hours_heat_pump_unavailable / years,
        }
    }

    /// All electricity used for heating: heat pump, resistance backup and auxiliaries.
    pub fn electricity_kwh(&self) -> f64 {
        self.heat_pump_kwh + self.backup_electric_kwh + self.backup_aux_kwh
    }

    /// Heat pump seasonal COP, or None if the heat pump did not run.
    pub fn seasonal_cop(&self) -> Option<f64> {
        if self.heat_pump_kwh > 0. {
            Some(self.heat_pump_output_mmbtu * BTU_PER_MMBTU * KWH_PER_BTU / self.heat_pump_kwh)
        } else {
            None
        }
    }

    /// Arguments:
    /// * `electric_co2_lbs_per_kwh` - emissions of grid electricity
    /// * `fuel_co2_lbs_per_mmbtu` - emissions of the backup fuel when it is burned
    pub fn co2_lbs(&self, electric_co2_lbs_per_kwh: f64, fuel_co2_lbs_per_mmbtu: f64) -> f64 {
        let burned_mmbtu = if self.backup_electric_kwh > 0. {
            0.
        } else {
            self.backup_fuel_mmbtu
        };
        self.electricity_kwh() * electric_co2_lbs_per_kwh + burned_mmbtu * fuel_co2_lbs_per_mmbtu
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DispatchResult {
    #[serde(skip)]
    pub steps: Vec<StepResult>,
    /// average year, Jan..Dec; empty when the climate data has no months
    pub monthly: Vec<EnergyTotals>,
    /// average year
    pub annual: EnergyTotals,
}

pub struct DispatchSimulator<'a> {
    building: &'a BuildingLoadModel,
    heat_pump: Option<&'a HeatPumpUnit>,
    backup: &'a BackupSystem,
    policy: DispatchPolicy,
}

impl<'a> DispatchSimulator<'a> {
    /// A simulator without a heat pump gives the baseline scenario.
    pub fn new(
        building: &'a BuildingLoadModel,
        heat_pump: Option<&'a HeatPumpUnit>,
        backup: &'a BackupSystem,
    ) -> Self {
        Self {
            building,
            heat_pump,
            backup,
            policy: DispatchPolicy::HeatPumpPriority,
        }
    }

    pub fn run(&self, steps: &[ClimateStep], years: u32) -> Result<DispatchResult, DispatchError> {
        let electric_backup = self.backup.fuel().is_electricity;
        let mut step_results = Vec::with_capacity(steps.len());
        let mut annual = EnergyTotals::default();
        let mut monthly = [EnergyTotals::default(); MONTHS_PER_YEAR];
        let has_months = !steps.is_empty() && steps.iter().all(|step| step.month.is_some());

        for step in steps {
            let (result, unavailable) = self.dispatch_step(step)?;

            // per unit time: fuel units and aux kWh for one hour at this step's rates
            let hourly_supply = self.backup.supply(result.backup_output);
            Self::check_balance(&result, self.backup.heat_delivered(&hourly_supply))?;

            let mut totals_for: Vec<&mut EnergyTotals> = vec![&mut annual];
            if let Some(month) = step.month.filter(|_| has_months) {
                totals_for.push(&mut monthly[(month - 1) as usize]);
            }
            for totals in totals_for {
                totals.add_step(
                    &result,
                    hourly_supply.fuel_units,
                    hourly_supply.aux_kwh,
                    electric_backup,
                );
                if unavailable {
                    totals.hours_heat_pump_unavailable += step.hours;
                }
            }
            step_results.push(result);
        }

        let years = years.max(1) as f64;
        let annual = annual.per_year(years);
        debug!(
            load_mmbtu = annual.load_mmbtu,
            heat_pump_kwh = annual.heat_pump_kwh,
            backup_output_mmbtu = annual.backup_output_mmbtu,
            with_heat_pump = self.heat_pump.is_some(),
            policy = ?self.policy,
            "dispatch complete"
        );

        Ok(DispatchResult {
            steps: step_results,
            monthly: if has_months {
                monthly.iter().map(|totals| totals.per_year(years)).collect()
            } else {
                vec![]
            },
            annual,
        })
    }

    /// Returns the step's rates and whether the heat pump was unavailable while heat was needed.
    fn dispatch_step(&self, step: &ClimateStep) -> Result<(StepResult, bool), DispatchError> {
        let load = self.building.load_at(step.temperature);
        let eligible = self.building.heat_pump_eligible_at(step.temperature);

        let mut heat_pump_output = 0.;
        let mut heat_pump_power = 0.;
        let mut at_capacity = false;
        let mut unavailable = false;

        if let Some(heat_pump) = self.heat_pump {
            let running = step.heat_pump_allowed && heat_pump.is_operating_at(step.temperature);
            if running {
                let operation = heat_pump.capacity_and_cop_at(step.temperature, eligible)?;
                heat_pump_output = operation.delivered;
                heat_pump_power = operation.electric_power;
                // the heat pump only runs flat out when it is asked for more than it has
                at_capacity = eligible > operation.available_capacity;
            } else if load > 0. {
                unavailable = true;
            }
        }

        let backup_output = (load - heat_pump_output).max(0.);
        let backup_fuel_rate = self.backup.supply(backup_output).fuel_mmbtu * BTU_PER_MMBTU;

        Ok((
            StepResult {
                temperature: step.temperature,
                hours: step.hours,
                month: step.month,
                load,
                heat_pump_output,
                heat_pump_power,
                backup_output,
                backup_fuel_rate,
                heat_pump_at_capacity: at_capacity,
            },
            unavailable,
        ))
    }

    fn check_balance(result: &StepResult, backup_heat: f64) -> Result<(), DispatchError> {
        let supplied = result.heat_pump_output + backup_heat;
        if !is_close!(supplied, result.load, rel_tol = 1e-9, abs_tol = 1e-6) {
            return Err(DispatchError::EnergyBalance {
                temperature: result.temperature,
                load: result.load,
                supplied,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error("Energy balance not met at {temperature} deg F: load {load} Btu/h, supplied {supplied} Btu/h")]
    EnergyBalance {
        temperature: f64,
        load: f64,
        supplied: f64,
    },
}
