pub mod core;
pub mod errors;
pub mod input;
pub mod library;
pub mod output;
pub mod read_weather_file;
pub mod results;
mod statistics;

#[macro_use]
extern crate is_close;

use crate::core::backup::{BackupSystem, Fuel};
use crate::core::building::{BuildingLoadModel, LoadLine};
use crate::core::calibration::{calibrate, Calibration, CalibrationLimits};
use crate::core::dispatch::DispatchSimulator;
use crate::core::economics::{analyze, AnnualCosts};
use crate::errors::HpCalcError;
use crate::input::{BuildingInput, CalculationInput};
use crate::library::{LibraryError, ReferenceLibrary};
use crate::output::Output;
use crate::results::{assemble, AssemblyParts, CalculationResult, DesignSummary, Valuation};
use csv::WriterBuilder;
use rayon::prelude::*;
use std::io::Write;
use tracing::{debug, info};

/// Run one heat pump retrofit calculation: simulate the year with and without the
/// heat pump, then compare the two over the analysis horizon.
pub fn run_calculation<L: ReferenceLibrary + ?Sized>(
    input: &CalculationInput,
    library: &L,
) -> Result<CalculationResult, HpCalcError> {
    info!(
        location = %input.location_id,
        heat_pump = %input.heat_pump.model_id,
        "running heat pump calculation"
    );

    let location = library.location(&input.location_id)?;
    let climate = library.climate(&input.location_id)?;
    let fuel = library.fuel(&input.backup.fuel_id)?.clone();
    let unit = library.heat_pump(&input.heat_pump.model_id)?;

    let efficiency = input.backup.efficiency.unwrap_or(fuel.default_efficiency);
    let design_temperature = climate.design_temperature();
    let (building, calibration) =
        building_load_model(&input.building, design_temperature, &fuel, efficiency)?;
    let building = building.with_heat_pump_coverage(
        input.heat_pump.fraction_served,
        input.heat_pump.garage_heated_by_heat_pump,
    )?;
    let unit = unit.with_indoor_conditions(
        building.indoor_setpoint(),
        input.heat_pump.indoor_units_mounted_high,
    )?;
    let backup = BackupSystem::new(fuel, efficiency, input.backup.aux_kwh_per_mmbtu)?;
    debug!(
        design_temperature,
        ua = building.ua(),
        balance_point = building.balance_point(),
        "building load model ready"
    );

    let steps = climate.time_steps(
        input.simulation.resolution,
        input.simulation.low_temp_cutoff,
    )?;
    let years = climate.years();
    let baseline = DispatchSimulator::new(&building, None, &backup).run(&steps, years)?;
    let with_heat_pump =
        DispatchSimulator::new(&building, Some(&unit), &backup).run(&steps, years)?;

    let fuel_price = match input
        .backup
        .fuel_price
        .or_else(|| location.fuel_prices.get(&input.backup.fuel_id).copied())
    {
        Some(price) => price,
        // resistance heat is billed through the electric rate
        None if backup.fuel().is_electricity => 0.,
        None => {
            return Err(LibraryError::DataUnavailable {
                kind: "fuel price",
                id: format!("{} at {}", input.backup.fuel_id, input.location_id),
            }
            .into())
        }
    };
    if !(fuel_price.is_finite() && fuel_price >= 0.) {
        return Err(HpCalcError::InvalidInput(format!(
            "Fuel price must be non-negative, got {fuel_price}"
        )));
    }
    let rate = input
        .electricity
        .rate
        .as_ref()
        .or(location.electric_rate.as_ref())
        .ok_or_else(|| LibraryError::DataUnavailable {
            kind: "electric rate",
            id: input.location_id.clone(),
        })?;
    rate.validate()?;

    let annual_costs = AnnualCosts::from_scenarios(
        &baseline,
        &with_heat_pump,
        fuel_price,
        rate,
        input.electricity.base_monthly_kwh,
    )?;
    let analysis = analyze(&annual_costs, &input.costs)?;

    let design = DesignSummary {
        design_temperature,
        design_heat_load: building.design_heat_load(design_temperature),
        balance_point: building.balance_point(),
        ua: building.ua(),
        heat_pump_capacity_5f: unit.max_capacity_5f()?,
        calibration,
    };
    let valuation = Valuation {
        electric_co2_lbs_per_kwh: input
            .electricity
            .co2_lbs_per_kwh
            .unwrap_or(location.co2_lbs_per_kwh),
        fuel_co2_lbs_per_mmbtu: backup.fuel().co2_lbs_per_mmbtu,
    };

    let result = assemble(AssemblyParts {
        location_id: &input.location_id,
        location_name: &location.name,
        heat_pump_model: &input.heat_pump.model_id,
        design,
        baseline: &baseline,
        with_heat_pump: &with_heat_pump,
        annual_costs: &annual_costs,
        cost_inputs: &input.costs,
        analysis: &analysis,
        valuation,
    });
    info!(
        cost_savings = result.annual.cost_savings,
        npv = result.metrics.npv,
        warnings = result.warnings.len(),
        "heat pump calculation complete"
    );

    Ok(result)
}

/// Run independent calculations in parallel, sharing one reference library.
/// Results come back in the order of the inputs.
pub fn run_calculations<L: ReferenceLibrary + ?Sized>(
    inputs: &[CalculationInput],
    library: &L,
) -> Vec<Result<CalculationResult, HpCalcError>> {
    inputs
        .par_iter()
        .map(|input| run_calculation(input, library))
        .collect()
}

fn building_load_model(
    building: &BuildingInput,
    design_temperature: f64,
    fuel: &Fuel,
    efficiency: f64,
) -> Result<(BuildingLoadModel, Option<Calibration>), HpCalcError> {
    Ok(match building {
        BuildingInput::DesignLoad {
            design_heat_loss,
            indoor_temp,
            design_outdoor_temp,
            internal_gains,
        } => (
            BuildingLoadModel::from_design_load(
                *design_heat_loss,
                *indoor_temp,
                design_outdoor_temp.unwrap_or(design_temperature),
                *internal_gains,
            )?,
            None,
        ),
        BuildingInput::LoadLine {
            ua,
            balance_point,
            indoor_setpoint,
        } => (
            BuildingLoadModel::from_load_line(
                LoadLine::new(*ua, *balance_point)?,
                *indoor_setpoint,
            ),
            None,
        ),
        BuildingInput::Characteristics(characteristics) => (
            BuildingLoadModel::from_characteristics(characteristics)?,
            None,
        ),
        BuildingInput::Calibrated {
            billing_periods,
            indoor_setpoint,
        } => {
            let calibration = calibrate(
                billing_periods,
                fuel.btu_per_unit,
                efficiency,
                CalibrationLimits {
                    lower: design_temperature,
                    upper: *indoor_setpoint,
                },
            )?;
            (calibration.load_model(*indoor_setpoint)?, Some(calibration))
        }
    })
}

const CASH_FLOW_HEADINGS: [&str; 12] = [
    "Year",
    "Capital cost",
    "Baseline cost",
    "Heat pump cost",
    "Maintenance cost",
    "Loan payment",
    "Net savings",
    "Net cash flow",
    "Discounted cash flow",
    "Cumulative cash flow",
    "Cumulative discounted cash flow",
    "Warnings",
];

/// Write the result as JSON under `<key>_results`, and its cash flow table as CSV
/// under `<key>_cash_flow`.
pub fn write_results(
    output: impl Output,
    output_key: &str,
    result: &CalculationResult,
) -> anyhow::Result<()> {
    if output.is_noop() {
        return Ok(());
    }

    let results_key = format!("{output_key}_results");
    let mut writer = output.writer_for_location_key(&results_key, "json")?;
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.flush()?;

    let cash_flow_key = format!("{output_key}_cash_flow");
    let writer = output.writer_for_location_key(&cash_flow_key, "csv")?;
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
    writer.write_record(CASH_FLOW_HEADINGS)?;
    writer.write_record([
        "[year]", "[$]", "[$]", "[$]", "[$]", "[$]", "[$]", "[$]", "[$]", "[$]", "[$]", "",
    ])?;
    for (idx, year) in result.cash_flow.iter().enumerate() {
        let mut row = [
            year.capital_cost,
            year.baseline_cost,
            year.heat_pump_cost,
            year.maintenance_cost,
            year.loan_payment,
            year.net_savings,
            year.net_cash_flow,
            year.discounted_cash_flow,
            year.cumulative_cash_flow,
            year.cumulative_discounted_cash_flow,
        ]
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<String>>();
        row.insert(0, year.year.to_string());
        // warnings go alongside the first row only
        if idx == 0 {
            row.push(
                result
                    .warnings
                    .iter()
                    .map(|warning| warning.code.to_string())
                    .collect::<Vec<_>>()
                    .join(";"),
            );
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}
