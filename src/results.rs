use crate::core::calibration::Calibration;
use crate::core::dispatch::{DispatchResult, EnergyTotals};
use crate::core::economics::{AnnualCosts, CashFlowYear, CostInputs, EconomicAnalysis, Payback};
use crate::core::units::MONTH_LABELS;
use serde::Serialize;

/// Result of one heat pump retrofit calculation. Values are rounded for
/// presentation here and nowhere else.
#[derive(Clone, Debug, Serialize)]
pub struct CalculationResult {
    pub location_id: String,
    pub location_name: String,
    pub heat_pump_model: String,
    pub design: DesignSummary,
    pub annual: AnnualSummary,
    pub monthly: Vec<MonthlySummary>,
    pub cash_flow: Vec<CashFlowYear>,
    pub metrics: MetricsSummary,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DesignSummary {
    /// 1% outdoor design temperature, in deg F
    pub design_temperature: f64,
    /// in Btu/h
    pub design_heat_load: f64,
    /// in deg F
    pub balance_point: f64,
    /// in Btu/h.degF
    pub ua: f64,
    /// maximum heat pump output at 5 deg F, in Btu/h
    pub heat_pump_capacity_5f: Option<f64>,
    pub calibration: Option<Calibration>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub load_mmbtu: f64,
    pub heat_pump_output_mmbtu: f64,
    pub heat_pump_kwh: f64,
    pub backup_output_mmbtu: f64,
    pub backup_fuel_units: f64,
    pub backup_electric_kwh: f64,
    pub aux_kwh: f64,
    pub electricity_kwh: f64,
    pub heat_pump_peak_kw: f64,
    pub fuel_cost: f64,
    pub electric_cost: f64,
    pub total_cost: f64,
    pub co2_lbs: f64,
    pub hours_at_capacity: f64,
    pub hours_heat_pump_unavailable: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnnualSummary {
    pub baseline: ScenarioSummary,
    pub with_heat_pump: ScenarioSummary,
    pub fuel_savings_units: f64,
    pub electricity_increase_kwh: f64,
    pub cost_savings: f64,
    pub co2_savings_lbs: f64,
    /// share of the annual load met by the heat pump
    pub heat_pump_load_fraction: f64,
    pub seasonal_cop: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MonthlySummary {
    pub month: &'static str,
    pub load_mmbtu: f64,
    pub heat_pump_output_mmbtu: f64,
    pub heat_pump_kwh: f64,
    pub heat_pump_peak_kw: f64,
    pub backup_output_mmbtu: f64,
    pub backup_fuel_units: f64,
    pub baseline_fuel_units: f64,
    pub cop: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSummary {
    pub initial_outlay: f64,
    pub analysis_years: u32,
    pub simple_payback_years: Option<u32>,
    pub discounted_payback_years: Option<u32>,
    pub npv: f64,
    pub irr: Option<f64>,
    pub total_net_savings: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WarningCode {
    CapacityExceeded,
    HeatPumpUnavailable,
    IrrUndefined,
    PaybackBeyondHorizon,
    LifetimeShorterThanHorizon,
    CalibrationUsed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

/// Emission factors used to value a scenario.
#[derive(Clone, Copy, Debug)]
pub struct Valuation {
    pub electric_co2_lbs_per_kwh: f64,
    pub fuel_co2_lbs_per_mmbtu: f64,
}

pub struct AssemblyParts<'a> {
    pub location_id: &'a str,
    pub location_name: &'a str,
    pub heat_pump_model: &'a str,
    pub design: DesignSummary,
    pub baseline: &'a DispatchResult,
    pub with_heat_pump: &'a DispatchResult,
    pub annual_costs: &'a AnnualCosts,
    pub cost_inputs: &'a CostInputs,
    pub analysis: &'a EconomicAnalysis,
    pub valuation: Valuation,
}

pub fn assemble(parts: AssemblyParts) -> CalculationResult {
    let AssemblyParts {
        location_id,
        location_name,
        heat_pump_model,
        design,
        baseline,
        with_heat_pump,
        annual_costs,
        cost_inputs,
        analysis,
        valuation,
    } = parts;

    let baseline_summary = scenario_summary(
        &baseline.annual,
        annual_costs.baseline_fuel,
        annual_costs.baseline_electric,
        valuation,
    );
    let heat_pump_summary = scenario_summary(
        &with_heat_pump.annual,
        annual_costs.heat_pump_fuel,
        annual_costs.heat_pump_electric,
        valuation,
    );

    let load = with_heat_pump.annual.load_mmbtu;
    let annual = AnnualSummary {
        fuel_savings_units: round_energy(
            baseline.annual.backup_fuel_units - with_heat_pump.annual.backup_fuel_units,
        ),
        electricity_increase_kwh: round_energy(
            with_heat_pump.annual.electricity_kwh() - baseline.annual.electricity_kwh(),
        ),
        cost_savings: round_money(annual_costs.baseline_total() - annual_costs.heat_pump_total()),
        co2_savings_lbs: round_energy(baseline_summary.co2_lbs - heat_pump_summary.co2_lbs),
        heat_pump_load_fraction: round_rate(if load > 0. {
            with_heat_pump.annual.heat_pump_output_mmbtu / load
        } else {
            0.
        }),
        seasonal_cop: with_heat_pump.annual.seasonal_cop().map(round_rate),
        baseline: baseline_summary,
        with_heat_pump: heat_pump_summary,
    };

    let monthly = with_heat_pump
        .monthly
        .iter()
        .zip(baseline.monthly.iter())
        .zip(MONTH_LABELS)
        .map(|((month, baseline_month), label)| MonthlySummary {
            month: label,
            load_mmbtu: round_energy(month.load_mmbtu),
            heat_pump_output_mmbtu: round_energy(month.heat_pump_output_mmbtu),
            heat_pump_kwh: round_energy(month.heat_pump_kwh),
            heat_pump_peak_kw: round_energy(month.heat_pump_peak_kw),
            backup_output_mmbtu: round_energy(month.backup_output_mmbtu),
            backup_fuel_units: round_energy(month.backup_fuel_units),
            baseline_fuel_units: round_energy(baseline_month.backup_fuel_units),
            cop: month.seasonal_cop().map(round_rate),
        })
        .collect();

    let metrics = &analysis.metrics;
    let warnings = warnings(
        &with_heat_pump.annual,
        analysis,
        cost_inputs,
        design.calibration.as_ref(),
    );

    CalculationResult {
        location_id: location_id.to_string(),
        location_name: location_name.to_string(),
        heat_pump_model: heat_pump_model.to_string(),
        design: DesignSummary {
            design_temperature: round_energy(design.design_temperature),
            design_heat_load: round_energy(design.design_heat_load),
            balance_point: round_energy(design.balance_point),
            ua: round_energy(design.ua),
            heat_pump_capacity_5f: design.heat_pump_capacity_5f.map(round_energy),
            calibration: design.calibration,
        },
        annual,
        monthly,
        cash_flow: analysis.cash_flow.iter().map(round_cash_flow_year).collect(),
        metrics: MetricsSummary {
            initial_outlay: round_money(metrics.initial_outlay),
            analysis_years: metrics.analysis_years,
            simple_payback_years: metrics.simple_payback.year(),
            discounted_payback_years: metrics.discounted_payback.year(),
            npv: metrics.npv.round(),
            irr: metrics.irr.map(round_rate),
            total_net_savings: round_money(metrics.total_net_savings),
        },
        warnings,
    }
}

fn scenario_summary(
    totals: &EnergyTotals,
    fuel_cost: f64,
    electric_cost: f64,
    valuation: Valuation,
) -> ScenarioSummary {
    ScenarioSummary {
        load_mmbtu: round_energy(totals.load_mmbtu),
        heat_pump_output_mmbtu: round_energy(totals.heat_pump_output_mmbtu),
        heat_pump_kwh: round_energy(totals.heat_pump_kwh),
        backup_output_mmbtu: round_energy(totals.backup_output_mmbtu),
        backup_fuel_units: round_energy(totals.backup_fuel_units),
        backup_electric_kwh: round_energy(totals.backup_electric_kwh),
        aux_kwh: round_energy(totals.backup_aux_kwh),
        electricity_kwh: round_energy(totals.electricity_kwh()),
        heat_pump_peak_kw: round_energy(totals.heat_pump_peak_kw),
        fuel_cost: round_money(fuel_cost),
        electric_cost: round_money(electric_cost),
        total_cost: round_money(fuel_cost + electric_cost),
        co2_lbs: round_energy(totals.co2_lbs(
            valuation.electric_co2_lbs_per_kwh,
            valuation.fuel_co2_lbs_per_mmbtu,
        )),
        hours_at_capacity: round_energy(totals.hours_at_capacity),
        hours_heat_pump_unavailable: round_energy(totals.hours_heat_pump_unavailable),
    }
}

fn warnings(
    totals: &EnergyTotals,
    analysis: &EconomicAnalysis,
    cost_inputs: &CostInputs,
    calibration: Option<&Calibration>,
) -> Vec<Warning> {
    let mut warnings = vec![];
    let share_of_load_hours = |hours: f64| {
        if totals.hours_with_load > 0. {
            100. * hours / totals.hours_with_load
        } else {
            0.
        }
    };

    if totals.hours_at_capacity > 0. {
        let share_of_annual_hours = if totals.hours > 0. {
            100. * totals.hours_at_capacity / totals.hours
        } else {
            0.
        };
        warnings.push(Warning {
            code: WarningCode::CapacityExceeded,
            message: format!(
                "Heat pump capacity exceeded in {share_of_annual_hours:.1}% of annual hours; backup heat covers the residual"
            ),
        });
    }
    if totals.hours_heat_pump_unavailable > 0. {
        warnings.push(Warning {
            code: WarningCode::HeatPumpUnavailable,
            message: format!(
                "Heat pump was off for {:.1}% of the hours heat was needed (outside its operating range or below the cutoff temperature)",
                share_of_load_hours(totals.hours_heat_pump_unavailable)
            ),
        });
    }
    if analysis.metrics.irr.is_none() {
        warnings.push(Warning {
            code: WarningCode::IrrUndefined,
            message: "Internal rate of return is undefined for this cash flow".into(),
        });
    }
    if analysis.metrics.simple_payback == Payback::BeyondHorizon {
        warnings.push(Warning {
            code: WarningCode::PaybackBeyondHorizon,
            message: format!(
                "Investment does not pay back within the {}-year analysis period",
                analysis.metrics.analysis_years
            ),
        });
    }
    if cost_inputs.equipment_life_years < analysis.metrics.analysis_years {
        warnings.push(Warning {
            code: WarningCode::LifetimeShorterThanHorizon,
            message: format!(
                "Equipment life of {} years is shorter than the analysis period; replacement costs are included",
                cost_inputs.equipment_life_years
            ),
        });
    }
    if let Some(calibration) = calibration {
        warnings.push(Warning {
            code: WarningCode::CalibrationUsed,
            message: format!(
                "Building heat loss was calibrated from {} billing periods (R-squared {:.3})",
                calibration.periods_used, calibration.r_squared
            ),
        });
    }

    warnings
}

fn round_cash_flow_year(year: &CashFlowYear) -> CashFlowYear {
    CashFlowYear {
        year: year.year,
        capital_cost: round_money(year.capital_cost),
        baseline_cost: round_money(year.baseline_cost),
        heat_pump_cost: round_money(year.heat_pump_cost),
        maintenance_cost: round_money(year.maintenance_cost),
        loan_payment: round_money(year.loan_payment),
        net_savings: round_money(year.net_savings),
        net_cash_flow: round_money(year.net_cash_flow),
        discounted_cash_flow: round_money(year.discounted_cash_flow),
        cumulative_cash_flow: round_money(year.cumulative_cash_flow),
        cumulative_discounted_cash_flow: round_money(year.cumulative_discounted_cash_flow),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn round_energy(value: f64) -> f64 {
    round_to(value, 1)
}

fn round_money(value: f64) -> f64 {
    round_to(value, 2)
}

fn round_rate(value: f64) -> f64 {
    round_to(value, 4)
}
