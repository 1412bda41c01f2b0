use crate::core::dispatch::DispatchResult;
use crate::core::electric_rate::{ElectricRate, MonthlyElectricUse, RateError};
use crate::core::solvers::{scan_and_refine, SolverError};
use crate::core::units::{level_annual_payment, BadLoanTermsError, MONTHS_PER_YEAR};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// This module turns annual energy costs into a multi-year cash flow for the
/// heat pump investment, and summarises it as payback periods, NPV and IRR.

/// Longest analysis horizon accepted, in years.
pub const MAX_ANALYSIS_YEARS: u32 = 100;

/// Bracket scanned for the internal rate of return.
const IRR_LOWER: f64 = -0.99;
const IRR_UPPER: f64 = 10.;
const IRR_SCAN_STEP: f64 = 0.01;
const IRR_TOLERANCE: f64 = 1e-10;

fn default_discount_rate() -> f64 {
    0.05
}

fn default_equipment_life() -> u32 {
    14
}

fn default_fuel_escalation() -> f64 {
    0.04
}

fn default_electricity_escalation() -> f64 {
    0.03
}

fn default_maintenance_escalation() -> f64 {
    0.02
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Financing {
    /// share of the initial outlay paid for with a loan
    pub fraction_financed: f64,
    pub term_years: u32,
    pub interest_rate: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostInputs {
    /// equipment cost, in $
    pub capital_cost: f64,
    #[serde(default)]
    pub installation_cost: f64,
    #[serde(default)]
    pub incentives: f64,
    /// nominal discount rate
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    /// defaults to the equipment life
    #[serde(default)]
    pub analysis_years: Option<u32>,
    #[serde(default = "default_equipment_life")]
    pub equipment_life_years: u32,
    /// extra maintenance cost of the heat pump scenario in year 1, in $
    #[serde(default)]
    pub maintenance_cost_delta: f64,
    #[serde(default = "default_fuel_escalation")]
    pub fuel_escalation: f64,
    #[serde(default = "default_electricity_escalation")]
    pub electricity_escalation: f64,
    #[serde(default = "default_maintenance_escalation")]
    pub maintenance_escalation: f64,
    #[serde(default)]
    pub financing: Option<Financing>,
}

impl CostInputs {
    pub fn analysis_years(&self) -> u32 {
        self.analysis_years.unwrap_or(self.equipment_life_years)
    }

    /// Capital plus installation less incentives, in $.
    pub fn initial_outlay(&self) -> f64 {
        self.capital_cost + self.installation_cost - self.incentives
    }

    fn validate(&self) -> Result<(), EconomicsError> {
        let analysis_years = self.analysis_years();
        if analysis_years == 0 || analysis_years > MAX_ANALYSIS_YEARS {
            return Err(EconomicsError::InvalidInput(format!(
                "Analysis horizon must be between 1 and {MAX_ANALYSIS_YEARS} years, got {analysis_years}"
            )));
        }
        if self.equipment_life_years == 0 {
            return Err(EconomicsError::InvalidInput(
                "Equipment life must be at least one year".into(),
            ));
        }
        if !(self.discount_rate.is_finite() && self.discount_rate > -1.) {
            return Err(EconomicsError::InvalidInput(format!(
                "Discount rate must be greater than -100%, got {}",
                self.discount_rate
            )));
        }
        for (name, value) in [
            ("capital cost", self.capital_cost),
            ("installation cost", self.installation_cost),
            ("incentives", self.incentives),
            ("maintenance cost", self.maintenance_cost_delta),
            ("fuel escalation", self.fuel_escalation),
            ("electricity escalation", self.electricity_escalation),
            ("maintenance escalation", self.maintenance_escalation),
        ] {
            if !value.is_finite() {
                return Err(EconomicsError::InvalidInput(format!(
                    "Value for {name} must be finite, got {value}"
                )));
            }
        }
        if let Some(financing) = &self.financing {
            if !(0. ..=1.).contains(&financing.fraction_financed) {
                return Err(EconomicsError::InvalidInput(format!(
                    "Fraction financed must be between 0 and 1, got {}",
                    financing.fraction_financed
                )));
            }
            if !(financing.interest_rate.is_finite() && financing.interest_rate > -1.) {
                return Err(EconomicsError::InvalidInput(format!(
                    "Loan interest rate must be greater than -100%, got {}",
                    financing.interest_rate
                )));
            }
        }
        Ok(())
    }
}

/// Year 1 heating energy costs of the two scenarios, in $.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AnnualCosts {
    pub baseline_fuel: f64,
    pub baseline_electric: f64,
    pub heat_pump_fuel: f64,
    pub heat_pump_electric: f64,
}

impl AnnualCosts {
    /// Arguments:
    /// * `fuel_price` - price of the backup fuel, in $ per fuel unit
    /// * `rate` - electric rate the household is billed under
    /// * `base_monthly_kwh` - household electricity use other than heating
    pub fn from_scenarios(
        baseline: &DispatchResult,
        heat_pump: &DispatchResult,
        fuel_price: f64,
        rate: &ElectricRate,
        base_monthly_kwh: f64,
    ) -> Result<Self, RateError> {
        Ok(Self {
            baseline_fuel: baseline.annual.backup_fuel_units * fuel_price,
            baseline_electric: rate
                .incremental_annual_cost(base_monthly_kwh, &monthly_electric_use(baseline))?,
            heat_pump_fuel: heat_pump.annual.backup_fuel_units * fuel_price,
            heat_pump_electric: rate
                .incremental_annual_cost(base_monthly_kwh, &monthly_electric_use(heat_pump))?,
        })
    }

    pub fn baseline_total(&self) -> f64 {
        self.baseline_fuel + self.baseline_electric
    }

    pub fn heat_pump_total(&self) -> f64 {
        self.heat_pump_fuel + self.heat_pump_electric
    }
}

/// Monthly electricity use of a scenario. Without monthly results the annual use
/// is spread evenly, with the annual peak demand in every month.
fn monthly_electric_use(result: &DispatchResult) -> MonthlyElectricUse {
    let mut use_by_month = MonthlyElectricUse {
        kwh: [0.; MONTHS_PER_YEAR],
        peak_kw: [0.; MONTHS_PER_YEAR],
    };
    if result.monthly.len() == MONTHS_PER_YEAR {
        for (idx, month) in result.monthly.iter().enumerate() {
            use_by_month.kwh[idx] = month.electricity_kwh();
            use_by_month.peak_kw[idx] = month.heat_pump_peak_kw;
        }
    } else {
        let monthly_kwh = result.annual.electricity_kwh() / MONTHS_PER_YEAR as f64;
        use_by_month.kwh = [monthly_kwh; MONTHS_PER_YEAR];
        use_by_month.peak_kw = [result.annual.heat_pump_peak_kw; MONTHS_PER_YEAR];
    }
    use_by_month
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CashFlowYear {
    pub year: u32,
    pub capital_cost: f64,
    pub baseline_cost: f64,
    pub heat_pump_cost: f64,
    pub maintenance_cost: f64,
    /// negative in year 0, where it is the loan principal received
    pub loan_payment: f64,
    /// baseline cost less heat pump scenario cost and maintenance
    pub net_savings: f64,
    pub net_cash_flow: f64,
    pub discounted_cash_flow: f64,
    pub cumulative_cash_flow: f64,
    pub cumulative_discounted_cash_flow: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payback {
    Year(u32),
    BeyondHorizon,
}

impl Payback {
    pub fn year(&self) -> Option<u32> {
        match self {
            Self::Year(year) => Some(*year),
            Self::BeyondHorizon => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub initial_outlay: f64,
    pub analysis_years: u32,
    pub simple_payback: Payback,
    pub discounted_payback: Payback,
    pub npv: f64,
    /// None when the cash flow has no rate of return
    pub irr: Option<f64>,
    pub total_net_savings: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct EconomicAnalysis {
    pub cash_flow: Vec<CashFlowYear>,
    pub metrics: SummaryMetrics,
}

pub fn analyze(
    costs: &AnnualCosts,
    inputs: &CostInputs,
) -> Result<EconomicAnalysis, EconomicsError> {
    inputs.validate()?;

    let analysis_years = inputs.analysis_years();
    let life = inputs.equipment_life_years;
    let outlay = inputs.initial_outlay();
    let replacement_cost = inputs.capital_cost + inputs.installation_cost;

    let (financed, loan_payment, loan_term) = match &inputs.financing {
        Some(financing) if financing.fraction_financed > 0. => {
            let financed = outlay.max(0.) * financing.fraction_financed;
            let payment =
                level_annual_payment(financed, financing.interest_rate, financing.term_years)?;
            (financed, payment, financing.term_years)
        }
        _ => (0., 0., 0),
    };

    let year_zero = -(outlay - financed);
    let mut cash_flow = vec![CashFlowYear {
        year: 0,
        capital_cost: outlay,
        baseline_cost: 0.,
        heat_pump_cost: 0.,
        maintenance_cost: 0.,
        loan_payment: -financed,
        net_savings: 0.,
        net_cash_flow: year_zero,
        discounted_cash_flow: year_zero,
        cumulative_cash_flow: year_zero,
        cumulative_discounted_cash_flow: year_zero,
    }];

    let mut cumulative = year_zero;
    let mut cumulative_discounted = year_zero;
    for year in 1..=analysis_years {
        let elapsed = (year - 1) as i32;
        let fuel_multiplier = (1. + inputs.fuel_escalation).powi(elapsed);
        let electricity_multiplier = (1. + inputs.electricity_escalation).powi(elapsed);
        let maintenance_multiplier = (1. + inputs.maintenance_escalation).powi(elapsed);

        let baseline_cost = costs.baseline_fuel * fuel_multiplier
            + costs.baseline_electric * electricity_multiplier;
        let heat_pump_cost = costs.heat_pump_fuel * fuel_multiplier
            + costs.heat_pump_electric * electricity_multiplier;
        let maintenance_cost = inputs.maintenance_cost_delta * maintenance_multiplier;
        let net_savings = baseline_cost - heat_pump_cost - maintenance_cost;

        let capital_cost = if year % life == 0 && year < analysis_years {
            replacement_cost
        } else {
            0.
        };
        let loan_payment = if year <= loan_term { loan_payment } else { 0. };

        let net_cash_flow = net_savings - capital_cost - loan_payment;
        let discounted_cash_flow = net_cash_flow / (1. + inputs.discount_rate).powi(year as i32);
        cumulative += net_cash_flow;
        cumulative_discounted += discounted_cash_flow;

        cash_flow.push(CashFlowYear {
            year,
            capital_cost,
            baseline_cost,
            heat_pump_cost,
            maintenance_cost,
            loan_payment,
            net_savings,
            net_cash_flow,
            discounted_cash_flow,
            cumulative_cash_flow: cumulative,
            cumulative_discounted_cash_flow: cumulative_discounted,
        });
    }

    let flows = cash_flow
        .iter()
        .map(|year| year.net_cash_flow)
        .collect::<Vec<f64>>();
    let irr = match internal_rate_of_return(&flows) {
        Ok(irr) => irr,
        Err(e) => {
            warn!("IRR could not be determined: {e}");
            None
        }
    };

    let metrics = SummaryMetrics {
        initial_outlay: outlay,
        analysis_years,
        simple_payback: payback(&cash_flow, |year| year.cumulative_cash_flow),
        discounted_payback: payback(&cash_flow, |year| year.cumulative_discounted_cash_flow),
        npv: cumulative_discounted,
        irr,
        total_net_savings: cash_flow.iter().map(|year| year.net_savings).sum(),
    };
    debug!(?metrics, "economic analysis complete");

    Ok(EconomicAnalysis { cash_flow, metrics })
}

/// First year in which the cumulative cash flow is no longer negative, counting
/// only years by which the investment has actually produced savings.
fn payback(cash_flow: &[CashFlowYear], cumulative: impl Fn(&CashFlowYear) -> f64) -> Payback {
    let mut cumulative_savings = 0.;
    for year in cash_flow.iter().skip(1) {
        cumulative_savings += year.net_savings;
        if cumulative_savings > 0. && cumulative(year) >= 0. {
            return Payback::Year(year.year);
        }
    }
    Payback::BeyondHorizon
}

pub fn net_present_value(rate: f64, flows: &[f64]) -> f64 {
    flows
        .iter()
        .enumerate()
        .map(|(year, flow)| flow / (1. + rate).powi(year as i32))
        .sum()
}

/// Rate at which the net present value of `flows` is zero. None when the flows
/// never change sign, or when no root lies in the scanned bracket.
pub fn internal_rate_of_return(flows: &[f64]) -> Result<Option<f64>, SolverError> {
    let has_positive = flows.iter().any(|flow| *flow > 0.);
    let has_negative = flows.iter().any(|flow| *flow < 0.);
    if !(has_positive && has_negative) {
        return Ok(None);
    }

    scan_and_refine(
        |rate| net_present_value(rate, flows),
        IRR_LOWER,
        IRR_UPPER,
        IRR_SCAN_STEP,
        IRR_TOLERANCE,
    )
}

#[derive(Debug, Error)]
pub enum EconomicsError {
    #[error("Invalid cost inputs: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    BadLoanTerms(#[from] BadLoanTermsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn no_escalation() -> CostInputs {
        CostInputs {
            capital_cost: 6_000.,
            installation_cost: 0.,
            incentives: 0.,
            discount_rate: 0.,
            analysis_years: None,
            equipment_life_years: 14,
            maintenance_cost_delta: 0.,
            fuel_escalation: 0.,
            electricity_escalation: 0.,
            maintenance_escalation: 0.,
            financing: None,
        }
    }

    fn savings_of(amount: f64) -> AnnualCosts {
        AnnualCosts {
            baseline_fuel: 1_000. + amount,
            baseline_electric: 0.,
            heat_pump_fuel: 200.,
            heat_pump_electric: 800.,
        }
    }

    #[rstest]
    fn should_pay_back_in_twelve_years_at_zero_discount(no_escalation: CostInputs) {
        let analysis = analyze(&savings_of(500.), &no_escalation).unwrap();
        assert_eq!(analysis.cash_flow.len(), 15);
        assert_eq!(analysis.metrics.simple_payback, Payback::Year(12));
        assert_eq!(analysis.metrics.discounted_payback, Payback::Year(12));
        assert_relative_eq!(analysis.metrics.npv, 1_000., max_relative = 1e-9);
        assert_relative_eq!(analysis.metrics.total_net_savings, 7_000., max_relative = 1e-9);
    }

    #[rstest]
    fn should_have_zero_irr_when_savings_just_repay_outlay(no_escalation: CostInputs) {
        let inputs = CostInputs {
            analysis_years: Some(12),
            ..no_escalation
        };
        let analysis = analyze(&savings_of(500.), &inputs).unwrap();
        assert_relative_eq!(analysis.metrics.irr.unwrap(), 0., epsilon = 1e-6);
    }

    #[rstest]
    fn should_take_longer_to_pay_back_when_discounted(no_escalation: CostInputs) {
        let inputs = CostInputs {
            discount_rate: 0.05,
            analysis_years: Some(30),
            equipment_life_years: 30,
            ..no_escalation
        };
        let analysis = analyze(&savings_of(500.), &inputs).unwrap();
        assert_eq!(analysis.metrics.simple_payback, Payback::Year(12));
        let discounted = analysis.metrics.discounted_payback.year().unwrap();
        assert!(discounted > 12);
        // 500 a year at 5% first covers 6,000 in year 19
        assert_eq!(discounted, 19);
        let irr = analysis.metrics.irr.unwrap();
        assert!(irr > 0.05);
        let flows = analysis
            .cash_flow
            .iter()
            .map(|year| year.net_cash_flow)
            .collect::<Vec<f64>>();
        assert_relative_eq!(net_present_value(irr, &flows), 0., epsilon = 1e-3);
    }

    #[rstest]
    fn should_handle_zero_savings(no_escalation: CostInputs) {
        let inputs = CostInputs {
            discount_rate: 0.05,
            ..no_escalation
        };
        let analysis = analyze(&savings_of(0.), &inputs).unwrap();
        assert_eq!(analysis.metrics.simple_payback, Payback::BeyondHorizon);
        assert_eq!(analysis.metrics.discounted_payback, Payback::BeyondHorizon);
        assert_eq!(analysis.metrics.npv, -6_000.);
        assert_eq!(analysis.metrics.irr, None);
        assert!(analysis
            .cash_flow
            .iter()
            .skip(1)
            .all(|year| year.net_savings == 0.));
    }

    #[rstest]
    fn should_never_pay_back_without_savings_even_with_no_outlay(no_escalation: CostInputs) {
        let inputs = CostInputs {
            capital_cost: 0.,
            ..no_escalation
        };
        let analysis = analyze(&savings_of(0.), &inputs).unwrap();
        assert_eq!(analysis.metrics.simple_payback, Payback::BeyondHorizon);
        assert_eq!(analysis.metrics.npv, 0.);
        assert_eq!(analysis.metrics.irr, None);
    }

    #[rstest]
    fn should_escalate_costs_from_year_one() {
        let inputs: CostInputs = serde_json::from_str(r#"{"capital_cost": 4000}"#).unwrap();
        assert_eq!(inputs.discount_rate, 0.05);
        assert_eq!(inputs.analysis_years(), 14);
        let costs = AnnualCosts {
            baseline_fuel: 1_000.,
            baseline_electric: 0.,
            heat_pump_fuel: 0.,
            heat_pump_electric: 500.,
        };
        let analysis = analyze(&costs, &inputs).unwrap();
        let year_1 = analysis.cash_flow[1];
        assert_eq!(year_1.baseline_cost, 1_000.);
        assert_eq!(year_1.heat_pump_cost, 500.);
        let year_3 = analysis.cash_flow[3];
        assert_relative_eq!(year_3.baseline_cost, 1_000. * 1.04f64.powi(2));
        assert_relative_eq!(year_3.heat_pump_cost, 500. * 1.03f64.powi(2));
        assert_relative_eq!(
            year_3.discounted_cash_flow,
            year_3.net_cash_flow / 1.05f64.powi(3)
        );
    }

    #[rstest]
    fn should_replace_equipment_inside_horizon(no_escalation: CostInputs) {
        let inputs = CostInputs {
            analysis_years: Some(30),
            equipment_life_years: 10,
            installation_cost: 1_000.,
            incentives: 500.,
            ..no_escalation
        };
        let analysis = analyze(&savings_of(500.), &inputs).unwrap();
        let replacements = analysis
            .cash_flow
            .iter()
            .filter(|year| year.year > 0 && year.capital_cost > 0.)
            .map(|year| year.year)
            .collect::<Vec<u32>>();
        assert_eq!(replacements, vec![10, 20]);
        assert_eq!(analysis.cash_flow[10].capital_cost, 7_000.);
        assert_eq!(analysis.metrics.initial_outlay, 6_500.);
    }

    #[rstest]
    fn should_spread_financed_outlay_over_loan_term(no_escalation: CostInputs) {
        let inputs = CostInputs {
            financing: Some(Financing {
                fraction_financed: 0.5,
                term_years: 5,
                interest_rate: 0.,
            }),
            ..no_escalation
        };
        let analysis = analyze(&savings_of(500.), &inputs).unwrap();
        assert_eq!(analysis.cash_flow[0].net_cash_flow, -3_000.);
        assert_eq!(analysis.cash_flow[1].loan_payment, 600.);
        assert_eq!(analysis.cash_flow[5].loan_payment, 600.);
        assert_eq!(analysis.cash_flow[6].loan_payment, 0.);
        assert_eq!(analysis.cash_flow[1].net_cash_flow, -100.);
        // interest free, so the same total is repaid as with cash
        assert_eq!(analysis.metrics.simple_payback, Payback::Year(12));
    }

    #[rstest]
    #[case(Some(0))]
    #[case(Some(101))]
    fn should_reject_invalid_horizon(
        no_escalation: CostInputs,
        #[case] analysis_years: Option<u32>,
    ) {
        let inputs = CostInputs {
            analysis_years,
            ..no_escalation
        };
        assert!(matches!(
            analyze(&savings_of(500.), &inputs),
            Err(EconomicsError::InvalidInput(_))
        ));
    }

    #[rstest]
    #[case(f64::INFINITY, 0.05)]
    #[case(f64::NAN, 0.05)]
    #[case(-1., 0.05)]
    #[case(0.05, f64::NAN)]
    #[case(0.05, f64::INFINITY)]
    #[case(0.05, -1.5)]
    fn should_reject_invalid_rates(
        no_escalation: CostInputs,
        #[case] discount_rate: f64,
        #[case] interest_rate: f64,
    ) {
        let inputs = CostInputs {
            discount_rate,
            financing: Some(Financing {
                fraction_financed: 0.5,
                term_years: 5,
                interest_rate,
            }),
            ..no_escalation
        };
        assert!(matches!(
            analyze(&savings_of(500.), &inputs),
            Err(EconomicsError::InvalidInput(_))
        ));
    }

    #[rstest]
    fn should_not_find_irr_without_sign_change() {
        assert_eq!(internal_rate_of_return(&[0., 0., 0.]).unwrap(), None);
        assert_eq!(internal_rate_of_return(&[100., 50.]).unwrap(), None);
    }
}
