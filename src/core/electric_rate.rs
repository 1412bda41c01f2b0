use crate::core::units::MONTHS_PER_YEAR;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// This module prices electricity use for a month, either at a flat price per
/// kWh or under a block rate structure with customer and demand charges, sales
/// tax and a Power Cost Equalization (PCE) subsidy on the first kWh each month.

fn default_pce_limit() -> Option<f64> {
    Some(750.)
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElectricRate {
    Flat { price_per_kwh: f64 },
    Block(BlockRate),
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateBlock {
    /// upper end of the block, in kWh per month; None for the last, open-ended block
    pub upper_kwh: Option<f64>,
    /// in $/kWh
    pub rate: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRate {
    pub blocks: Vec<RateBlock>,
    /// in $/month
    #[serde(default)]
    pub customer_charge: f64,
    /// in $/kW of monthly peak demand
    #[serde(default)]
    pub demand_charge: f64,
    /// PCE subsidy, in $/kWh
    #[serde(default)]
    pub pce_rate: f64,
    /// monthly kWh the PCE subsidy applies to; None for no limit
    #[serde(default = "default_pce_limit")]
    pub pce_limit: Option<f64>,
    #[serde(default)]
    pub sales_tax: f64,
}

/// A block rate reduced to (kWh in block, rate including PCE and tax) pairs.
#[derive(Clone, Debug)]
struct PricedBlocks {
    blocks: Vec<(f64, f64)>,
    fixed_charge: f64,
    demand_charge: f64,
}

impl BlockRate {
    fn priced_blocks(&self) -> Result<PricedBlocks, RateError> {
        if self.blocks.is_empty() {
            return Err(RateError::InvalidRate(
                "A block rate needs at least one block".into(),
            ));
        }
        if self.blocks.last().is_some_and(|block| block.upper_kwh.is_some()) {
            return Err(RateError::InvalidRate(
                "The last rate block must be open-ended".into(),
            ));
        }
        if let Some((lower, upper)) = self
            .blocks
            .iter()
            .filter_map(|block| block.upper_kwh)
            .tuple_windows()
            .find(|(lower, upper)| upper <= lower)
        {
            return Err(RateError::InvalidRate(format!(
                "Rate block limits must increase, got {lower} then {upper} kWh"
            )));
        }
        if self.blocks[..self.blocks.len() - 1]
            .iter()
            .any(|block| block.upper_kwh.is_none())
        {
            return Err(RateError::InvalidRate(
                "Only the last rate block may be open-ended".into(),
            ));
        }
        if self.blocks.iter().any(|block| !block.rate.is_finite()) {
            return Err(RateError::InvalidRate("Block rates must be finite".into()));
        }

        let pce_limit = self.pce_limit.unwrap_or(f64::INFINITY);
        let pce_adjustment = if pce_limit > 0. { self.pce_rate } else { 0. };
        let mut pce_block_added = pce_adjustment == 0.;

        // split the block containing the PCE limit so that the subsidy ends at the limit
        let mut upper_limits = vec![];
        for block in &self.blocks {
            let upper = block.upper_kwh.unwrap_or(f64::INFINITY);
            if !pce_block_added && upper > pce_limit {
                upper_limits.push((pce_limit, block.rate));
                pce_block_added = true;
            }
            if upper == pce_limit {
                pce_block_added = true;
            }
            upper_limits.push((upper, block.rate));
        }

        let tax_multiplier = 1. + self.sales_tax;
        let mut previous_upper = 0.;
        let blocks = upper_limits
            .into_iter()
            .map(|(upper, rate)| {
                let rate = if upper <= pce_limit {
                    rate - pce_adjustment
                } else {
                    rate
                };
                let kwh_in_block = upper - previous_upper;
                previous_upper = upper;
                (kwh_in_block, rate * tax_multiplier)
            })
            .collect();

        Ok(PricedBlocks {
            blocks,
            fixed_charge: self.customer_charge * tax_multiplier,
            demand_charge: self.demand_charge * tax_multiplier,
        })
    }
}

impl PricedBlocks {
    fn monthly_cost(&self, kwh: f64, peak_kw: f64) -> f64 {
        let mut cost = self.fixed_charge + peak_kw * self.demand_charge;
        let mut remaining = kwh.max(0.);
        for (kwh_in_block, rate) in &self.blocks {
            if remaining <= 0. {
                break;
            }
            let used = remaining.min(*kwh_in_block);
            cost += used * rate;
            remaining -= used;
        }
        cost
    }
}

/// Electricity use added by a heating scenario on top of the household's other use.
#[derive(Clone, Copy, Debug)]
pub struct MonthlyElectricUse {
    pub kwh: [f64; MONTHS_PER_YEAR],
    pub peak_kw: [f64; MONTHS_PER_YEAR],
}

impl ElectricRate {
    pub fn validate(&self) -> Result<(), RateError> {
        match self {
            Self::Flat { price_per_kwh } => {
                if !price_per_kwh.is_finite() {
                    return Err(RateError::InvalidRate(format!(
                        "Electricity price must be finite, got {price_per_kwh}"
                    )));
                }
                Ok(())
            }
            Self::Block(block_rate) => block_rate.priced_blocks().map(|_| ()),
        }
    }

    /// Total bill for a month, in $.
    pub fn monthly_cost(&self, kwh: f64, peak_kw: f64) -> Result<f64, RateError> {
        match self {
            Self::Flat { price_per_kwh } => Ok(kwh * price_per_kwh),
            Self::Block(block_rate) => Ok(block_rate.priced_blocks()?.monthly_cost(kwh, peak_kw)),
        }
    }

    /// Annual increase in the electric bill caused by the added use, in $.
    ///
    /// Arguments:
    /// * `base_monthly_kwh` - the household's other electricity use per month
    /// * `added` - electricity use of the heating scenario
    pub fn incremental_annual_cost(
        &self,
        base_monthly_kwh: f64,
        added: &MonthlyElectricUse,
    ) -> Result<f64, RateError> {
        match self {
            Self::Flat { price_per_kwh } => Ok(added.kwh.iter().sum::<f64>() * price_per_kwh),
            Self::Block(block_rate) => {
                let priced = block_rate.priced_blocks()?;
                let base_cost = priced.monthly_cost(base_monthly_kwh, 0.);
                Ok(added
                    .kwh
                    .iter()
                    .zip(added.peak_kw.iter())
                    .map(|(kwh, peak_kw)| {
                        priced.monthly_cost(base_monthly_kwh + kwh, *peak_kw) - base_cost
                    })
                    .sum())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("Invalid electric rate: {0}")]
    InvalidRate(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn rural_rate() -> BlockRate {
        BlockRate {
            blocks: vec![
                RateBlock {
                    upper_kwh: Some(500.),
                    rate: 0.5,
                },
                RateBlock {
                    upper_kwh: Some(1_000.),
                    rate: 0.45,
                },
                RateBlock {
                    upper_kwh: None,
                    rate: 0.4,
                },
            ],
            customer_charge: 20.,
            demand_charge: 0.,
            pce_rate: 0.2,
            pce_limit: Some(750.),
            sales_tax: 0.,
        }
    }

    #[rstest]
    fn should_insert_pce_block(rural_rate: BlockRate) {
        let priced = rural_rate.priced_blocks().unwrap();
        assert_eq!(priced.blocks.len(), 4);
        assert_relative_eq!(priced.blocks[0].0, 500.);
        assert_relative_eq!(priced.blocks[0].1, 0.3);
        assert_relative_eq!(priced.blocks[1].0, 250.);
        assert_relative_eq!(priced.blocks[1].1, 0.25);
        assert_relative_eq!(priced.blocks[2].0, 250.);
        assert_relative_eq!(priced.blocks[2].1, 0.45);
        assert_eq!(priced.blocks[3].0, f64::INFINITY);
    }

    #[rstest]
    fn should_price_month_across_blocks(rural_rate: BlockRate) {
        let rate = ElectricRate::Block(rural_rate);
        // 20 + 500 * 0.3 + 250 * 0.25 + 250 * 0.45 + 200 * 0.4
        assert_relative_eq!(rate.monthly_cost(1_200., 0.).unwrap(), 425.);
        assert_relative_eq!(rate.monthly_cost(0., 0.).unwrap(), 20.);
    }

    #[rstest]
    fn should_apply_demand_charge_and_sales_tax(rural_rate: BlockRate) {
        let rate = ElectricRate::Block(BlockRate {
            demand_charge: 10.,
            sales_tax: 0.05,
            pce_rate: 0.,
            ..rural_rate
        });
        assert_relative_eq!(
            rate.monthly_cost(100., 2.).unwrap(),
            (20. + 2. * 10. + 100. * 0.5) * 1.05,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_price_increment_over_base_use(rural_rate: BlockRate) {
        let rate = ElectricRate::Block(rural_rate);
        let added = MonthlyElectricUse {
            kwh: [500.; 12],
            peak_kw: [0.; 12],
        };
        // base of 500 kWh: the added 500 kWh fall in the 0.25 and 0.45 blocks
        assert_relative_eq!(
            rate.incremental_annual_cost(500., &added).unwrap(),
            12. * (250. * 0.25 + 250. * 0.45),
            max_relative = 1e-12
        );

        let flat = ElectricRate::Flat { price_per_kwh: 0.2 };
        assert_relative_eq!(flat.incremental_annual_cost(500., &added).unwrap(), 1_200.);
    }

    #[rstest]
    fn should_reject_rate_without_open_ended_block(mut rural_rate: BlockRate) {
        rural_rate.blocks.pop();
        assert!(ElectricRate::Block(rural_rate).validate().is_err());
    }

    #[rstest]
    fn should_deserialize_block_rate() {
        let rate: ElectricRate = serde_json::from_str(
            r#"{"type": "block", "blocks": [{"upper_kwh": null, "rate": 0.22}], "customer_charge": 12}"#,
        )
        .unwrap();
        let ElectricRate::Block(block_rate) = rate else {
            panic!("expected a block rate")
        };
        assert_eq!(block_rate.pce_limit, Some(750.));
        assert_eq!(block_rate.customer_charge, 12.);
    }
}
