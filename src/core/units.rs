use thiserror::Error;

pub const BTU_PER_KWH: f64 = 3_412.;
pub const BTU_PER_MMBTU: f64 = 1_000_000.;
pub const KWH_PER_BTU: f64 = 1. / BTU_PER_KWH;
/// kWh per MMBtu converted to a ratio of energies (MMBtu per MMBtu)
pub const MMBTU_PER_KWH: f64 = BTU_PER_KWH / BTU_PER_MMBTU;
pub const HOURS_PER_DAY: u32 = 24;
pub const DAYS_PER_YEAR: u32 = 365;
pub const HOURS_PER_YEAR: u32 = HOURS_PER_DAY * DAYS_PER_YEAR;
pub const MONTHS_PER_YEAR: usize = 12;
pub const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn btu_to_mmbtu(btu: f64) -> f64 {
    btu / BTU_PER_MMBTU
}

pub(crate) fn btu_to_kwh(btu: f64) -> f64 {
    btu * KWH_PER_BTU
}

pub(crate) fn celsius_to_fahrenheit(temp_c: f64) -> f64 {
    temp_c * 1.8 + 32.
}

/// Month (1-12) that a given hour of a non-leap year falls in. Hours beyond the
/// first year wrap round so that multi-year series are handled.
pub fn month_for_hour_of_year(hour: usize) -> u8 {
    let mut hour_of_year = (hour % HOURS_PER_YEAR as usize) as u32;
    for (month_idx, days) in DAYS_IN_MONTH.iter().enumerate() {
        let hours_in_month = days * HOURS_PER_DAY;
        if hour_of_year < hours_in_month {
            return (month_idx + 1) as u8;
        }
        hour_of_year -= hours_in_month;
    }
    // unreachable for hour_of_year < 8760
    MONTHS_PER_YEAR as u8
}

/// Level annual payment that repays `principal` over `term_years` at `rate`.
pub(crate) fn level_annual_payment(
    principal: f64,
    rate: f64,
    term_years: u32,
) -> Result<f64, BadLoanTermsError> {
    if term_years == 0 {
        return Err(BadLoanTermsError);
    }
    if rate == 0. {
        return Ok(principal / term_years as f64);
    }
    let factor = (1. + rate).powi(term_years as i32);
    Ok(principal * rate * factor / (factor - 1.))
}

#[derive(Debug, Error)]
#[error("A loan must have a term of at least one year")]
pub struct BadLoanTermsError;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_convert_between_heat_units() {
        assert_eq!(btu_to_mmbtu(2_500_000.), 2.5);
        assert_relative_eq!(btu_to_kwh(3_412.), 1.0);
        assert_relative_eq!(MMBTU_PER_KWH * 5.5, 0.018766, epsilon = 1e-9);
    }

    #[rstest]
    #[case(0., 32.)]
    #[case(-40., -40.)]
    #[case(20., 68.)]
    fn should_convert_celsius_to_fahrenheit(#[case] temp_c: f64, #[case] expected: f64) {
        assert_relative_eq!(celsius_to_fahrenheit(temp_c), expected);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(743, 1)]
    #[case(744, 2)]
    #[case(1415, 2)]
    #[case(1416, 3)]
    #[case(8759, 12)]
    #[case(8760, 1)]
    fn should_find_month_for_hour(#[case] hour: usize, #[case] expected_month: u8) {
        assert_eq!(month_for_hour_of_year(hour), expected_month);
    }

    #[rstest]
    fn should_calc_level_payment() {
        assert_eq!(level_annual_payment(1000., 0., 4).unwrap(), 250.);
        // standard annuity: 10,000 over 10 years at 5%
        assert_relative_eq!(
            level_annual_payment(10_000., 0.05, 10).unwrap(),
            1295.0457496545667,
            max_relative = 1e-9
        );
        assert!(level_annual_payment(1000., 0.05, 0).is_err());
    }
}
