/// Percentile helpers used to derive design conditions from climate data.
use itertools::Itertools;
use ordered_float::OrderedFloat;
use statrs::statistics::{Data, OrderStatistics};

pub fn percentile(numbers: &[f64], percentile: usize) -> f64 {
    let numbers = numbers.to_vec();
    let mut data = Data::new(numbers);

    data.percentile(percentile)
}

/// Percentile of a weighted sample, e.g. binned temperatures weighted by hours.
/// Returns the value at which the cumulative weight first reaches `fraction` of
/// the total weight. Returns None for an empty or weightless sample.
pub fn weighted_percentile(values_and_weights: &[(f64, f64)], fraction: f64) -> Option<f64> {
    let total_weight: f64 = values_and_weights.iter().map(|(_, w)| w).sum();
    if values_and_weights.is_empty() || total_weight <= 0. {
        return None;
    }
    let target = fraction.clamp(0., 1.) * total_weight;

    let mut cumulative = 0.;
    let sorted = values_and_weights
        .iter()
        .sorted_by_key(|(value, _)| OrderedFloat(*value))
        .collect_vec();
    for (value, weight) in &sorted {
        cumulative += weight;
        if cumulative >= target && *weight > 0. {
            return Some(*value);
        }
    }

    sorted.last().map(|(value, _)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn numbers() -> [f64; 10] {
        [9.0, 3.0, 3.0, 4.0, 5.0, 4.9, 8.0, 3.3, 2.0, 0.1]
    }

    #[rstest]
    fn test_percentile(numbers: [f64; 10]) {
        assert_relative_eq!(percentile(&numbers, 70), 4.95, epsilon = 1e-2);
        assert_relative_eq!(percentile(&numbers, 50), 3.65, epsilon = 1e-2);
    }

    #[rstest]
    fn test_weighted_percentile() {
        let bins = [(-20., 10.), (-10., 90.), (0., 900.), (10., 7760.)];
        assert_eq!(weighted_percentile(&bins, 0.01), Some(-10.));
        assert_eq!(weighted_percentile(&bins, 0.001), Some(-20.));
        assert_eq!(weighted_percentile(&bins, 0.5), Some(10.));
    }

    #[rstest]
    fn test_weighted_percentile_of_empty_sample() {
        assert_eq!(weighted_percentile(&[], 0.01), None);
        assert_eq!(weighted_percentile(&[(5., 0.)], 0.01), None);
    }
}
