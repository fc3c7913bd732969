use super::error::SimulationError;
use super::types::{FinalBalanceSummary, TrialPath, YearBand};

/// Linear interpolation between closest ranks. Sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

/// Fails with [`SimulationError::SummaryOverflow`] when the mean, the
/// standard deviation or the solvent mean is not finite.
pub fn summarize_final_balances(
    final_balances: &[f64],
) -> Result<FinalBalanceSummary, SimulationError> {
    if final_balances.is_empty() {
        return Ok(FinalBalanceSummary {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            positive_mean: 0.0,
            p10: 0.0,
            p90: 0.0,
        });
    }

    let n = final_balances.len() as f64;
    let mean = final_balances.iter().sum::<f64>() / n;
    let variance = final_balances
        .iter()
        .map(|b| (b - mean) * (b - mean))
        .sum::<f64>()
        / n;

    let (positive_sum, positive_count) = final_balances
        .iter()
        .filter(|&&b| b > 0.0)
        .fold((0.0, 0_usize), |(sum, count), b| (sum + b, count + 1));
    let positive_mean = if positive_count == 0 {
        0.0
    } else {
        positive_sum / positive_count as f64
    };

    let std_dev = variance.sqrt();

    for (statistic, value) in [
        ("mean", mean),
        ("std_dev", std_dev),
        ("positive_mean", positive_mean),
    ] {
        if !value.is_finite() {
            return Err(SimulationError::SummaryOverflow { statistic });
        }
    }

    let mut sorted = final_balances.to_vec();
    let median = percentile(&mut sorted, 50.0);

    Ok(FinalBalanceSummary {
        mean,
        median,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        positive_mean,
        p10: percentile(&mut sorted, 10.0),
        p90: percentile(&mut sorted, 90.0),
    })
}

/// Per-year 10th/50th/90th percentile balances across all trials.
pub fn year_bands(paths: &[TrialPath]) -> Vec<YearBand> {
    let Some(first) = paths.first() else {
        return Vec::new();
    };

    let mut column = Vec::with_capacity(paths.len());
    (0..first.balances().len())
        .map(|year| {
            column.clear();
            column.extend(paths.iter().map(|p| p.balances()[year]));
            let median = percentile(&mut column, 50.0);
            YearBand {
                year: year as u32,
                p10: percentile(&mut column, 10.0),
                median,
                p90: percentile(&mut column, 90.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn percentile_interpolates_between_points() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_approx(percentile(&mut values, 25.0), 1.75);
        assert_approx(percentile(&mut values, 50.0), 2.5);
        assert_approx(percentile(&mut values, 100.0), 4.0);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_approx(percentile(&mut [], 50.0), 0.0);
    }

    #[test]
    fn summary_reports_moments_and_solvent_mean() {
        let summary = summarize_final_balances(&[0.0, 0.0, 30.0, 50.0]).expect("finite");
        assert_approx(summary.mean, 20.0);
        assert_approx(summary.median, 15.0);
        // population variance: (400 + 400 + 100 + 900) / 4 = 450
        assert_approx(summary.std_dev, 450.0_f64.sqrt());
        assert_approx(summary.min, 0.0);
        assert_approx(summary.max, 50.0);
        assert_approx(summary.positive_mean, 40.0);
        assert!(summary.p10 <= summary.median && summary.median <= summary.p90);
    }

    #[test]
    fn summary_positive_mean_is_zero_when_every_trial_is_ruined() {
        let summary = summarize_final_balances(&[0.0, 0.0, 0.0]).expect("finite");
        assert_approx(summary.positive_mean, 0.0);
        assert_approx(summary.max, 0.0);
    }

    #[test]
    fn summary_rejects_moments_that_overflow() {
        // Each balance is finite, but squared deviations from the mean are not.
        let err = summarize_final_balances(&[0.0, 1.5e308]).expect_err("must overflow");
        assert_eq!(err, SimulationError::SummaryOverflow { statistic: "std_dev" });

        let err = summarize_final_balances(&[1.5e308, 1.5e308]).expect_err("must overflow");
        assert_eq!(err, SimulationError::SummaryOverflow { statistic: "mean" });
    }

    #[test]
    fn year_bands_cover_every_year() {
        let paths = vec![
            TrialPath::new(vec![100.0, 90.0, 80.0]),
            TrialPath::new(vec![100.0, 110.0, 120.0]),
            TrialPath::new(vec![100.0, 100.0, 100.0]),
        ];
        let bands = year_bands(&paths);
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[2].year, 2);
        assert_approx(bands[0].median, 100.0);
        assert_approx(bands[1].median, 100.0);
        assert_approx(bands[2].p10, 84.0);
        assert_approx(bands[2].p90, 116.0);
    }
}
