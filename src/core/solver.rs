use serde::Serialize;
use tracing::debug;

use super::engine::{run, validate};
use super::error::SimulationError;
use super::types::SimulationParameters;

#[derive(Debug, Clone, Copy)]
pub struct SpendSolveConfig {
    /// Highest acceptable bankruptcy probability, in percent.
    pub goal_bankruptcy_pct: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub trials_per_iteration: u32,
    pub final_trials: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_spend: f64,
    pub bankruptcy_probability: f64,
    pub ci_half_width: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendSolveResult {
    pub goal_bankruptcy_pct: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub solved_spend: Option<f64>,
    pub achieved_bankruptcy_probability: Option<f64>,
    pub achieved_ci_half_width: Option<f64>,
    pub iterations: Vec<SpendSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Largest annual spend whose bankruptcy probability stays within the goal.
///
/// Bisection is valid because, for a fixed seed, raising spend never lowers
/// the bankruptcy probability.
pub fn solve_max_spend(
    params: &SimulationParameters,
    config: SpendSolveConfig,
) -> Result<SpendSolveResult, SimulationError> {
    validate_config(config)?;
    validate(params)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval =
        evaluate_candidate(params, config, config.search_min, config.trials_per_iteration)?;
    let high_eval =
        evaluate_candidate(params, config, config.search_max, config.trials_per_iteration)?;

    let mut solved_spend = None;
    let mut converged = false;
    let feasible;
    let message;

    if !meets_goal(low_eval.bankruptcy_probability, config) {
        feasible = false;
        message = "No feasible spend found within the search bounds.".to_string();
    } else if meets_goal(high_eval.bankruptcy_probability, config) {
        solved_spend = Some(config.search_max);
        converged = true;
        feasible = true;
        message = "Upper spend bound still meets the goal; increase search max for a higher answer."
            .to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(params, config, mid, config.trials_per_iteration)?;
            debug!(
                iteration = it,
                lower = lo,
                upper = hi,
                candidate = mid,
                bankruptcy_probability = eval.bankruptcy_probability,
                "spend solver step"
            );
            iterations.push(SpendSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_spend: mid,
                bankruptcy_probability: eval.bankruptcy_probability,
                ci_half_width: eval.ci_half_width,
            });

            if meets_goal(eval.bankruptcy_probability, config) {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_spend = Some(lo);
        feasible = true;
        message = if converged {
            "Solved maximum sustainable spend.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    let mut achieved_bankruptcy_probability = None;
    let mut achieved_ci_half_width = None;
    if let Some(spend) = solved_spend {
        let final_eval = evaluate_candidate(params, config, spend, config.final_trials)?;
        achieved_bankruptcy_probability = Some(final_eval.bankruptcy_probability);
        achieved_ci_half_width = Some(final_eval.ci_half_width);
    }

    Ok(SpendSolveResult {
        goal_bankruptcy_pct: config.goal_bankruptcy_pct,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        solved_spend,
        achieved_bankruptcy_probability,
        achieved_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn meets_goal(bankruptcy_probability: f64, config: SpendSolveConfig) -> bool {
    bankruptcy_probability <= config.goal_bankruptcy_pct + 1e-12
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    bankruptcy_probability: f64,
    ci_half_width: f64,
}

fn evaluate_candidate(
    base: &SimulationParameters,
    config: SpendSolveConfig,
    spend: f64,
    trials: u32,
) -> Result<CandidateEval, SimulationError> {
    let params = SimulationParameters {
        annual_spend: spend.max(0.0),
        trial_count: trials.max(1),
        ..*base
    };
    let result = run(&params, config.seed)?;
    let probability = result.bankruptcy_probability();
    Ok(CandidateEval {
        bankruptcy_probability: probability,
        ci_half_width: binomial_ci_half_width_pct(probability, params.trial_count),
    })
}

/// 95% normal-approximation half width, in percentage points.
fn binomial_ci_half_width_pct(pct: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = (pct / 100.0).clamp(0.0, 1.0);
    100.0 * 1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

fn validate_config(config: SpendSolveConfig) -> Result<(), SimulationError> {
    if !(0.0..=100.0).contains(&config.goal_bankruptcy_pct) {
        return Err(SimulationError::invalid(
            "goal_bankruptcy_pct",
            "must be between 0 and 100",
        ));
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err(SimulationError::invalid("search_bounds", "must be finite"));
    }
    if config.search_min < 0.0 {
        return Err(SimulationError::invalid("search_min", "must be >= 0"));
    }
    if config.search_max <= config.search_min {
        return Err(SimulationError::invalid(
            "search_max",
            "must be greater than search_min",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(SimulationError::invalid("tolerance", "must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(SimulationError::invalid("max_iterations", "must be > 0"));
    }
    if config.trials_per_iteration == 0 {
        return Err(SimulationError::invalid("trials_per_iteration", "must be > 0"));
    }
    if config.final_trials == 0 {
        return Err(SimulationError::invalid("final_trials", "must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_params() -> SimulationParameters {
        SimulationParameters {
            mean_annual_return: 0.0,
            annual_volatility: 0.0,
            horizon_years: 10,
            initial_net_worth: 1_000.0,
            annual_spend: 0.0,
            annual_inflation: 0.0,
            trial_count: 1,
        }
    }

    fn config() -> SpendSolveConfig {
        SpendSolveConfig {
            goal_bankruptcy_pct: 0.0,
            search_min: 0.0,
            search_max: 500.0,
            tolerance: 0.5,
            max_iterations: 40,
            trials_per_iteration: 1,
            final_trials: 1,
            seed: 7,
        }
    }

    #[test]
    fn finds_deterministic_max_spend() {
        // 1_000 over 10 flat years: anything under 100 a year survives.
        let result = solve_max_spend(&deterministic_params(), config()).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        let spend = result.solved_spend.expect("spend expected");
        assert_close(spend, 100.0, config().tolerance + 1e-9);
        assert!(spend < 100.0);
        assert_eq!(result.achieved_bankruptcy_probability, Some(0.0));
    }

    #[test]
    fn reports_infeasible_when_even_the_minimum_fails() {
        let cfg = SpendSolveConfig {
            search_min: 200.0,
            ..config()
        };
        let result = solve_max_spend(&deterministic_params(), cfg).expect("must return result");
        assert!(!result.feasible);
        assert!(result.solved_spend.is_none());
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn returns_upper_bound_when_it_already_meets_goal() {
        let cfg = SpendSolveConfig {
            search_max: 50.0,
            ..config()
        };
        let result = solve_max_spend(&deterministic_params(), cfg).expect("must solve");
        assert!(result.feasible);
        assert_eq!(result.solved_spend, Some(50.0));
    }

    #[test]
    fn stochastic_solution_meets_goal() {
        let params = SimulationParameters {
            mean_annual_return: 0.07,
            annual_volatility: 0.15,
            horizon_years: 25,
            initial_net_worth: 3_000_000.0,
            annual_spend: 0.0,
            annual_inflation: 0.03,
            trial_count: 1,
        };
        let cfg = SpendSolveConfig {
            goal_bankruptcy_pct: 5.0,
            search_min: 0.0,
            search_max: 1_000_000.0,
            tolerance: 1_000.0,
            max_iterations: 30,
            trials_per_iteration: 400,
            final_trials: 400,
            seed: 42,
        };
        let result = solve_max_spend(&params, cfg).expect("must solve");
        assert!(result.feasible);
        let spend = result.solved_spend.expect("spend expected");
        assert!(spend > 0.0 && spend < 1_000_000.0);
        let achieved = result.achieved_bankruptcy_probability.expect("probability");
        assert!(achieved <= 5.0, "achieved {achieved}");
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = [
            SpendSolveConfig {
                goal_bankruptcy_pct: 120.0,
                ..config()
            },
            SpendSolveConfig {
                search_max: 0.0,
                ..config()
            },
            SpendSolveConfig {
                tolerance: 0.0,
                ..config()
            },
            SpendSolveConfig {
                trials_per_iteration: 0,
                ..config()
            },
        ];
        for cfg in bad {
            let err = solve_max_spend(&deterministic_params(), cfg).expect_err("must reject");
            assert!(matches!(err, SimulationError::InvalidParameter { .. }));
        }
    }

    #[test]
    fn ci_half_width_is_zero_at_the_extremes() {
        assert_eq!(binomial_ci_half_width_pct(0.0, 100), 0.0);
        assert_eq!(binomial_ci_half_width_pct(100.0, 100), 0.0);
        assert_close(binomial_ci_half_width_pct(50.0, 100), 9.8, 1e-9);
    }
}
