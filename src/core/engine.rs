use rand_distr::Normal;
use rayon::prelude::*;

use super::error::SimulationError;
use super::rng::{TrialRng, fresh_seed};
use super::types::{SimulationParameters, SimulationResult, TrialPath};

/// Compounding sub-periods per simulated year (daily).
pub const SUB_PERIODS_PER_YEAR: usize = 365;

/// Runs `params.trial_count` independent trials seeded from `seed`.
///
/// Trials are spread over the rayon pool; each draws from its own stream, so
/// the same seed always yields the same result.
pub fn run(params: &SimulationParameters, seed: u64) -> Result<SimulationResult, SimulationError> {
    validate(params)?;
    let dist = sub_period_distribution(params)?;
    let withdrawals = withdrawal_schedule(params);

    let paths = (0..params.trial_count)
        .into_par_iter()
        .map(|trial| simulate_trial(params, &dist, &withdrawals, seed, trial))
        .collect::<Result<Vec<_>, _>>()?;

    SimulationResult::from_paths(paths)
}

/// Like [`run`] but with a freshly drawn seed.
pub fn run_with_entropy(
    params: &SimulationParameters,
) -> Result<SimulationResult, SimulationError> {
    run(params, fresh_seed())
}

pub fn validate(params: &SimulationParameters) -> Result<(), SimulationError> {
    if params.horizon_years < 1 {
        return Err(SimulationError::invalid("horizon_years", "must be >= 1"));
    }
    if params.trial_count < 1 {
        return Err(SimulationError::invalid("trial_count", "must be >= 1"));
    }
    if !params.annual_volatility.is_finite() || params.annual_volatility < 0.0 {
        return Err(SimulationError::invalid(
            "annual_volatility",
            format!("must be finite and >= 0, got {}", params.annual_volatility),
        ));
    }
    if !params.annual_spend.is_finite() || params.annual_spend < 0.0 {
        return Err(SimulationError::invalid(
            "annual_spend",
            format!("must be finite and >= 0, got {}", params.annual_spend),
        ));
    }
    if !params.initial_net_worth.is_finite() || params.initial_net_worth < 0.0 {
        return Err(SimulationError::invalid(
            "initial_net_worth",
            format!("must be finite and >= 0, got {}", params.initial_net_worth),
        ));
    }
    if !params.mean_annual_return.is_finite() {
        return Err(SimulationError::invalid("mean_annual_return", "must be finite"));
    }
    if !params.annual_inflation.is_finite() {
        return Err(SimulationError::invalid("annual_inflation", "must be finite"));
    }
    Ok(())
}

/// Log-return distribution of one sub-period, Itô-corrected so the annual
/// product has arithmetic mean `exp(mean_annual_return)`.
fn sub_period_distribution(params: &SimulationParameters) -> Result<Normal<f64>, SimulationError> {
    let periods = SUB_PERIODS_PER_YEAR as f64;
    let sub_mu = params.mean_annual_return / periods;
    let sub_sigma = params.annual_volatility / periods.sqrt();
    Normal::new(sub_mu - 0.5 * sub_sigma * sub_sigma, sub_sigma)
        .map_err(|e| SimulationError::invalid("annual_volatility", e.to_string()))
}

/// Withdrawal for each zero-based year index, inflated from year-0 money.
fn withdrawal_schedule(params: &SimulationParameters) -> Vec<f64> {
    let growth = 1.0 + params.annual_inflation;
    let mut factor = 1.0;
    (0..params.horizon_years)
        .map(|_| {
            let withdrawal = params.annual_spend * factor;
            factor *= growth;
            withdrawal
        })
        .collect()
}

fn simulate_trial(
    params: &SimulationParameters,
    dist: &Normal<f64>,
    withdrawals: &[f64],
    seed: u64,
    trial: u32,
) -> Result<TrialPath, SimulationError> {
    let mut rng = TrialRng::for_trial(seed, trial);
    let mut log_returns = [0.0_f64; SUB_PERIODS_PER_YEAR];
    let mut balances = Vec::with_capacity(withdrawals.len() + 1);
    let mut balance = params.initial_net_worth;
    balances.push(balance);

    for (year, &withdrawal) in withdrawals.iter().enumerate() {
        let year = year as u32 + 1;
        if !withdrawal.is_finite() {
            return Err(SimulationError::NumericOverflow { trial, year });
        }
        // Zero is absorbing: nothing grows back from it.
        if balance == 0.0 {
            balances.push(0.0);
            continue;
        }

        rng.fill(dist, &mut log_returns);
        let growth = log_returns.iter().sum::<f64>().exp();
        if !growth.is_finite() {
            return Err(SimulationError::NumericOverflow { trial, year });
        }

        balance = (balance * growth - withdrawal).max(0.0);
        if !balance.is_finite() {
            return Err(SimulationError::NumericOverflow { trial, year });
        }
        balances.push(balance);
    }

    Ok(TrialPath::new(balances))
}
