use serde::Serialize;

use super::error::SimulationError;
use super::stats::{summarize_final_balances, year_bands};

pub const DEFAULT_TRIAL_COUNT: u32 = 10_000;

/// Inputs to a single simulation run.
///
/// Rates are decimal fractions (0.07, not 7). Spend is expressed in year-0
/// purchasing power and grows with `annual_inflation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub mean_annual_return: f64,
    pub annual_volatility: f64,
    pub horizon_years: u32,
    pub initial_net_worth: f64,
    pub annual_spend: f64,
    pub annual_inflation: f64,
    pub trial_count: u32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            mean_annual_return: 0.07,
            annual_volatility: 0.15,
            horizon_years: 25,
            initial_net_worth: 3_000_000.0,
            annual_spend: 1_000_000.0,
            annual_inflation: 0.03,
            trial_count: DEFAULT_TRIAL_COUNT,
        }
    }
}

/// Yearly balances of one trial: index 0 is the starting balance, index k
/// the balance at the end of year k.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TrialPath {
    balances: Vec<f64>,
}

impl TrialPath {
    pub(crate) fn new(balances: Vec<f64>) -> Self {
        Self { balances }
    }

    pub fn balances(&self) -> &[f64] {
        &self.balances
    }

    pub fn final_balance(&self) -> f64 {
        self.balances.last().copied().unwrap_or(0.0)
    }

    pub fn is_bankrupt(&self) -> bool {
        self.final_balance() == 0.0
    }

    /// First year index at which the balance hit zero, if it ever did.
    pub fn ruin_year(&self) -> Option<usize> {
        self.balances.iter().position(|&b| b == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalBalanceSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Mean over trials that finished with a strictly positive balance.
    pub positive_mean: f64,
    pub p10: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBand {
    pub year: u32,
    pub p10: f64,
    pub median: f64,
    pub p90: f64,
}

/// Output of one engine run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    paths: Vec<TrialPath>,
    final_balances: Vec<f64>,
    bankrupt_trials: usize,
    summary: FinalBalanceSummary,
}

impl SimulationResult {
    /// `paths` must be non-empty; the engine validates `trial_count >= 1`.
    pub(crate) fn from_paths(paths: Vec<TrialPath>) -> Result<Self, SimulationError> {
        let final_balances: Vec<f64> = paths.iter().map(TrialPath::final_balance).collect();
        let bankrupt_trials = final_balances.iter().filter(|&&b| b == 0.0).count();
        let summary = summarize_final_balances(&final_balances)?;
        Ok(Self {
            paths,
            final_balances,
            bankrupt_trials,
            summary,
        })
    }

    pub fn paths(&self) -> &[TrialPath] {
        &self.paths
    }

    pub fn final_balances(&self) -> &[f64] {
        &self.final_balances
    }

    /// Percentage in `[0, 100]` of trials whose final balance is zero.
    pub fn bankruptcy_probability(&self) -> f64 {
        100.0 * self.bankrupt_trials as f64 / self.paths.len() as f64
    }

    pub fn bankrupt_trials(&self) -> usize {
        self.bankrupt_trials
    }

    pub fn summary(&self) -> FinalBalanceSummary {
        self.summary
    }

    pub fn year_bands(&self) -> Vec<YearBand> {
        year_bands(&self.paths)
    }

    /// Evenly strided subset of at most `limit` paths, in trial order.
    pub fn sample_paths(&self, limit: usize) -> Vec<&TrialPath> {
        if limit == 0 || self.paths.is_empty() {
            return Vec::new();
        }
        if limit >= self.paths.len() {
            return self.paths.iter().collect();
        }
        let stride = self.paths.len() as f64 / limit as f64;
        (0..limit)
            .map(|i| &self.paths[(i as f64 * stride) as usize])
            .collect()
    }
}
