mod engine;
mod error;
mod rng;
mod solver;
mod stats;
mod types;

pub use engine::{SUB_PERIODS_PER_YEAR, run, run_with_entropy, validate};
pub use error::SimulationError;
pub use rng::{derive_seed, fresh_seed};
pub use solver::{SpendSolveConfig, SpendSolveIteration, SpendSolveResult, solve_max_spend};
pub use stats::{percentile, summarize_final_balances, year_bands};
pub use types::{
    DEFAULT_TRIAL_COUNT, FinalBalanceSummary, SimulationParameters, SimulationResult, TrialPath,
    YearBand,
};
