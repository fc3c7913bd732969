use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    DEFAULT_TRIAL_COUNT, SimulationError, SimulationParameters, SpendSolveConfig,
    SpendSolveResult, TrialPath, YearBand, fresh_seed, run, solve_max_spend,
};

#[derive(Debug, Parser)]
#[command(
    name = "retire",
    about = "Monte Carlo retirement estimator (daily compounding, inflation-adjusted spending)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one simulation and print the report as JSON.
    Simulate(SimulateArgs),
    /// Search for the largest annual spend that meets the bankruptcy goal.
    Solve {
        #[command(flatten)]
        sim: SimulateArgs,
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 25, help = "Years to simulate")]
    years: u32,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual return in percent, e.g. 7"
    )]
    return_mean: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Annual return volatility in percent"
    )]
    return_volatility: f64,
    #[arg(long, default_value_t = 3_000_000.0)]
    initial_net_worth: f64,
    #[arg(
        long,
        default_value_t = 1_000_000.0,
        help = "Annual spending in today's money"
    )]
    annual_spend: f64,
    #[arg(long, default_value_t = 3.0, help = "Annual inflation in percent")]
    inflation: f64,
    #[arg(long, default_value_t = DEFAULT_TRIAL_COUNT)]
    trials: u32,
    #[arg(long, help = "Base seed; a fresh one is drawn when omitted")]
    seed: Option<u64>,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Maximum acceptable bankruptcy probability in percent"
    )]
    goal_pct: f64,
    #[arg(long, default_value_t = 50, help = "Number of paths to include in the report")]
    sample_paths: usize,
}

#[derive(Debug, Clone, Args)]
pub struct SolveArgs {
    #[arg(long, default_value_t = 0.0)]
    search_min: f64,
    #[arg(long, help = "Upper spend bound; defaults to --initial-net-worth")]
    search_max: Option<f64>,
    #[arg(long, default_value_t = 1_000.0)]
    tolerance: f64,
    #[arg(long, default_value_t = 30)]
    max_iterations: u32,
    #[arg(long, default_value_t = 2_000)]
    trials_per_iteration: u32,
    #[arg(long, default_value_t = DEFAULT_TRIAL_COUNT)]
    final_trials: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateReport {
    pub seed: u64,
    pub bankruptcy_probability: f64,
    pub goal_pct: f64,
    pub meets_goal: bool,
    pub final_balance_mean: f64,
    pub final_balance_median: f64,
    pub final_balance_std_dev: f64,
    pub final_balance_min: f64,
    pub final_balance_max: f64,
    pub final_balance_positive_mean: f64,
    pub final_balance_10th_percentile: f64,
    pub final_balance_90th_percentile: f64,
    pub year_bands: Vec<YearBand>,
    pub sample_paths: Vec<TrialPath>,
    pub parameters: SimulationParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveReport {
    pub seed: u64,
    pub parameters: SimulationParameters,
    #[serde(flatten)]
    pub result: SpendSolveResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Why a request could not be answered.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A human-facing flag or field was out of range.
    #[error("{0}")]
    Input(String),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

impl RequestError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Input(_) | Self::Simulation(SimulationError::InvalidParameter { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Simulation(
                SimulationError::NumericOverflow { .. } | SimulationError::SummaryOverflow { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Converts percent-denominated arguments into engine parameters.
pub fn build_params(args: &SimulateArgs) -> Result<SimulationParameters, String> {
    if args.years == 0 {
        return Err("--years must be > 0".to_string());
    }
    if args.trials == 0 {
        return Err("--trials must be > 0".to_string());
    }
    for (flag, value) in [
        ("--return-mean", args.return_mean),
        ("--return-volatility", args.return_volatility),
        ("--initial-net-worth", args.initial_net_worth),
        ("--annual-spend", args.annual_spend),
        ("--inflation", args.inflation),
    ] {
        if !value.is_finite() {
            return Err(format!("{flag} must be a finite number"));
        }
    }
    if args.return_volatility < 0.0 {
        return Err("--return-volatility must be >= 0".to_string());
    }
    if args.initial_net_worth < 0.0 {
        return Err("--initial-net-worth must be >= 0".to_string());
    }
    if args.annual_spend < 0.0 {
        return Err("--annual-spend must be >= 0".to_string());
    }
    if !(0.0..=100.0).contains(&args.goal_pct) {
        return Err("--goal-pct must be between 0 and 100".to_string());
    }

    Ok(SimulationParameters {
        mean_annual_return: args.return_mean / 100.0,
        annual_volatility: args.return_volatility / 100.0,
        horizon_years: args.years,
        initial_net_worth: args.initial_net_worth,
        annual_spend: args.annual_spend,
        annual_inflation: args.inflation / 100.0,
        trial_count: args.trials,
    })
}

fn build_solve_config(
    args: &SimulateArgs,
    solve: &SolveArgs,
    seed: u64,
) -> Result<SpendSolveConfig, String> {
    let search_max = solve.search_max.unwrap_or(args.initial_net_worth);
    if !solve.search_min.is_finite() || solve.search_min < 0.0 {
        return Err("--search-min must be >= 0".to_string());
    }
    if !search_max.is_finite() || search_max <= solve.search_min {
        return Err("--search-max must be greater than --search-min".to_string());
    }
    if !solve.tolerance.is_finite() || solve.tolerance <= 0.0 {
        return Err("--tolerance must be > 0".to_string());
    }
    if solve.max_iterations == 0 {
        return Err("--max-iterations must be > 0".to_string());
    }
    if solve.trials_per_iteration == 0 {
        return Err("--trials-per-iteration must be > 0".to_string());
    }
    if solve.final_trials == 0 {
        return Err("--final-trials must be > 0".to_string());
    }

    Ok(SpendSolveConfig {
        goal_bankruptcy_pct: args.goal_pct,
        search_min: solve.search_min,
        search_max,
        tolerance: solve.tolerance,
        max_iterations: solve.max_iterations,
        trials_per_iteration: solve.trials_per_iteration,
        final_trials: solve.final_trials,
        seed,
    })
}

pub fn simulate(args: &SimulateArgs) -> Result<SimulateReport, RequestError> {
    let params = build_params(args).map_err(RequestError::Input)?;
    let seed = args.seed.unwrap_or_else(fresh_seed);

    info!(
        years = params.horizon_years,
        trials = params.trial_count,
        seed,
        "running simulation"
    );
    let result = run(&params, seed)?;
    let summary = result.summary();
    let bankruptcy_probability = result.bankruptcy_probability();
    info!(bankruptcy_probability, "simulation finished");

    Ok(SimulateReport {
        seed,
        bankruptcy_probability,
        goal_pct: args.goal_pct,
        meets_goal: bankruptcy_probability <= args.goal_pct,
        final_balance_mean: summary.mean,
        final_balance_median: summary.median,
        final_balance_std_dev: summary.std_dev,
        final_balance_min: summary.min,
        final_balance_max: summary.max,
        final_balance_positive_mean: summary.positive_mean,
        final_balance_10th_percentile: summary.p10,
        final_balance_90th_percentile: summary.p90,
        year_bands: result.year_bands(),
        sample_paths: result
            .sample_paths(args.sample_paths)
            .into_iter()
            .cloned()
            .collect(),
        parameters: params,
    })
}

pub fn solve(args: &SimulateArgs, solve: &SolveArgs) -> Result<SolveReport, RequestError> {
    let params = build_params(args).map_err(RequestError::Input)?;
    let seed = args.seed.unwrap_or_else(fresh_seed);
    let config = build_solve_config(args, solve, seed).map_err(RequestError::Input)?;

    info!(
        goal_pct = config.goal_bankruptcy_pct,
        search_min = config.search_min,
        search_max = config.search_max,
        seed,
        "solving maximum spend"
    );
    let result = solve_max_spend(&params, config)?;
    info!(
        solved_spend = ?result.solved_spend,
        converged = result.converged,
        "spend solver finished"
    );

    Ok(SolveReport {
        seed,
        parameters: params,
        result,
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!("retirement simulator API listening on http://{addr}");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/solve",
            get(solve_get_handler).post(solve_post_handler),
        )
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn solve_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let (args, _) = args_from_payload(payload);
    let outcome = tokio::task::spawn_blocking(move || simulate(&args)).await;
    respond(outcome)
}

async fn solve_handler_impl(payload: SimulatePayload) -> Response {
    let (args, solve_args) = args_from_payload(payload);
    let outcome = tokio::task::spawn_blocking(move || solve(&args, &solve_args)).await;
    respond(outcome)
}

fn respond<T: Serialize>(
    outcome: Result<Result<T, RequestError>, tokio::task::JoinError>,
) -> Response {
    match outcome {
        Ok(Ok(report)) => json_response(StatusCode::OK, report),
        Ok(Err(err)) => {
            warn!(error = %err, "request rejected");
            error_response(err.status(), &err.to_string())
        }
        Err(err) => {
            warn!(error = %err, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation task failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    years: Option<u32>,
    return_mean: Option<f64>,
    return_volatility: Option<f64>,
    initial_net_worth: Option<f64>,
    annual_spend: Option<f64>,
    inflation: Option<f64>,
    trials: Option<u32>,
    seed: Option<u64>,
    goal_pct: Option<f64>,
    sample_paths: Option<usize>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    trials_per_iteration: Option<u32>,
    final_trials: Option<u32>,
}

fn default_args_for_api() -> (SimulateArgs, SolveArgs) {
    (
        SimulateArgs {
            years: 25,
            return_mean: 7.0,
            return_volatility: 15.0,
            initial_net_worth: 3_000_000.0,
            annual_spend: 1_000_000.0,
            inflation: 3.0,
            trials: DEFAULT_TRIAL_COUNT,
            seed: None,
            goal_pct: 5.0,
            sample_paths: 50,
        },
        SolveArgs {
            search_min: 0.0,
            search_max: None,
            tolerance: 1_000.0,
            max_iterations: 30,
            trials_per_iteration: 2_000,
            final_trials: DEFAULT_TRIAL_COUNT,
        },
    )
}

fn args_from_payload(payload: SimulatePayload) -> (SimulateArgs, SolveArgs) {
    let (mut args, mut solve) = default_args_for_api();

    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.return_mean {
        args.return_mean = v;
    }
    if let Some(v) = payload.return_volatility {
        args.return_volatility = v;
    }
    if let Some(v) = payload.initial_net_worth {
        args.initial_net_worth = v;
    }
    if let Some(v) = payload.annual_spend {
        args.annual_spend = v;
    }
    if let Some(v) = payload.inflation {
        args.inflation = v;
    }
    if let Some(v) = payload.trials {
        args.trials = v;
    }
    if payload.seed.is_some() {
        args.seed = payload.seed;
    }
    if let Some(v) = payload.goal_pct {
        args.goal_pct = v;
    }
    if let Some(v) = payload.sample_paths {
        args.sample_paths = v;
    }

    if let Some(v) = payload.search_min {
        solve.search_min = v;
    }
    if payload.search_max.is_some() {
        solve.search_max = payload.search_max;
    }
    if let Some(v) = payload.tolerance {
        solve.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        solve.max_iterations = v;
    }
    if let Some(v) = payload.trials_per_iteration {
        solve.trials_per_iteration = v;
    }
    if let Some(v) = payload.final_trials {
        solve.final_trials = v;
    }

    (args, solve)
}
