use std::sync::Arc;

mod checks;
mod config;
mod error;
mod payload;
mod response;
mod runner;
mod scenario;
mod schedule;
mod stats;
mod summary;
mod thresholds;
mod vu;

pub use checks::{CheckSummary, STATUS_WAS_200, STATUS_WAS_401, login_status_checks};
pub use config::{DEFAULT_LOGIN_URL, RunConfig, Stage, parse_duration};
pub use error::*;
pub use payload::{Credentials, generate_payload, random_int};
pub use response::Response;
pub use runner::RunReport;
pub use scenario::{LoginScenario, Scenario};
pub use schedule::RampingSchedule;
pub use stats::StatsSnapshot;
pub use summary::{LatencySummary, RunSummary};
pub use thresholds::{Aggregation, Comparison, Metric, Threshold, ThresholdOutcome};
pub use vu::VuContext;

/// Runs `scenario` under the ramp described by `config` and evaluates its thresholds.
pub async fn run_load_test<S, F>(
    config: RunConfig,
    scenario: Arc<S>,
    on_progress: Option<F>,
) -> Result<RunReport>
where
    S: Scenario,
    F: FnMut(StatsSnapshot) + Send + 'static,
{
    runner::run_load_test(config, scenario, on_progress).await
}

pub async fn run_iterations<S: Scenario>(scenario: &S, iterations: u64) -> Result<StatsSnapshot> {
    runner::run_iterations(scenario, iterations).await
}
