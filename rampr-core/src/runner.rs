use crate::config::RunConfig;
use crate::scenario::Scenario;
use crate::schedule::RampingSchedule;
use crate::stats::{Stats, StatsSnapshot};
use crate::thresholds::{ThresholdOutcome, evaluate_thresholds};
use crate::vu::VuContext;
use crate::error::*;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SCHEDULER_TICK: Duration = Duration::from_millis(100);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
// Transport default when the scenario sets no deadline of its own.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

enum ExecutionMode {
    UntilStopped,
    Iterations(u64),
}

/// Outcome of a full ramped run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub snapshot: StatsSnapshot,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunReport {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }
}

fn build_client() -> Result<Client> {
    Ok(Client::builder()
        // One connection per VU: single idle slot and no cross-VU pooling
        .pool_max_idle_per_host(1)
        .http1_only()
        .tcp_nodelay(true)
        .no_proxy()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

struct RunningVu {
    vu_id: u64,
    task: Id,
    stop: CancellationToken,
}

/// Live VU tasks. `running` holds the VUs counted toward the schedule target;
/// `contexts` holds every task that has not been reaped yet, retired or not.
struct VuPool<S> {
    scenario: Arc<S>,
    stats: Arc<Stats>,
    run_token: CancellationToken,
    set: JoinSet<()>,
    running: Vec<RunningVu>,
    contexts: HashMap<Id, Arc<VuContext>>,
    next_vu_id: u64,
}

impl<S: Scenario> VuPool<S> {
    fn new(scenario: Arc<S>, stats: Arc<Stats>, run_token: CancellationToken) -> Self {
        Self {
            scenario,
            stats,
            run_token,
            set: JoinSet::new(),
            running: Vec::new(),
            contexts: HashMap::new(),
            next_vu_id: 1,
        }
    }

    fn scheduled(&self) -> u64 {
        self.running.len() as u64
    }

    fn spawn(&mut self) -> Result<()> {
        let vu_id = self.next_vu_id;
        self.next_vu_id += 1;
        let stop = self.run_token.child_token();
        let ctx = Arc::new(VuContext::new(
            vu_id,
            build_client()?,
            self.stats.clone(),
            stop.clone(),
        )?);
        let scenario = self.scenario.clone();
        let active = self.stats.active_vu();
        let task_ctx = ctx.clone();

        debug!(vu = vu_id, "spawning VU");
        let handle = self.set.spawn(async move {
            let _active = active;
            run_vu(scenario.as_ref(), &task_ctx, ExecutionMode::UntilStopped).await;
        });
        self.contexts.insert(handle.id(), ctx);
        self.running.push(RunningVu {
            vu_id,
            task: handle.id(),
            stop,
        });
        Ok(())
    }

    /// Retires the newest VU; it finishes its in-flight iteration.
    fn retire_newest(&mut self) {
        if let Some(vu) = self.running.pop() {
            debug!(vu = vu.vu_id, "retiring VU");
            vu.stop.cancel();
        }
    }

    fn reap_finished(&mut self) {
        while let Some(res) = self.set.try_join_next_with_id() {
            self.on_exit(res);
        }
    }

    async fn drain(&mut self) {
        while let Some(res) = self.set.join_next_with_id().await {
            self.on_exit(res);
        }
    }

    async fn abort_remaining(&mut self) {
        self.set.abort_all();
        self.drain().await;
    }

    fn on_exit(&mut self, res: std::result::Result<(Id, ()), JoinError>) {
        let task = match res {
            Ok((task, ())) => task,
            Err(e) if e.is_cancelled() => e.id(),
            Err(e) => {
                error!("VU task failed: {}", e);
                self.stats.record_error(format!("VU task failed: {}", e));
                e.id()
            }
        };
        // Frees the slot so the scheduler replaces a VU that died mid-stage.
        self.running.retain(|vu| vu.task != task);
        // Panicked or aborted VUs never reached their final flush.
        if let Some(ctx) = self.contexts.remove(&task) {
            ctx.flush_stats();
        }
    }
}

pub async fn run_load_test<S, F>(
    config: RunConfig,
    scenario: Arc<S>,
    mut on_progress: Option<F>,
) -> Result<RunReport>
where
    S: Scenario,
    F: FnMut(StatsSnapshot) + Send + 'static,
{
    config.validate()?;
    let schedule = RampingSchedule::new(config.start_vus, config.stages.clone());
    let stats = Arc::new(Stats::new()?);
    let run_token = CancellationToken::new();
    let mut pool = VuPool::new(scenario, stats.clone(), run_token.clone());
    let mut current_stage = None;

    info!(
        stages = config.stages.len(),
        max_vus = schedule.max_vus(),
        duration = ?schedule.total_duration(),
        "starting ramped run"
    );

    let start_time = Instant::now();
    let mut last_progress = start_time;
    let mut ticker = interval(SCHEDULER_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Main loop
    loop {
        ticker.tick().await;
        let elapsed = start_time.elapsed();

        let Some(target) = schedule.target_at(elapsed) else {
            break;
        };

        let stage = schedule.stage_index_at(elapsed);
        if stage != current_stage {
            if let Some(idx) = stage {
                info!(stage = idx + 1, target = config.stages[idx].target, "entering stage");
            }
            current_stage = stage;
        }

        pool.reap_finished();

        while pool.scheduled() < target {
            pool.spawn()?;
        }
        while pool.scheduled() > target {
            pool.retire_newest();
        }

        if let Some(ref mut cb) = on_progress
            && last_progress.elapsed() >= PROGRESS_INTERVAL
        {
            last_progress = Instant::now();
            cb(stats.snapshot(elapsed));
        }
    }

    info!("stages complete, stopping {} VUs", pool.scheduled());
    run_token.cancel();

    if timeout(config.graceful_stop, pool.drain()).await.is_err() {
        warn!(
            remaining = pool.set.len(),
            graceful_stop = ?config.graceful_stop,
            "VUs still running after graceful stop, aborting"
        );
        pool.abort_remaining().await;
    }

    let snapshot = stats.snapshot(start_time.elapsed());
    if let Some(ref mut cb) = on_progress {
        cb(snapshot.clone());
    }

    let thresholds = evaluate_thresholds(&config.thresholds, &snapshot);
    for outcome in thresholds.iter().filter(|t| !t.passed) {
        warn!(
            metric = %outcome.metric,
            expression = %outcome.expression,
            observed = ?outcome.observed,
            "threshold crossed"
        );
    }

    Ok(RunReport {
        snapshot,
        thresholds,
    })
}

/// Runs a single VU for exactly `iterations` iterations, without a ramp.
pub async fn run_iterations<S: Scenario>(scenario: &S, iterations: u64) -> Result<StatsSnapshot> {
    let stats = Arc::new(Stats::new()?);
    let start = Instant::now();
    let ctx = VuContext::new(1, build_client()?, stats.clone(), CancellationToken::new())?;

    let active = stats.active_vu();
    run_vu(scenario, &ctx, ExecutionMode::Iterations(iterations)).await;
    drop(active);

    Ok(stats.snapshot(start.elapsed()))
}

async fn run_vu<S: Scenario + ?Sized>(scenario: &S, ctx: &VuContext, mode: ExecutionMode) {
    let mut last_flush = Instant::now();
    let mut completed = 0u64;

    loop {
        match mode {
            ExecutionMode::UntilStopped => {
                if ctx.is_stopping() {
                    break;
                }
            }
            ExecutionMode::Iterations(n) => {
                if completed >= n {
                    break;
                }
            }
        }

        if let Err(e) = scenario.iteration(ctx).await {
            ctx.record_error(e.to_string());
        }
        ctx.record_iteration();
        completed += 1;

        if last_flush.elapsed() > FLUSH_INTERVAL {
            ctx.flush_stats();
            last_flush = Instant::now();
        }
    }

    ctx.flush_stats();
    debug!(vu = ctx.vu_id(), iterations = completed, "VU finished");
}
