use std::time::Duration;

use crate::config::Stage;

/// Target VU count over time for a ramping stage list.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start_vus: u64,
    stages: Vec<Stage>,
}

impl RampingSchedule {
    pub fn new(start_vus: u64, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_vus(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u64::max)
    }

    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut offset = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            offset += stage.duration;
            if elapsed < offset {
                return Some(idx);
            }
        }
        None
    }

    /// Number of VUs that should be active `elapsed` into the run, or `None`
    /// once the last stage has finished.
    ///
    /// Each stage moves linearly from the previous target (or `start_vus`) to
    /// its own target. Ramp-ups round down and ramp-downs round up, so a stage
    /// only reports its exact target at its end.
    pub fn target_at(&self, elapsed: Duration) -> Option<u64> {
        let mut from = self.start_vus;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            let end = offset + stage.duration;
            if elapsed < end {
                let progress =
                    (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                return Some(interpolate(from, stage.target, progress));
            }
            from = stage.target;
            offset = end;
        }
        None
    }
}

fn interpolate(from: u64, to: u64, progress: f64) -> u64 {
    let value = from as f64 + (to as f64 - from as f64) * progress;
    if to >= from {
        value.floor() as u64
    } else {
        value.ceil() as u64
    }
}
