use dashmap::DashMap;
use serde::Serialize;

pub const STATUS_WAS_200: &str = "status was 200";
pub const STATUS_WAS_401: &str = "status was 401";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckCounter {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounter {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.passes += 1;
        } else {
            self.fails += 1;
        }
    }
}

/// Run-wide check counters keyed by check name.
#[derive(Debug, Default)]
pub struct CheckRegistry {
    counters: DashMap<String, CheckCounter>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, counter: CheckCounter) {
        let mut entry = self.counters.entry(name.to_owned()).or_default();
        entry.passes += counter.passes;
        entry.fails += counter.fails;
    }

    /// Summaries sorted by check name.
    pub fn summaries(&self) -> Vec<CheckSummary> {
        let mut out: Vec<CheckSummary> = self
            .counters
            .iter()
            .map(|r| CheckSummary {
                name: r.key().clone(),
                passes: r.value().passes,
                fails: r.value().fails,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.passes as f64 / self.total() as f64
    }
}

/// Both login checks, always evaluated together. `None` means no response was received.
pub fn login_status_checks(status: Option<u16>) -> [(&'static str, bool); 2] {
    [
        (STATUS_WAS_200, status == Some(200)),
        (STATUS_WAS_401, status == Some(401)),
    ]
}
