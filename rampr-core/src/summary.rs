use std::collections::BTreeMap;

use serde::Serialize;

use crate::checks::CheckSummary;
use crate::runner::RunReport;
use crate::stats::StatsSnapshot;
use crate::thresholds::ThresholdOutcome;

/// Request latency aggregates, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        let hist = &snapshot.latency_histogram;
        if hist.is_empty() {
            return Self::default();
        }
        let ms = |micros: u64| micros as f64 / 1000.0;
        Self {
            avg: hist.mean() / 1000.0,
            min: ms(hist.min()),
            med: ms(hist.value_at_quantile(0.5)),
            max: ms(hist.max()),
            p90: ms(hist.value_at_quantile(0.9)),
            p95: ms(hist.value_at_quantile(0.95)),
            p99: ms(hist.value_at_quantile(0.99)),
        }
    }
}

/// End-of-run report, serialized for `--output json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub duration_secs: f64,
    pub iterations: u64,
    pub http_reqs: u64,
    pub http_req_failed_rate: f64,
    pub data_received_bytes: u64,
    pub http_req_duration: LatencySummary,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    pub thresholds_passed: bool,
    pub status_counts: BTreeMap<u16, u64>,
    pub errors: BTreeMap<String, u64>,
}

impl RunSummary {
    pub fn from_report(report: &RunReport) -> Self {
        let s = &report.snapshot;
        let failed_rate = if s.total_requests > 0 {
            s.failed_requests as f64 / s.total_requests as f64
        } else {
            0.0
        };

        Self {
            duration_secs: s.elapsed.as_secs_f64(),
            iterations: s.iterations,
            http_reqs: s.total_requests,
            http_req_failed_rate: failed_rate,
            data_received_bytes: s.total_bytes_received,
            http_req_duration: LatencySummary::from_snapshot(s),
            checks: s.checks.clone(),
            thresholds: report.thresholds.clone(),
            thresholds_passed: report.thresholds_passed(),
            status_counts: s.status_counts.iter().map(|(k, v)| (*k, *v)).collect(),
            errors: s.errors.clone().into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{LocalStats, Stats};
    use crate::thresholds::{Threshold, evaluate_thresholds};
    use std::time::Duration;

    fn report() -> RunReport {
        let stats = Stats::new().unwrap();
        let local = LocalStats::new().unwrap();
        local.record_request(Duration::from_millis(10), 100, Some(200));
        local.record_request(Duration::from_millis(30), 80, Some(401));
        local.record_request(Duration::from_millis(5), 0, None);
        local.record_error("Request timeout".to_owned());
        local.record_check("status was 200", true);
        local.record_check("status was 200", false);
        local.record_iteration();
        local.record_iteration();
        local.flush(&stats);
        let snapshot = stats.snapshot(Duration::from_secs(2));

        let thresholds = vec![Threshold::parse("http_req_duration", "p(99) < 3000").unwrap()];
        RunReport {
            thresholds: evaluate_thresholds(&thresholds, &snapshot),
            snapshot,
        }
    }

    #[test]
    fn summary_aggregates_report() {
        let summary = RunSummary::from_report(&report());
        assert_eq!(summary.duration_secs, 2.0);
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.http_reqs, 3);
        assert!((summary.http_req_failed_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.data_received_bytes, 180);
        assert!(summary.thresholds_passed);
        assert_eq!(summary.status_counts.get(&401), Some(&1));
        assert_eq!(summary.errors.get("Request timeout"), Some(&1));

        let lat = &summary.http_req_duration;
        assert!(lat.min >= 9.9 && lat.min <= 10.1, "min {}", lat.min);
        assert!(lat.max >= 29.9 && lat.max <= 30.1, "max {}", lat.max);
    }

    #[test]
    fn summary_serializes_to_json() {
        let json = serde_json::to_value(RunSummary::from_report(&report())).unwrap();
        assert_eq!(json["http_reqs"], 3);
        assert_eq!(json["checks"][0]["name"], "status was 200");
        assert_eq!(json["thresholds"][0]["metric"], "http_req_duration");
        assert_eq!(json["thresholds"][0]["expression"], "p(99) < 3000");
        assert_eq!(json["status_counts"]["200"], 1);
    }

    #[test]
    fn empty_histogram_yields_zeroes() {
        let snapshot = Stats::new().unwrap().snapshot(Duration::ZERO);
        assert_eq!(LatencySummary::from_snapshot(&snapshot), LatencySummary::default());
    }
}
