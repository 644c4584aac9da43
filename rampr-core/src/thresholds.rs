use std::fmt;

use serde::Serialize;

use crate::error::*;
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Request latency trend, in milliseconds.
    HttpReqDuration,
    /// Share of requests that failed at the transport level or returned >= 400.
    HttpReqFailed,
    /// Share of passing checks across all check names.
    Checks,
    HttpReqs,
    Iterations,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::HttpReqDuration => "http_req_duration",
            Metric::HttpReqFailed => "http_req_failed",
            Metric::Checks => "checks",
            Metric::HttpReqs => "http_reqs",
            Metric::Iterations => "iterations",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "http_req_duration" => Some(Metric::HttpReqDuration),
            "http_req_failed" => Some(Metric::HttpReqFailed),
            "checks" => Some(Metric::Checks),
            "http_reqs" => Some(Metric::HttpReqs),
            "iterations" => Some(Metric::Iterations),
            _ => None,
        }
    }

    fn supports(&self, aggregation: &Aggregation) -> bool {
        match self {
            Metric::HttpReqDuration => matches!(
                aggregation,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
            ),
            Metric::HttpReqFailed | Metric::Checks => matches!(aggregation, Aggregation::Rate),
            Metric::HttpReqs | Metric::Iterations => matches!(aggregation, Aggregation::Count),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Rate,
    Count,
}

impl Aggregation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "avg" => Some(Aggregation::Avg),
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            "med" => Some(Aggregation::Med),
            "rate" => Some(Aggregation::Rate),
            "count" => Some(Aggregation::Count),
            _ => {
                let inner = s.strip_prefix("p(")?.strip_suffix(')')?;
                let p: f64 = inner.trim().parse().ok()?;
                (0.0..=100.0).contains(&p).then_some(Aggregation::Percentile(p))
            }
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({})", p),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two-character operators first so "<=" is not read as "<".
    const TOKENS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }

    fn token(&self) -> &'static str {
        Self::TOKENS
            .iter()
            .find(|(_, c)| c == self)
            .map(|(t, _)| *t)
            .unwrap_or("?")
    }
}

/// A pass/fail criterion over one aggregated metric, e.g. `http_req_duration: p(99) < 3000`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub value: f64,
}

impl Threshold {
    pub fn new(metric: Metric, aggregation: Aggregation, comparison: Comparison, value: f64) -> Self {
        Self {
            metric,
            aggregation,
            comparison,
            value,
        }
    }

    pub fn parse(metric: &str, expr: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidThreshold {
            expr: format!("{}: {}", metric, expr),
            reason: reason.to_owned(),
        };

        let metric = Metric::from_name(metric.trim()).ok_or_else(|| invalid("unknown metric"))?;

        let (pos, token, comparison) = Comparison::TOKENS
            .iter()
            .filter_map(|(token, cmp)| expr.find(token).map(|pos| (pos, *token, *cmp)))
            .min_by_key(|(pos, token, _)| (*pos, usize::MAX - token.len()))
            .ok_or_else(|| invalid("missing comparison operator"))?;

        let lhs = expr[..pos].trim();
        let rhs = expr[pos + token.len()..].trim();

        let aggregation = Aggregation::parse(lhs).ok_or_else(|| invalid("unknown aggregation"))?;
        let value: f64 = rhs.parse().map_err(|_| invalid("threshold value is not a number"))?;

        if !metric.supports(&aggregation) {
            return Err(invalid("aggregation is not supported for this metric"));
        }

        Ok(Self::new(metric, aggregation, comparison, value))
    }

    /// Observed value of the aggregated metric, or `None` when nothing was sampled.
    pub fn observe(&self, snapshot: &StatsSnapshot) -> Option<f64> {
        match self.metric {
            Metric::HttpReqDuration => {
                let hist = &snapshot.latency_histogram;
                if hist.is_empty() {
                    return None;
                }
                let micros = match self.aggregation {
                    Aggregation::Avg => hist.mean(),
                    Aggregation::Min => hist.min() as f64,
                    Aggregation::Max => hist.max() as f64,
                    Aggregation::Med => hist.value_at_quantile(0.5) as f64,
                    Aggregation::Percentile(p) => hist.value_at_quantile(p / 100.0) as f64,
                    Aggregation::Rate | Aggregation::Count => return None,
                };
                Some(micros / 1000.0)
            }
            Metric::HttpReqFailed => ratio(snapshot.failed_requests, snapshot.total_requests),
            Metric::Checks => {
                let (passes, fails) = snapshot
                    .checks
                    .iter()
                    .fold((0, 0), |(p, f), c| (p + c.passes, f + c.fails));
                ratio(passes, passes + fails)
            }
            Metric::HttpReqs => Some(snapshot.total_requests as f64),
            Metric::Iterations => Some(snapshot.iterations as f64),
        }
    }

    pub fn evaluate(&self, snapshot: &StatsSnapshot) -> ThresholdOutcome {
        let observed = self.observe(snapshot);
        let passed = observed
            .map(|v| self.comparison.apply(v, self.value))
            .unwrap_or(true);
        ThresholdOutcome {
            metric: self.metric.name().to_owned(),
            expression: self.expression(),
            observed,
            passed,
        }
    }

    fn expression(&self) -> String {
        format!("{} {} {}", self.aggregation, self.comparison.token(), self.value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric.name(), self.expression())
    }
}

fn ratio(num: u64, den: u64) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn evaluate_thresholds(thresholds: &[Threshold], snapshot: &StatsSnapshot) -> Vec<ThresholdOutcome> {
    thresholds.iter().map(|t| t.evaluate(snapshot)).collect()
}
