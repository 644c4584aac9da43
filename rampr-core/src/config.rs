use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::*;
use crate::thresholds::{Aggregation, Comparison, Metric, Threshold};

/// Login endpoint probed by the default scenario.
pub const DEFAULT_LOGIN_URL: &str = "http://192.168.1.34:8082/login";

/// One segment of the ramp: reach `target` VUs by the end of `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Stage {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Immutable run options handed to the runner at start.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub stages: Vec<Stage>,
    pub start_vus: u64,
    pub thresholds: Vec<Threshold>,
    pub graceful_stop: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        let secs = Duration::from_secs(5);
        Self {
            stages: vec![
                Stage::new(secs, 10),
                Stage::new(secs, 20),
                Stage::new(secs, 10),
                Stage::new(secs, 15),
                Stage::new(secs, 0),
            ],
            start_vus: 1,
            thresholds: vec![Threshold::new(
                Metric::HttpReqDuration,
                Aggregation::Percentile(99.0),
                Comparison::Lt,
                3000.0,
            )],
            graceful_stop: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    stages: Option<Vec<Stage>>,
    start_vus: Option<u64>,
    thresholds: Option<BTreeMap<String, Vec<String>>>,
    graceful_stop: Option<String>,
}

impl RunConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: OptionsFile = serde_yaml::from_str(content)?;
        let mut config = RunConfig::default();

        if let Some(stages) = file.stages {
            config.stages = stages;
        }
        if let Some(start_vus) = file.start_vus {
            config.start_vus = start_vus;
        }
        if let Some(thresholds) = file.thresholds {
            config.thresholds = thresholds
                .iter()
                .flat_map(|(metric, exprs)| exprs.iter().map(move |e| (metric, e)))
                .map(|(metric, expr)| Threshold::parse(metric, expr))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(graceful_stop) = file.graceful_stop {
            config.graceful_stop = parse_duration(&graceful_stop)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidConfig("at least one stage is required".to_owned()));
        }
        if self.total_duration().is_zero() {
            return Err(Error::InvalidConfig(
                "total stage duration must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

/// Parses k6-style durations such as `5s`, `250ms`, `1m30s` or `1.5h`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(Error::InvalidDuration(input.to_owned()));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| Error::InvalidDuration(input.to_owned()))?;
        let (num, tail) = rest.split_at(num_len);
        let value: f64 = num
            .parse()
            .map_err(|_| Error::InvalidDuration(input.to_owned()))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit_nanos = match unit {
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60_000_000_000.0,
            "h" => 3_600_000_000_000.0,
            _ => return Err(Error::InvalidDuration(input.to_owned())),
        };
        total += Duration::from_nanos((value * unit_nanos).round() as u64);
        rest = tail;
    }
    Ok(total)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Text(String),
    // Bare numbers are milliseconds, as in k6 option files.
    Millis(u64),
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Text(raw) => parse_duration(&raw).map_err(serde::de::Error::custom),
        RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
    }
}
