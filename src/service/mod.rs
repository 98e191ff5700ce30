mod metrics;

pub mod alertmanager;
pub mod enrichment;
pub mod router;
pub mod scheduler;
pub mod snapshot;

use alertmanager::{AdapterRegistry, PullContext, UpstreamRegistry};
use autometrics::objectives::{Objective, ObjectiveLatency, ObjectivePercentile};
use enrichment::{EnrichmentConfig, Enricher};
use std::sync::Arc;
use std::time::Duration;

pub use metrics::Metrics;
pub use scheduler::SchedulerConfig;

pub const AMVIEW_SLO: Objective = Objective::new("amview")
    .success_rate(ObjectivePercentile::P99)
    .latency(ObjectiveLatency::Ms250, ObjectivePercentile::P95);

#[derive(Clone)]
pub struct Service {
    upstreams: Arc<UpstreamRegistry>,
    context: Arc<PullContext>,
}

impl Service {
    pub fn new(
        upstreams: UpstreamRegistry,
        enrichment_config: &EnrichmentConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            upstreams: Arc::new(upstreams),
            context: Arc::new(PullContext {
                adapters: AdapterRegistry::default(),
                enricher: Enricher::new(enrichment_config),
                metrics,
            }),
        }
    }

    pub fn upstreams(&self) -> &UpstreamRegistry {
        &self.upstreams
    }
}

/// Parses durations such as `40s`, `1m`, `500ms` or `1h30m`. A bare number is
/// taken as seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Empty duration".to_owned());
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("Missing unit in duration \"{value}\""))?;
        if digits == 0 {
            return Err(format!("Invalid duration \"{value}\""));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|err| format!("Invalid duration \"{value}\": {err}"))?;
        rest = &rest[digits..];

        let unit_length = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_length] {
            "ms" => Some(Duration::from_millis(amount)),
            "s" => Some(Duration::from_secs(amount)),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "h" => amount.checked_mul(60 * 60).map(Duration::from_secs),
            unit => return Err(format!("Unknown unit \"{unit}\" in duration \"{value}\"")),
        };
        total = unit
            .and_then(|unit| total.checked_add(unit))
            .ok_or_else(|| format!("Duration \"{value}\" is too large"))?;
        rest = &rest[unit_length..];
    }

    Ok(total)
}

/// Like [`parse_duration`], but rejects zero. Used for periods and timeouts.
pub fn parse_period(value: &str) -> Result<Duration, String> {
    match parse_duration(value)? {
        Duration::ZERO => Err(format!("Duration \"{value}\" must be greater than zero")),
        period => Ok(period),
    }
}
