use crate::models::AlertState;
use crate::service::alertmanager::Endpoint;
use autometrics::prometheus_exporter;
use axum::response::IntoResponse;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

pub async fn metrics_get() -> impl IntoResponse {
    prometheus_exporter::encode_http_response()
}

/// Collection metrics, shared by every poller.
#[derive(Clone)]
pub struct Metrics {
    collect_cycles: IntCounterVec,
    alerts: IntGaugeVec,
    errors: IntCounterVec,
}

impl Metrics {
    /// Creates the collectors and registers them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let collect_cycles = IntCounterVec::new(
            Opts::new(
                "amview_collect_cycles_total",
                "Number of successful collection cycles",
            ),
            &["alertmanager"],
        )?;
        registry.register(Box::new(collect_cycles.clone()))?;

        let alerts = IntGaugeVec::new(
            Opts::new(
                "amview_alerts",
                "Number of alerts per state in the last published collection",
            ),
            &["alertmanager", "state"],
        )?;
        registry.register(Box::new(alerts.clone()))?;

        let errors = IntCounterVec::new(
            Opts::new(
                "amview_alertmanager_errors_total",
                "Number of failed requests to an Alertmanager endpoint",
            ),
            &["alertmanager", "endpoint"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            collect_cycles,
            alerts,
            errors,
        })
    }

    pub fn record_publish(&self, alertmanager: &str, counts: &BTreeMap<AlertState, usize>) {
        self.collect_cycles.with_label_values(&[alertmanager]).inc();

        for state in AlertState::iter() {
            let count = counts.get(&state).copied().unwrap_or_default();
            self.alerts
                .with_label_values(&[alertmanager, state.as_str()])
                .set(count as i64);
        }
    }

    pub fn record_error(&self, alertmanager: &str, endpoint: Endpoint) {
        self.errors
            .with_label_values(&[alertmanager, endpoint.as_str()])
            .inc();
    }
}

#[cfg(test)]
impl Metrics {
    pub fn collect_cycles(&self, alertmanager: &str) -> u64 {
        self.collect_cycles.with_label_values(&[alertmanager]).get()
    }

    pub fn errors(&self, alertmanager: &str, endpoint: Endpoint) -> u64 {
        self.errors
            .with_label_values(&[alertmanager, endpoint.as_str()])
            .get()
    }

    pub fn alerts(&self, alertmanager: &str, state: AlertState) -> i64 {
        self.alerts
            .with_label_values(&[alertmanager, state.as_str()])
            .get()
    }
}
