mod adapters;
mod errors;
mod poller;
mod registry;
mod transport;
mod version;

use crate::models::{
    AlertGroup, AlertState, AutocompleteHint, LabelsColorMap, Silence,
};
use crate::service::parse_period;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_with::SerializeDisplay;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, IntoStaticStr};
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

pub use adapters::{parse_version, AdapterRegistry, SchemaAdapter, V04Adapter, V05Adapter};
pub use errors::AlertmanagerError;
pub use poller::PullContext;
pub use registry::UpstreamRegistry;
pub use transport::Transport;
pub use version::{probe_version, LATEST_VERSION};

#[cfg(test)]
pub(crate) use poller::build_snapshot;

#[derive(clap::Args, Clone, Debug)]
pub struct AlertmanagerServiceConfig {
    /// Alertmanagers to collect from, as comma separated `name:uri` pairs.
    #[clap(
        long,
        env = "ALERTMANAGER_URIS",
        required = true,
        value_delimiter = ',',
        value_parser = parse_upstream_uri,
        help_heading = "Alertmanager options"
    )]
    pub alertmanager_uris: Vec<UpstreamUri>,

    /// Timeout for every request sent to an Alertmanager.
    #[clap(
        long,
        env = "ALERTMANAGER_TIMEOUT",
        default_value = "40s",
        value_parser = parse_period,
        help_heading = "Alertmanager options"
    )]
    pub alertmanager_timeout: Duration,
}

#[cfg(test)]
impl AlertmanagerServiceConfig {
    pub fn new_test_config(uris: &[(&str, &Url)]) -> Self {
        Self {
            alertmanager_uris: uris
                .iter()
                .map(|(name, uri)| UpstreamUri {
                    name: (*name).to_owned(),
                    uri: (*uri).clone(),
                })
                .collect(),
            alertmanager_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpstreamUri {
    pub name: String,
    pub uri: Url,
}

pub fn parse_upstream_uri(value: &str) -> Result<UpstreamUri, String> {
    let (name, uri) = value
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("Expected name:uri, got \"{value}\""))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Missing Alertmanager name in \"{value}\""));
    }

    let uri = Url::parse(uri.trim()).map_err(|err| format!("Invalid URI in \"{value}\": {err}"))?;

    Ok(UpstreamUri {
        name: name.to_owned(),
        uri,
    })
}

/// Where a poller is in its collection cycle.
#[derive(Clone, Copy, Debug, Default, Display, Eq, IntoStaticStr, PartialEq, SerializeDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum PollerState {
    #[default]
    Idle,
    Probing,
    PullingSilences,
    PullingAlerts,
    Publishing,
    Error,
}

/// Which Alertmanager endpoint a failure is attributed to.
#[derive(Clone, Copy, Debug, Display, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum Endpoint {
    Alerts,
    Silences,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Everything published by one successful collection cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertmanagerSnapshot {
    pub alerts: Vec<AlertGroup>,
    pub silences: BTreeMap<String, Silence>,
    pub colors: LabelsColorMap,
    pub autocomplete: Vec<AutocompleteHint>,
}

impl AlertmanagerSnapshot {
    pub fn state_counts(&self) -> BTreeMap<AlertState, usize> {
        let mut counts = BTreeMap::new();
        for group in &self.alerts {
            for (state, count) in &group.state_count {
                *counts.entry(*state).or_default() += count;
            }
        }
        counts
    }
}

/// Health of an Alertmanager as shown next to the merged data, so stale
/// sources can be flagged.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamHealth {
    pub name: String,
    pub uri: String,
    pub state: PollerState,
    pub version: Option<String>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
}

/// A single Alertmanager and the data of its last successful collection.
pub struct Alertmanager {
    name: String,
    uri: Url,
    timeout: Duration,
    transport: Transport,
    snapshot: RwLock<Arc<AlertmanagerSnapshot>>,
    health: Mutex<UpstreamHealth>,
}

impl Alertmanager {
    pub fn new(name: impl Into<String>, uri: Url, timeout: Duration) -> Result<Self, AlertmanagerError> {
        let name = name.into();
        let transport = Transport::new(uri.clone(), timeout)?;
        let health = UpstreamHealth {
            name: name.clone(),
            uri: uri.to_string(),
            state: PollerState::Idle,
            version: None,
            error: None,
            last_success: None,
        };

        Ok(Self {
            name,
            uri,
            timeout,
            transport,
            snapshot: RwLock::new(Arc::new(AlertmanagerSnapshot::default())),
            health: Mutex::new(health),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The last published data. The lock is only held to clone the pointer.
    pub fn snapshot(&self) -> Arc<AlertmanagerSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn alerts(&self) -> Vec<AlertGroup> {
        self.snapshot().alerts.clone()
    }

    pub fn silences(&self) -> BTreeMap<String, Silence> {
        self.snapshot().silences.clone()
    }

    pub fn colors(&self) -> LabelsColorMap {
        self.snapshot().colors.clone()
    }

    pub fn autocomplete(&self) -> Vec<AutocompleteHint> {
        self.snapshot().autocomplete.clone()
    }

    pub fn health(&self) -> UpstreamHealth {
        self.health.lock().clone()
    }

    pub fn state(&self) -> PollerState {
        self.health.lock().state
    }

    fn set_state(&self, state: PollerState) {
        debug!(alertmanager = %self.name, %state, "Poller state changed");
        self.health.lock().state = state;
    }

    /// Replaces all published data at once.
    pub(crate) fn publish(&self, snapshot: AlertmanagerSnapshot) {
        let snapshot = Arc::new(snapshot);
        // The lock only covers the pointer swap, the previous snapshot is
        // released after it.
        let previous = std::mem::replace(&mut *self.snapshot.write(), snapshot);
        drop(previous);

        let mut health = self.health.lock();
        health.error = None;
        health.last_success = Some(OffsetDateTime::now_utc());
    }
}
