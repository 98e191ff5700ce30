//! Schema adapters for the Alertmanager API generations we can read from.
//!
//! Every adapter claims a range of Alertmanager versions and translates that
//! generation's wire format into the canonical models.

mod v04;
mod v05;

use super::{AlertmanagerError, Transport};
use crate::models::{AlertGroup, Labels, Matcher, Silence};
use async_trait::async_trait;
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use serde::Deserialize;
use tracing::debug;

pub use v04::V04Adapter;
pub use v05::V05Adapter;

#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The range of Alertmanager versions this adapter handles.
    fn version_range(&self) -> &VersionReq;

    fn supports(&self, version: &str) -> bool {
        match parse_version(version) {
            Some(version) => self.version_range().matches(&version),
            None => false,
        }
    }

    /// Fetches `/api/v1/alerts/groups` and produces canonical groups, one per
    /// routing block. Fingerprints and ids are not computed here.
    async fn get_alerts(&self, transport: &Transport) -> Result<Vec<AlertGroup>, AlertmanagerError>;

    /// Fetches `/api/v1/silences` and produces canonical silences.
    async fn get_silences(&self, transport: &Transport) -> Result<Vec<Silence>, AlertmanagerError>;
}

/// Adapters in registration order. Selection picks the first adapter whose
/// range contains the version.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SchemaAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    pub fn register(&mut self, adapter: impl SchemaAdapter + 'static) {
        self.adapters.push(Box::new(adapter));
    }

    pub fn select(&self, version: &str) -> Result<&dyn SchemaAdapter, AlertmanagerError> {
        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.supports(version))
            .ok_or_else(|| AlertmanagerError::UnsupportedVersion(version.to_owned()))?;

        debug!(version, adapter = adapter.name(), "Selected schema adapter");

        Ok(adapter.as_ref())
    }
}

impl Default for AdapterRegistry {
    /// Registry with every built-in adapter.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(V04Adapter::new());
        registry.register(V05Adapter::new());
        registry
    }
}

/// Parses an Alertmanager version string. A leading "v" is accepted, and
/// pre-release and build metadata are dropped so that release candidates are
/// handled by the adapter of their release.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = Version::parse(version.trim().trim_start_matches('v')).ok()?;
    Some(Version::new(version.major, version.minor, version.patch))
}

/// `>=lower` and, when given, `<upper`.
pub(crate) fn version_range(lower: (u64, u64, u64), upper: Option<(u64, u64, u64)>) -> VersionReq {
    let comparator = |op, (major, minor, patch): (u64, u64, u64)| Comparator {
        op,
        major,
        minor: Some(minor),
        patch: Some(patch),
        pre: Prerelease::EMPTY,
    };

    let mut comparators = vec![comparator(Op::GreaterEq, lower)];
    if let Some(upper) = upper {
        comparators.push(comparator(Op::Less, upper));
    }

    VersionReq { comparators }
}

/// Response envelope shared by every `/api/v1` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    status: String,

    #[serde(default = "Option::default")]
    data: Option<T>,

    #[serde(default)]
    error: Option<String>,
}

impl<T: Default> ApiResponse<T> {
    pub fn into_data(self) -> Result<T, AlertmanagerError> {
        if self.status != "success" {
            return Err(AlertmanagerError::Upstream(self.error.unwrap_or_else(|| {
                format!("Unexpected response status \"{}\"", self.status)
            })));
        }

        Ok(self.data.unwrap_or_default())
    }
}

/// An entry of `/api/v1/alerts/groups`, generic over the alert schema.
#[derive(Debug, Deserialize)]
pub(crate) struct WireGroup<A> {
    #[serde(default)]
    labels: Labels,

    #[serde(default = "Vec::new")]
    blocks: Vec<WireBlock<A>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireBlock<A> {
    #[serde(default = "Vec::new")]
    alerts: Vec<A>,

    #[serde(default, rename = "routeOpts")]
    route_opts: WireRouteOpts,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireRouteOpts {
    #[serde(default)]
    receiver: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMatcher {
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    is_regex: bool,
}

impl From<WireMatcher> for Matcher {
    fn from(matcher: WireMatcher) -> Self {
        Self {
            name: matcher.name,
            value: matcher.value,
            is_regex: matcher.is_regex,
        }
    }
}

/// Flattens upstream groups into canonical groups, one per routing block, so
/// that every canonical group has a single receiver.
pub(crate) fn flatten_groups<A>(
    groups: Vec<WireGroup<A>>,
    convert: impl Fn(A, &str) -> crate::models::Alert,
) -> Vec<AlertGroup> {
    let mut canonical = Vec::new();
    for group in groups {
        for block in group.blocks {
            let receiver = block.route_opts.receiver;
            let alerts = block
                .alerts
                .into_iter()
                .map(|alert| convert(alert, &receiver))
                .collect();
            canonical.push(AlertGroup::new(receiver, group.labels.clone(), alerts));
        }
    }
    canonical
}
