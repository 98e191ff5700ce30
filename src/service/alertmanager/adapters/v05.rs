use super::{
    flatten_groups, version_range, ApiResponse, SchemaAdapter, WireGroup, WireMatcher,
};
use crate::models::{Alert, AlertGroup, AlertState, Labels, Silence};
use crate::service::alertmanager::{AlertmanagerError, Transport};
use async_trait::async_trait;
use semver::VersionReq;
use serde::Deserialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Alertmanager 0.5 and newer: string silence ids, explicit alert status with
/// `silencedBy`/`inhibitedBy` arrays.
pub struct V05Adapter {
    range: VersionReq,
}

impl V05Adapter {
    pub fn new() -> Self {
        Self {
            range: version_range((0, 5, 0), None),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAlert {
    #[serde(default)]
    labels: Labels,

    #[serde(default)]
    annotations: BTreeMap<String, String>,

    #[serde(with = "time::serde::rfc3339")]
    starts_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    ends_at: OffsetDateTime,

    #[serde(default, rename = "generatorURL")]
    generator_url: String,

    #[serde(default)]
    status: Option<WireStatus>,

    #[serde(default)]
    silenced_by: Option<Vec<String>>,

    #[serde(default)]
    inhibited_by: Option<Vec<String>>,
}

/// Some releases report the state as a bare string next to top level
/// `silencedBy`/`inhibitedBy` arrays, others nest everything in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireStatus {
    State(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        state: String,
        #[serde(default)]
        silenced_by: Option<Vec<String>>,
        #[serde(default)]
        inhibited_by: Option<Vec<String>>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSilence {
    id: String,

    #[serde(default)]
    matchers: Vec<WireMatcher>,

    #[serde(with = "time::serde::rfc3339")]
    starts_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    ends_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339", alias = "updatedAt")]
    created_at: OffsetDateTime,

    #[serde(default)]
    created_by: String,

    #[serde(default)]
    comment: String,
}

fn convert_alert(alert: WireAlert, receiver: &str) -> Alert {
    let (state, nested_silenced_by, nested_inhibited_by) = match alert.status {
        Some(WireStatus::State(state)) => (AlertState::from_upstream(&state), None, None),
        Some(WireStatus::Detailed {
            state,
            silenced_by,
            inhibited_by,
        }) => (AlertState::from_upstream(&state), silenced_by, inhibited_by),
        None => (AlertState::Unprocessed, None, None),
    };

    Alert {
        labels: alert.labels,
        annotations: alert.annotations,
        starts_at: alert.starts_at,
        ends_at: alert.ends_at,
        generator_url: alert.generator_url,
        state,
        silenced_by: nested_silenced_by
            .or(alert.silenced_by)
            .unwrap_or_default(),
        inhibited_by: nested_inhibited_by
            .or(alert.inhibited_by)
            .unwrap_or_default(),
        receiver: receiver.to_owned(),
        links: BTreeMap::new(),
        fingerprint: String::new(),
        id: String::new(),
        alertmanager: Vec::new(),
    }
}

impl From<WireSilence> for Silence {
    fn from(silence: WireSilence) -> Self {
        Self {
            id: silence.id,
            matchers: silence.matchers.into_iter().map(Into::into).collect(),
            starts_at: silence.starts_at,
            ends_at: silence.ends_at,
            created_at: silence.created_at,
            created_by: silence.created_by,
            comment: silence.comment,
            jira_id: None,
            jira_url: None,
        }
    }
}

#[async_trait]
impl SchemaAdapter for V05Adapter {
    fn name(&self) -> &'static str {
        "v0.5"
    }

    fn version_range(&self) -> &VersionReq {
        &self.range
    }

    async fn get_alerts(&self, transport: &Transport) -> Result<Vec<AlertGroup>, AlertmanagerError> {
        let response: ApiResponse<Vec<WireGroup<WireAlert>>> = transport
            .get_json(&["api", "v1", "alerts", "groups"], None)
            .await?;

        Ok(flatten_groups(response.into_data()?, convert_alert))
    }

    async fn get_silences(&self, transport: &Transport) -> Result<Vec<Silence>, AlertmanagerError> {
        let response: ApiResponse<Vec<WireSilence>> = transport
            .get_json(&["api", "v1", "silences"], None)
            .await?;

        Ok(response.into_data()?.into_iter().map(Into::into).collect())
    }
}
