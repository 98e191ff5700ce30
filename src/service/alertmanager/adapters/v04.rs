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

/// Alertmanager 0.4.x: integer silence ids, `inhibited` flag and a single
/// `silenced` id per alert, paginated silences.
pub struct V04Adapter {
    range: VersionReq,
}

impl V04Adapter {
    pub fn new() -> Self {
        Self {
            range: version_range((0, 4, 0), Some((0, 5, 0))),
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
    inhibited: bool,

    /// Id of the silence muting this alert, 0 if none.
    #[serde(default)]
    silenced: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSilencePage {
    #[serde(default)]
    silences: Vec<WireSilence>,

    #[serde(default)]
    total_silences: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSilence {
    id: u64,

    #[serde(default)]
    matchers: Vec<WireMatcher>,

    #[serde(with = "time::serde::rfc3339")]
    starts_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    ends_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    #[serde(default)]
    created_by: String,

    #[serde(default)]
    comment: String,
}

fn convert_alert(alert: WireAlert, receiver: &str) -> Alert {
    let mut state = AlertState::Active;
    let mut silenced_by = Vec::new();

    if alert.silenced > 0 {
        state = AlertState::Suppressed;
        silenced_by.push(alert.silenced.to_string());
    }
    if alert.inhibited {
        state = AlertState::Suppressed;
    }

    Alert {
        labels: alert.labels,
        annotations: alert.annotations,
        starts_at: alert.starts_at,
        ends_at: alert.ends_at,
        generator_url: alert.generator_url,
        state,
        silenced_by,
        inhibited_by: Vec::new(),
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
            id: silence.id.to_string(),
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
impl SchemaAdapter for V04Adapter {
    fn name(&self) -> &'static str {
        "v0.4"
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
        // The silences endpoint is paginated, ask for everything at once.
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("limit", &u32::MAX.to_string())
            .finish();

        let response: ApiResponse<WireSilencePage> = transport
            .get_json(&["api", "v1", "silences"], Some(&query))
            .await?;
        let page = response.into_data()?;

        if page.total_silences as usize > page.silences.len() {
            tracing::warn!(
                total = page.total_silences,
                received = page.silences.len(),
                "Alertmanager returned a partial silence list"
            );
        }

        Ok(page.silences.into_iter().map(Into::into).collect())
    }
}
