use crate::fingerprint;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use strum_macros::{EnumIter, IntoStaticStr};
use time::OffsetDateTime;

pub type Labels = BTreeMap<String, String>;

/// Label name -> label value -> colors.
pub type LabelsColorMap = BTreeMap<String, BTreeMap<String, LabelColors>>;

/// Label name -> label value -> number of alerts carrying it.
pub type LabelsCountMap = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    EnumIter,
    Eq,
    Hash,
    IntoStaticStr,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertState {
    #[default]
    Unprocessed,
    Active,
    Suppressed,
}

impl AlertState {
    /// Parses the state string reported by an Alertmanager. Unknown states are
    /// treated as unprocessed.
    pub fn from_upstream(state: &str) -> Self {
        match state {
            "active" => Self::Active,
            "suppressed" => Self::Suppressed,
            _ => Self::Unprocessed,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub labels: Labels,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,

    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,

    pub state: AlertState,

    #[serde(default)]
    pub silenced_by: Vec<String>,

    #[serde(default)]
    pub inhibited_by: Vec<String>,

    #[serde(default)]
    pub receiver: String,

    /// Annotations whose values were absolute URLs, keyed by annotation name.
    #[serde(default)]
    pub links: BTreeMap<String, String>,

    /// Content hash of the alert as it was received.
    #[serde(default)]
    pub fingerprint: String,

    /// Hash of the labels only.
    #[serde(default)]
    pub id: String,

    /// Every Alertmanager that reported this alert, in discovery order.
    #[serde(default)]
    pub alertmanager: Vec<AlertmanagerInstance>,
}

impl Alert {
    pub fn is_silenced(&self) -> bool {
        self.state == AlertState::Suppressed && !self.silenced_by.is_empty()
    }
}

/// Provenance of an alert: the Alertmanager it came from and the silences on
/// that Alertmanager that matched it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AlertmanagerInstance {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub silences: BTreeMap<String, Silence>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Silence {
    pub id: String,

    pub matchers: Vec<Matcher>,

    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(default)]
    pub created_by: String,

    #[serde(default)]
    pub comment: String,

    #[serde(default, rename = "jiraID")]
    pub jira_id: Option<String>,

    #[serde(default, rename = "jiraURL")]
    pub jira_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertGroup {
    pub receiver: String,

    /// The grouping key.
    pub labels: Labels,

    pub alerts: Vec<Alert>,

    #[serde(default)]
    pub id: String,

    /// Checksum over the fingerprints of the contained alerts.
    #[serde(default)]
    pub hash: String,

    #[serde(default)]
    pub state_count: BTreeMap<AlertState, usize>,
}

impl AlertGroup {
    pub fn new(receiver: String, labels: Labels, alerts: Vec<Alert>) -> Self {
        Self {
            receiver,
            labels,
            alerts,
            id: String::new(),
            hash: String::new(),
            state_count: BTreeMap::new(),
        }
    }

    /// Sorts the alerts and recomputes `hash` and `state_count` from them.
    ///
    /// Must be called after every change to the alert list.
    pub fn finalize(&mut self) {
        self.alerts.sort_by(compare_alerts);

        self.hash = fingerprint::group_hash(self.alerts.iter().map(|alert| alert.fingerprint.as_str()));

        self.state_count.clear();
        for alert in &self.alerts {
            *self.state_count.entry(alert.state).or_default() += 1;
        }
    }
}

/// Newest first, ties broken by fingerprint. Total as long as fingerprints are
/// distinct.
pub fn compare_alerts(a: &Alert, b: &Alert) -> Ordering {
    b.starts_at
        .cmp(&a.starts_at)
        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: 255,
        }
    }

    /// Perceived brightness on a 0-255 scale (YIQ).
    pub fn brightness(&self) -> u32 {
        (self.red as u32 * 299 + self.green as u32 * 587 + self.blue as u32 * 114) / 1000
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LabelColors {
    pub font: Color,
    pub background: Color,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AutocompleteHint {
    /// Text presented to the user.
    pub value: String,

    /// Typeahead input that should match this hint.
    pub tokens: BTreeSet<String>,
}
