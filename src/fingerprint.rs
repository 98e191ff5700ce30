//! Deterministic content hashes.
//!
//! Values are converted into canonical JSON (object keys sorted, no
//! whitespace) and digested with SHA-1. The result is lower-case hex.

use crate::models::{Alert, AlertState, Labels};
use serde::Serialize;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// The parts of an alert that make up its fingerprint. Everything added to an
/// alert after it was received (links, ids, provenance) is left out.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertContent<'a> {
    labels: &'a Labels,
    annotations: &'a BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    ends_at: OffsetDateTime,
    #[serde(rename = "generatorURL")]
    generator_url: &'a str,
    state: AlertState,
    silenced_by: &'a [String],
    inhibited_by: &'a [String],
}

pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    let bytes = serde_json::to_vec(&canonical)?;

    Ok(digest(&bytes))
}

pub fn alert_id(labels: &Labels) -> Result<String, serde_json::Error> {
    hash(labels)
}

pub fn alert_fingerprint(alert: &Alert) -> Result<String, serde_json::Error> {
    hash(&AlertContent {
        labels: &alert.labels,
        annotations: &alert.annotations,
        starts_at: alert.starts_at,
        ends_at: alert.ends_at,
        generator_url: &alert.generator_url,
        state: alert.state,
        silenced_by: &alert.silenced_by,
        inhibited_by: &alert.inhibited_by,
    })
}

pub fn group_id(receiver: &str, labels: &Labels) -> Result<String, serde_json::Error> {
    hash(&(receiver, labels))
}

/// Hash over the concatenation of the given fingerprints, in iteration order.
pub fn group_hash<'a>(fingerprints: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha1::new();
    for fingerprint in fingerprints {
        hasher.update(fingerprint.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

/// Rebuilds every object with its keys inserted in sorted order, so the output
/// does not depend on how `serde_json::Map` orders its entries.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        value => value,
    }
}
