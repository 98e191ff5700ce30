use super::{count_labels, merge, parse_filter, FilterStatus, MergedSnapshot, SnapshotHandlerError};
use crate::models::{AlertGroup, LabelsColorMap, LabelsCountMap, Silence};
use crate::service::alertmanager::UpstreamHealth;
use crate::service::{Service, AMVIEW_SLO};
use autometrics::autometrics;
use axum::extract::{Json, Query, RawQuery, State};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;
use tracing::instrument;

const AUTOCOMPLETE_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsResponse {
    pub status: &'static str,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    pub version: &'static str,

    pub upstreams: Vec<UpstreamHealth>,

    pub groups: Vec<AlertGroup>,

    pub silences: BTreeMap<String, Silence>,

    pub colors: LabelsColorMap,

    pub filters: Vec<FilterStatus>,

    pub counters: LabelsCountMap,
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteParams {
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LabelValuesParams {
    name: Option<String>,
}

#[autometrics(objective = AMVIEW_SLO)]
#[instrument(skip(service))]
pub async fn alerts_get(
    State(service): State<Service>,
    RawQuery(query): RawQuery,
) -> Json<AlertsResponse> {
    let filters: Vec<String> = query
        .as_deref()
        .map(|query| {
            form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key == "q")
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    let snapshot = merge(service.upstreams.upstreams());

    Json(build_alerts_response(snapshot, &filters))
}

/// Applies the filters to the merged snapshot and renders the response.
/// Groups without any alert passing the filters are left out.
pub fn build_alerts_response(snapshot: MergedSnapshot, filters: &[String]) -> AlertsResponse {
    let mut filters: Vec<_> = filters.iter().map(|text| parse_filter(text)).collect();

    let mut groups = Vec::new();
    for mut group in snapshot.groups {
        group.alerts.retain(|alert| {
            // Every filter has to see the alert so that hits are counted.
            filters
                .iter_mut()
                .fold(true, |passed, filter| filter.apply(alert) && passed)
        });

        if !group.alerts.is_empty() {
            group.finalize();
            groups.push(group);
        }
    }

    AlertsResponse {
        status: "success",
        timestamp: OffsetDateTime::now_utc(),
        version: clap::crate_version!(),
        upstreams: snapshot.upstreams,
        counters: count_labels(&groups),
        groups,
        silences: snapshot.silences,
        colors: snapshot.colors,
        filters: filters.iter().map(|filter| filter.status()).collect(),
    }
}

#[autometrics(objective = AMVIEW_SLO)]
#[instrument(err, skip(service))]
pub async fn autocomplete_get(
    State(service): State<Service>,
    Query(params): Query<AutocompleteParams>,
) -> Result<Json<Vec<String>>, SnapshotHandlerError> {
    let term = params
        .term
        .filter(|term| !term.trim().is_empty())
        .ok_or_else(|| SnapshotHandlerError::MissingParameter("term".to_owned()))?;

    let snapshot = merge(service.upstreams.upstreams());

    Ok(Json(autocomplete(&snapshot, &term)))
}

/// Hint values with a token starting with `term`, ignoring case.
pub fn autocomplete(snapshot: &MergedSnapshot, term: &str) -> Vec<String> {
    let term = term.trim().to_lowercase();

    // Hints are sorted by value already.
    snapshot
        .autocomplete
        .iter()
        .filter(|hint| {
            hint.tokens
                .iter()
                .any(|token| token.to_lowercase().starts_with(&term))
        })
        .map(|hint| hint.value.clone())
        .take(AUTOCOMPLETE_LIMIT)
        .collect()
}

#[autometrics(objective = AMVIEW_SLO)]
#[instrument(skip(service))]
pub async fn label_names_get(State(service): State<Service>) -> Json<Vec<String>> {
    let snapshot = merge(service.upstreams.upstreams());

    let names: BTreeSet<String> = snapshot
        .groups
        .iter()
        .flat_map(|group| &group.alerts)
        .flat_map(|alert| alert.labels.keys().cloned())
        .collect();

    Json(names.into_iter().collect())
}

#[autometrics(objective = AMVIEW_SLO)]
#[instrument(err, skip(service))]
pub async fn label_values_get(
    State(service): State<Service>,
    Query(params): Query<LabelValuesParams>,
) -> Result<Json<Vec<String>>, SnapshotHandlerError> {
    let name = params
        .name
        .ok_or_else(|| SnapshotHandlerError::MissingParameter("name".to_owned()))?;

    let snapshot = merge(service.upstreams.upstreams());

    let values: BTreeSet<String> = snapshot
        .groups
        .iter()
        .flat_map(|group| &group.alerts)
        .filter_map(|alert| alert.labels.get(&name).cloned())
        .collect();

    Ok(Json(values.into_iter().collect()))
}
