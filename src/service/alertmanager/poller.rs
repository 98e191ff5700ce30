use super::{
    AdapterRegistry, Alertmanager, AlertmanagerError, AlertmanagerSnapshot, Endpoint, PollerState,
};
use crate::fingerprint;
use crate::models::{AlertGroup, AlertmanagerInstance, AutocompleteHint, LabelsColorMap, Silence};
use crate::service::enrichment::{Enricher, HintsBuilder};
use crate::service::metrics::Metrics;
use autometrics::autometrics;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Shared dependencies of every poller.
pub struct PullContext {
    pub adapters: AdapterRegistry,
    pub enricher: Enricher,
    pub metrics: Metrics,
}

impl Alertmanager {
    /// Runs one collection cycle. On failure the previously published data is
    /// kept and the error is counted against the endpoint that failed.
    ///
    /// Cancellation aborts at the next I/O boundary and is not counted.
    #[autometrics]
    #[instrument(err, skip_all, fields(alertmanager = %self.name))]
    pub async fn pull(
        &self,
        context: &PullContext,
        cancel: &CancellationToken,
    ) -> Result<(), AlertmanagerError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AlertmanagerError::Cancelled),
            result = self.collect(context) => result,
        };

        if let Err(AlertmanagerError::Cancelled) = result {
            self.set_state(PollerState::Idle);
        }

        result
    }

    async fn collect(&self, context: &PullContext) -> Result<(), AlertmanagerError> {
        self.set_state(PollerState::Probing);
        let version = super::probe_version(&self.transport).await;
        self.health.lock().version = Some(version.clone());

        self.set_state(PollerState::PullingSilences);
        let silences = match context.adapters.select(&version) {
            Ok(adapter) => adapter.get_silences(&self.transport).await,
            Err(err) => Err(err),
        }
        .map_err(|err| self.fail(context, Endpoint::Silences, err))?;

        self.set_state(PollerState::PullingAlerts);
        let groups = match context.adapters.select(&version) {
            Ok(adapter) => adapter.get_alerts(&self.transport).await,
            Err(err) => Err(err),
        }
        .map_err(|err| self.fail(context, Endpoint::Alerts, err))?;

        self.set_state(PollerState::Publishing);
        let snapshot = build_snapshot(
            &self.name,
            self.uri.as_str(),
            groups,
            silences,
            &context.enricher,
        )
        .map_err(|err| self.fail(context, Endpoint::Alerts, err))?;

        let counts = snapshot.state_counts();
        let groups = snapshot.alerts.len();
        self.publish(snapshot);
        context.metrics.record_publish(&self.name, &counts);

        info!(alertmanager = %self.name, groups, ?counts, "Collection completed");
        self.set_state(PollerState::Idle);

        Ok(())
    }

    fn fail(
        &self,
        context: &PullContext,
        endpoint: Endpoint,
        err: AlertmanagerError,
    ) -> AlertmanagerError {
        self.set_state(PollerState::Error);
        error!(alertmanager = %self.name, endpoint = endpoint.as_str(), %err, "Collection failed");

        context.metrics.record_error(&self.name, endpoint);
        self.health.lock().error = Some(err.to_string());

        self.set_state(PollerState::Idle);
        err
    }
}

/// Turns the raw data of one Alertmanager into the data that gets published:
/// silences get JIRA detection, alerts get fingerprints, their silences,
/// links, stripped labels and ids, duplicates within a group are dropped, and
/// colors and autocomplete hints are collected along the way.
pub(crate) fn build_snapshot(
    name: &str,
    uri: &str,
    groups: Vec<AlertGroup>,
    silences: Vec<Silence>,
    enricher: &Enricher,
) -> Result<AlertmanagerSnapshot, AlertmanagerError> {
    let mut silences_by_id = BTreeMap::new();
    for mut silence in silences {
        enricher.detect_jira(&mut silence);
        silences_by_id.insert(silence.id.clone(), silence);
    }

    let mut colors = LabelsColorMap::new();
    let mut hints = HintsBuilder::new();

    // Blocks routed to the same receiver end up in the same group.
    let mut merged: Vec<AlertGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut seen: HashMap<String, HashSet<String>> = HashMap::new();

    for group in groups {
        let id = fingerprint::group_id(&group.receiver, &group.labels)?;
        let position = match positions.get(&id) {
            Some(position) => *position,
            None => {
                let mut canonical = AlertGroup::new(group.receiver.clone(), group.labels.clone(), Vec::new());
                canonical.id = id.clone();
                merged.push(canonical);
                positions.insert(id.clone(), merged.len() - 1);
                merged.len() - 1
            }
        };
        let fingerprints = seen.entry(id).or_default();

        for mut alert in group.alerts {
            alert.fingerprint = fingerprint::alert_fingerprint(&alert)?;
            if !fingerprints.insert(alert.fingerprint.clone()) {
                continue;
            }

            let instance = AlertmanagerInstance {
                name: name.to_owned(),
                uri: uri.to_owned(),
                silences: alert
                    .silenced_by
                    .iter()
                    .filter_map(|id| {
                        silences_by_id
                            .get(id)
                            .map(|silence| (id.clone(), silence.clone()))
                    })
                    .collect(),
            };

            enricher.extract_links(&mut alert);
            enricher.strip_labels(&mut alert);
            alert.id = fingerprint::alert_id(&alert.labels)?;

            enricher.collect_colors(&alert, &mut colors);
            hints.add_alert(&alert, &instance);

            alert.alertmanager = vec![instance];
            merged[position].alerts.push(alert);
        }
    }

    merged.retain(|group| !group.alerts.is_empty());
    for group in &mut merged {
        group.finalize();
    }

    let autocomplete: Vec<AutocompleteHint> = hints.build();

    Ok(AlertmanagerSnapshot {
        alerts: merged,
        silences: silences_by_id,
        colors,
        autocomplete,
    })
}
