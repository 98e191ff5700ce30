mod errors;
mod filters;
#[cfg(test)]
mod tests;

pub mod handlers;

use crate::models::{
    Alert, AlertGroup, AlertmanagerInstance, AutocompleteHint, LabelsColorMap, LabelsCountMap,
    Silence,
};
use crate::service::alertmanager::{Alertmanager, AlertmanagerSnapshot, UpstreamHealth};
use crate::service::enrichment::HintsBuilder;
use autometrics::autometrics;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{instrument, trace};

pub use errors::SnapshotHandlerError;
pub use filters::{parse_filter, Filter, FilterStatus};

/// The data of all Alertmanagers, deduplicated.
#[derive(Clone, Debug, Default)]
pub struct MergedSnapshot {
    pub groups: Vec<AlertGroup>,
    pub silences: BTreeMap<String, Silence>,
    pub colors: LabelsColorMap,
    pub autocomplete: Vec<AutocompleteHint>,
    pub upstreams: Vec<UpstreamHealth>,
}

struct GroupBucket {
    group: AlertGroup,
    /// Alert id -> index in `group.alerts`.
    positions: HashMap<String, usize>,
}

impl GroupBucket {
    fn new(group: &AlertGroup) -> Self {
        let mut merged = AlertGroup::new(group.receiver.clone(), group.labels.clone(), Vec::new());
        merged.id = group.id.clone();

        Self {
            group: merged,
            positions: HashMap::new(),
        }
    }

    fn add(&mut self, alert: &Alert) {
        match self.positions.get(&alert.id) {
            Some(position) => {
                let existing = &mut self.group.alerts[*position];
                for instance in &alert.alertmanager {
                    merge_instance(&mut existing.alertmanager, instance);
                }
            }
            None => {
                self.positions
                    .insert(alert.id.clone(), self.group.alerts.len());
                self.group.alerts.push(alert.clone());
            }
        }
    }
}

/// Appends the provenance entry, or folds its silences into the entry for the
/// same Alertmanager if there already is one.
fn merge_instance(instances: &mut Vec<AlertmanagerInstance>, instance: &AlertmanagerInstance) {
    match instances
        .iter_mut()
        .find(|existing| existing.name == instance.name)
    {
        Some(existing) => {
            for (id, silence) in &instance.silences {
                existing
                    .silences
                    .entry(id.clone())
                    .or_insert_with(|| silence.clone());
            }
        }
        None => instances.push(instance.clone()),
    }
}

/// Merges the published data of every Alertmanager.
///
/// Groups are merged by id and alerts within them by label hash; the first
/// occurrence of an alert wins and later ones only contribute provenance.
/// Colors and silences are taken from the first Alertmanager that has them,
/// autocomplete hints are unioned.
///
/// Silence ids are only unique per Alertmanager. Older Alertmanagers number
/// their silences with a local counter, so silence `7` of a later upstream is
/// hidden behind silence `7` of an earlier one in the top-level map. The
/// silences listed in each alert's provenance are always those of the
/// Alertmanager that reported it.
#[autometrics]
#[instrument(skip_all, fields(upstreams = upstreams.len()))]
pub fn merge(upstreams: &[Arc<Alertmanager>]) -> MergedSnapshot {
    // Each read lock is only held while cloning the pointer.
    let snapshots: Vec<Arc<AlertmanagerSnapshot>> =
        upstreams.iter().map(|upstream| upstream.snapshot()).collect();

    let mut buckets: Vec<GroupBucket> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut silences = BTreeMap::new();
    let mut colors = LabelsColorMap::new();
    let mut hints = HintsBuilder::new();

    for snapshot in &snapshots {
        for group in &snapshot.alerts {
            let position = match positions.get(&group.id) {
                Some(position) => *position,
                None => {
                    buckets.push(GroupBucket::new(group));
                    positions.insert(group.id.clone(), buckets.len() - 1);
                    buckets.len() - 1
                }
            };

            for alert in &group.alerts {
                buckets[position].add(alert);
            }
        }

        for (id, silence) in &snapshot.silences {
            silences
                .entry(id.clone())
                .or_insert_with(|| silence.clone());
        }

        for (name, values) in &snapshot.colors {
            let merged = colors.entry(name.clone()).or_default();
            for (value, label_colors) in values {
                merged.entry(value.clone()).or_insert(*label_colors);
            }
        }

        hints.extend(&snapshot.autocomplete);
    }

    let groups: Vec<AlertGroup> = buckets
        .into_iter()
        .map(|bucket| {
            let mut group = bucket.group;
            group.finalize();
            group
        })
        .collect();

    trace!(groups = groups.len(), "Merged Alertmanager snapshots");

    MergedSnapshot {
        groups,
        silences,
        colors,
        autocomplete: hints.build(),
        upstreams: upstreams.iter().map(|upstream| upstream.health()).collect(),
    }
}

/// Counts label values over the given groups.
pub fn count_labels(groups: &[AlertGroup]) -> LabelsCountMap {
    let mut counters = LabelsCountMap::new();
    for alert in groups.iter().flat_map(|group| &group.alerts) {
        for (name, value) in &alert.labels {
            *counters
                .entry(name.clone())
                .or_default()
                .entry(value.clone())
                .or_default() += 1;
        }
    }
    counters
}
