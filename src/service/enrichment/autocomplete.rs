use crate::models::{Alert, AlertmanagerInstance, AutocompleteHint};
use std::collections::{BTreeMap, BTreeSet};

/// Accumulates autocomplete hints, merging tokens of hints with equal values.
#[derive(Debug, Default)]
pub struct HintsBuilder {
    hints: BTreeMap<String, BTreeSet<String>>,
}

impl HintsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I, S>(&mut self, value: impl Into<String>, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let value = value.into();
        let entry = self.hints.entry(value.clone()).or_default();
        entry.insert(value);
        entry.extend(tokens.into_iter().map(Into::into));
    }

    pub fn extend(&mut self, hints: &[AutocompleteHint]) {
        for hint in hints {
            self.add(hint.value.clone(), hint.tokens.iter().cloned());
        }
    }

    /// Adds `name=value` and `name!=value` hints.
    pub fn add_pair(&mut self, name: &str, value: &str) {
        for operator in ["=", "!="] {
            self.add(format!("{name}{operator}{value}"), [name, value]);
        }
    }

    /// Adds hints for everything an alert can be filtered on.
    pub fn add_alert(&mut self, alert: &Alert, alertmanager: &AlertmanagerInstance) {
        for (name, value) in &alert.labels {
            self.add_pair(name, value);
        }

        self.add_pair("@receiver", &alert.receiver);
        self.add(
            format!("@state={}", alert.state.as_str()),
            ["@state", alert.state.as_str()],
        );
        self.add(
            format!("@alertmanager={}", alertmanager.name),
            ["@alertmanager", alertmanager.name.as_str()],
        );

        for silence in alertmanager.silences.values() {
            if !silence.created_by.is_empty() {
                self.add_pair("@silence_author", &silence.created_by);
            }
            if let Some(jira_id) = &silence.jira_id {
                self.add_pair("@silence_jira", jira_id);
            }
        }
    }

    /// Hints sorted by value.
    pub fn build(self) -> Vec<AutocompleteHint> {
        self.hints
            .into_iter()
            .map(|(value, tokens)| AutocompleteHint { value, tokens })
            .collect()
    }
}
