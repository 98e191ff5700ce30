mod autocomplete;
mod colors;
mod jira;

use crate::models::{Alert, LabelColors, LabelsColorMap, Silence};
use std::collections::HashSet;
use tracing::trace;
use url::Url;

pub use autocomplete::HintsBuilder;
pub use colors::{generate_colors, STATIC_COLORS};
pub use jira::{parse_jira_rule, JiraRule};

/// Synthetic label name under which receiver colors are stored.
pub const RECEIVER_LABEL: &str = "@receiver";

#[derive(clap::Args, Clone, Debug, Default)]
pub struct EnrichmentConfig {
    /// Label names that get a generated color for every distinct value.
    #[clap(
        long,
        env = "COLOR_LABELS_UNIQUE",
        value_delimiter = ' ',
        help_heading = "Enrichment"
    )]
    pub color_labels_unique: Vec<String>,

    /// Label names whose values are all shown with the same fixed color.
    #[clap(
        long,
        env = "COLOR_LABELS_STATIC",
        value_delimiter = ' ',
        help_heading = "Enrichment"
    )]
    pub color_labels_static: Vec<String>,

    /// Label names removed from alerts before they are shown.
    #[clap(
        long,
        env = "STRIP_LABELS",
        value_delimiter = ' ',
        help_heading = "Enrichment"
    )]
    pub strip_labels: Vec<String>,

    /// JIRA detection rules in `regex@url` form. The URL may contain `{id}`,
    /// otherwise it is used as the JIRA base URL.
    #[clap(
        long,
        env = "JIRA_REGEX",
        value_delimiter = ' ',
        value_parser = parse_jira_rule,
        help_heading = "Enrichment"
    )]
    pub jira_regex: Vec<JiraRule>,
}

/// Applies the configured enrichment to alerts and silences.
#[derive(Debug, Default)]
pub struct Enricher {
    color_labels_unique: HashSet<String>,
    color_labels_static: HashSet<String>,
    strip_labels: HashSet<String>,
    jira_rules: Vec<JiraRule>,
}

impl Enricher {
    pub fn new(config: &EnrichmentConfig) -> Self {
        Self {
            color_labels_unique: label_names(&config.color_labels_unique),
            color_labels_static: label_names(&config.color_labels_static),
            strip_labels: label_names(&config.strip_labels),
            jira_rules: config.jira_regex.clone(),
        }
    }

    /// Moves annotations whose value is an absolute http(s) URL into `links`.
    pub fn extract_links(&self, alert: &mut Alert) {
        let link_names: Vec<String> = alert
            .annotations
            .iter()
            .filter(|(_, value)| is_link(value))
            .map(|(name, _)| name.clone())
            .collect();

        for name in link_names {
            if let Some(value) = alert.annotations.remove(&name) {
                trace!(%name, %value, "Extracted link from annotation");
                alert.links.insert(name, value);
            }
        }
    }

    pub fn strip_labels(&self, alert: &mut Alert) {
        if self.strip_labels.is_empty() {
            return;
        }
        alert
            .labels
            .retain(|name, _| !self.strip_labels.contains(name));
    }

    /// Sets `jira_id` and `jira_url` from the first rule matching the comment.
    pub fn detect_jira(&self, silence: &mut Silence) {
        for rule in &self.jira_rules {
            if let Some(id) = rule.find(&silence.comment) {
                silence.jira_url = Some(rule.url_for(&id));
                silence.jira_id = Some(id);
                return;
            }
        }
    }

    /// Color for a label value, if the label is colored at all. Static colors
    /// win over generated ones.
    pub fn label_colors(&self, name: &str, value: &str) -> Option<LabelColors> {
        if self.color_labels_static.contains(name) {
            Some(STATIC_COLORS)
        } else if name == RECEIVER_LABEL || self.color_labels_unique.contains(name) {
            Some(generate_colors(name, value))
        } else {
            None
        }
    }

    /// Adds colors for the alert's receiver and colored labels to `colors`,
    /// keeping colors that are already present.
    pub fn collect_colors(&self, alert: &Alert, colors: &mut LabelsColorMap) {
        let pairs = std::iter::once((RECEIVER_LABEL, alert.receiver.as_str())).chain(
            alert
                .labels
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        );

        for (name, value) in pairs {
            if let Some(label_colors) = self.label_colors(name, value) {
                colors
                    .entry(name.to_owned())
                    .or_default()
                    .entry(value.to_owned())
                    .or_insert(label_colors);
            }
        }
    }
}

fn label_names(names: &[String]) -> HashSet<String> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn is_link(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}
