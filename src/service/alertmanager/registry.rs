use super::{Alertmanager, AlertmanagerError, AlertmanagerServiceConfig};
use std::sync::Arc;
use tracing::info;

/// The configured Alertmanagers. Filled at startup and read-only afterwards.
#[derive(Default)]
pub struct UpstreamRegistry {
    upstreams: Vec<Arc<Alertmanager>>,
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AlertmanagerServiceConfig) -> Result<Self, AlertmanagerError> {
        if config.alertmanager_uris.is_empty() {
            return Err(AlertmanagerError::Config(
                "At least one Alertmanager is required".to_owned(),
            ));
        }

        let mut registry = Self::new();
        for upstream in &config.alertmanager_uris {
            registry.register(Alertmanager::new(
                upstream.name.clone(),
                upstream.uri.clone(),
                config.alertmanager_timeout,
            )?)?;
        }

        Ok(registry)
    }

    /// Adds an Alertmanager. Names and URIs must be unique.
    pub fn register(&mut self, alertmanager: Alertmanager) -> Result<(), AlertmanagerError> {
        for existing in &self.upstreams {
            if existing.name() == alertmanager.name() {
                return Err(AlertmanagerError::Config(format!(
                    "Duplicate Alertmanager name \"{}\"",
                    alertmanager.name()
                )));
            }
            if existing.uri() == alertmanager.uri() {
                return Err(AlertmanagerError::Config(format!(
                    "Alertmanager URI {} is used by both \"{}\" and \"{}\"",
                    alertmanager.uri(),
                    existing.name(),
                    alertmanager.name()
                )));
            }
        }

        info!(
            name = alertmanager.name(),
            uri = %alertmanager.uri(),
            timeout = ?alertmanager.timeout(),
            "Registered Alertmanager"
        );
        self.upstreams.push(Arc::new(alertmanager));

        Ok(())
    }

    /// All Alertmanagers in registration order.
    pub fn upstreams(&self) -> &[Arc<Alertmanager>] {
        &self.upstreams
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Alertmanager>> {
        self.upstreams
            .iter()
            .find(|upstream| upstream.name() == name)
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}
