use super::AlertmanagerError;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// HTTP access to a single Alertmanager.
#[derive(Clone, Debug)]
pub struct Transport {
    client: Client,
    base_url: Url,
}

impl Transport {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, AlertmanagerError> {
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AlertmanagerError::Config(format!(
                    "Unsupported URI scheme \"{scheme}\" in {base_url}"
                )))
            }
        }

        if base_url.cannot_be_a_base() {
            return Err(AlertmanagerError::Config(format!(
                "Cannot use {base_url} as a base URI"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|err| {
                AlertmanagerError::Config(format!("Error building HTTP client: {err}"))
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends the path segments to the base URL, keeping any path prefix the
    /// base URL already has.
    pub fn endpoint(&self, segments: &[&str], query: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.set_query(query);
        url
    }

    #[instrument(err, skip(self), fields(base_url = %self.base_url))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: Option<&str>,
    ) -> Result<T, AlertmanagerError> {
        let url = self.endpoint(segments, query);

        let url_str = url.as_str();
        debug!(?url_str, "Querying Alertmanager");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertmanagerError::Transport(format!(
                "Unexpected HTTP status {status} from {url}"
            )));
        }

        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(|err| {
            AlertmanagerError::Decode(format!(
                "Could not deserialize response from {url}: {err}"
            ))
        })
    }
}
