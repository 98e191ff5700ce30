use super::adapters::ApiResponse;
use super::Transport;
use serde::Deserialize;
use tracing::{info, instrument, warn};

/// Version assumed when an Alertmanager does not tell us which one it is. It is
/// contained in the range of the newest adapter.
pub const LATEST_VERSION: &str = "999.0.0";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    #[serde(default)]
    version_info: Option<VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(default)]
    version: Option<String>,
}

/// Asks the Alertmanager for its version. Never fails: anything unexpected
/// makes us assume the newest API.
#[instrument(skip(transport), fields(base_url = %transport.base_url()))]
pub async fn probe_version(transport: &Transport) -> String {
    let result = transport
        .get_json::<ApiResponse<StatusData>>(&["api", "v1", "status"], None)
        .await
        .and_then(ApiResponse::into_data);

    match result {
        Ok(StatusData {
            version_info:
                Some(VersionInfo {
                    version: Some(version),
                }),
        }) if !version.trim().is_empty() => {
            info!(%version, "Detected Alertmanager version");
            version
        }
        Ok(_) => {
            warn!(
                version = LATEST_VERSION,
                "Alertmanager status has no version, assuming latest"
            );
            LATEST_VERSION.to_owned()
        }
        Err(err) => {
            warn!(
                %err,
                version = LATEST_VERSION,
                "Cannot probe Alertmanager version, assuming latest"
            );
            LATEST_VERSION.to_owned()
        }
    }
}
