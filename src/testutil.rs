use crate::models::{Alert, AlertState, Silence};
use crate::service::alertmanager::PullContext;
use crate::service::enrichment::{EnrichmentConfig, Enricher};
use crate::service::Metrics;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures::{Future, FutureExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use url::Url;

#[macro_export]
macro_rules! assert_matches {
    ($expression:expr, $pattern:pat $( if $guard: expr )? $(,)?) => {
        match $expression {
            $pattern $( if $guard )? => (),
            o => ::core::panic!("match did not pass; got: {:?}", o)
        }
    }
}

pub async fn run_test<S, T, X, Y, Z>(
    setup: impl FnOnce() -> X,
    cleanup: impl FnOnce(T) -> Y,
    test: impl FnOnce(S) -> Z,
) where
    X: Future<Output = (S, T)>,
    Y: Future<Output = ()>,
    Z: Future<Output = ()>,
{
    // Setup
    let (test_ctx, teardown_ctx) = setup().await;

    // Test
    let fut = AssertUnwindSafe(test(test_ctx));
    let result = fut.catch_unwind().await;

    // Teardown
    cleanup(teardown_ctx).await;
    assert!(result.is_ok())
}

/// What the mock Alertmanager answers on a path.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Json(Value),
    Status(StatusCode),
    Delayed(Duration, Value),
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    requests: Vec<String>,
}

/// An HTTP server on an ephemeral port that answers like an Alertmanager.
/// Paths without a configured response get a 404.
#[derive(Clone)]
pub struct MockUpstream {
    url: Url,
    state: Arc<Mutex<MockState>>,
}

impl MockUpstream {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn respond(&self, path: &str, response: MockResponse) {
        self.state
            .lock()
            .responses
            .insert(path.to_owned(), response);
    }

    pub fn respond_json(&self, path: &str, body: Value) {
        self.respond(path, MockResponse::Json(body));
    }

    /// Every request received so far, as path and query.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }
}

pub struct MockCleanup {
    server: JoinHandle<()>,
}

async fn mock_handler(
    State(state): State<Arc<Mutex<MockState>>>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let response = {
        let mut state = state.lock();
        let request = uri
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str().to_owned())
            .unwrap_or_else(|| uri.path().to_owned());
        state.requests.push(request);
        state.responses.get(uri.path()).cloned()
    };

    match response {
        Some(MockResponse::Json(body)) => Json(body).into_response(),
        Some(MockResponse::Status(status)) => status.into_response(),
        Some(MockResponse::Delayed(delay, body)) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn mock_setup() -> (MockUpstream, MockCleanup) {
    let state = Arc::new(Mutex::new(MockState::default()));
    let app = Router::new()
        .fallback(mock_handler)
        .with_state(state.clone());

    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
        .serve(app.into_make_service());
    let addr = server.local_addr();
    let server = tokio::spawn(async move {
        server.await.expect("mock server error");
    });

    let url = Url::parse(&format!("http://{addr}/")).unwrap();

    (MockUpstream { url, state }, MockCleanup { server })
}

pub async fn mock_cleanup(cleanup: MockCleanup) {
    // Delayed responses may still be pending, so don't wait for them.
    cleanup.server.abort();
    let _ = cleanup.server.await;
}

pub async fn mock_pair_setup() -> ((MockUpstream, MockUpstream), (MockCleanup, MockCleanup)) {
    let (first, first_cleanup) = mock_setup().await;
    let (second, second_cleanup) = mock_setup().await;

    ((first, second), (first_cleanup, second_cleanup))
}

pub async fn mock_pair_cleanup((first, second): (MockCleanup, MockCleanup)) {
    mock_cleanup(first).await;
    mock_cleanup(second).await;
}

/// Wraps `data` in the `/api/v1` response envelope.
pub fn success(data: Value) -> Value {
    json!({ "status": "success", "data": data })
}

pub fn status_response(version: &str) -> Value {
    success(json!({
        "config": "",
        "versionInfo": {
            "branch": "master",
            "revision": "deadbeef",
            "version": version,
        },
        "uptime": "2023-01-01T00:00:00Z",
    }))
}

/// Pull context with a metrics registry of its own, so tests don't share
/// counters.
pub fn test_context(config: &EnrichmentConfig) -> PullContext {
    PullContext {
        adapters: Default::default(),
        enricher: Enricher::new(config),
        metrics: Metrics::new(&prometheus::Registry::new()).unwrap(),
    }
}

pub fn timestamp(value: &str) -> OffsetDateTime {
    OffsetDateTime::parse(value, &Rfc3339).unwrap()
}

/// An active alert for the `default` receiver.
pub fn alert(labels: &[(&str, &str)], starts_at: &str) -> Alert {
    let starts_at = timestamp(starts_at);

    Alert {
        labels: labels
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect(),
        annotations: BTreeMap::new(),
        starts_at,
        ends_at: starts_at,
        generator_url: String::new(),
        state: AlertState::Active,
        silenced_by: Vec::new(),
        inhibited_by: Vec::new(),
        receiver: "default".to_owned(),
        links: BTreeMap::new(),
        fingerprint: String::new(),
        id: String::new(),
        alertmanager: Vec::new(),
    }
}

pub fn silence(id: &str, created_by: &str, comment: &str) -> Silence {
    Silence {
        id: id.to_owned(),
        matchers: Vec::new(),
        starts_at: timestamp("2023-01-01T00:00:00Z"),
        ends_at: timestamp("2023-01-02T00:00:00Z"),
        created_at: timestamp("2023-01-01T00:00:00Z"),
        created_by: created_by.to_owned(),
        comment: comment.to_owned(),
        jira_id: None,
        jira_url: None,
    }
}
