use super::handlers::{autocomplete, build_alerts_response};
use super::*;
use crate::models::{AlertState, Color, LabelColors, Labels};
use crate::service::alertmanager::{build_snapshot, AlertmanagerSnapshot, PollerState};
use crate::service::enrichment::{EnrichmentConfig, Enricher};
use crate::testutil::*;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

fn upstream(name: &str) -> Alertmanager {
    Alertmanager::new(
        name,
        Url::parse(&format!("http://{name}:9093")).unwrap(),
        Duration::from_secs(1),
    )
    .unwrap()
}

/// An Alertmanager that has published the given groups and silences.
fn published(name: &str, groups: Vec<AlertGroup>, silences: Vec<Silence>) -> Arc<Alertmanager> {
    let am = upstream(name);
    let snapshot = build_snapshot(
        name,
        am.uri().as_str(),
        groups,
        silences,
        &Enricher::default(),
    )
    .unwrap();
    am.publish(snapshot);
    Arc::new(am)
}

fn node_down(instance: &str, starts_at: &str) -> Alert {
    let mut firing = alert(&[("alertname", "NodeDown"), ("instance", instance)], starts_at);
    firing.receiver = "ops".to_owned();
    firing
}

fn node_down_group(alerts: Vec<Alert>) -> AlertGroup {
    AlertGroup::new("ops".to_owned(), labels(&[("alertname", "NodeDown")]), alerts)
}

#[test]
fn merge_deduplicates_alerts_across_alertmanagers() {
    let first = published(
        "a",
        vec![node_down_group(vec![node_down("web1", "2023-01-01T10:00:00Z")])],
        Vec::new(),
    );
    let second = published(
        "b",
        vec![node_down_group(vec![
            node_down("web1", "2023-01-01T10:00:00Z"),
            node_down("web2", "2023-01-01T09:00:00Z"),
        ])],
        Vec::new(),
    );

    let merged = merge(&[first.clone(), second.clone()]);

    assert_eq!(merged.groups.len(), 1);
    let group = &merged.groups[0];
    assert_eq!(group.alerts.len(), 2);

    let web1 = &group.alerts[0];
    assert_eq!(web1.labels["instance"], "web1");
    let names: Vec<&str> = web1.alertmanager.iter().map(|am| am.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);

    let web2 = &group.alerts[1];
    let names: Vec<&str> = web2.alertmanager.iter().map(|am| am.name.as_str()).collect();
    assert_eq!(names, vec!["b"]);
    assert_eq!(group.state_count[&AlertState::Active], 2);

    // Merging in the other direction only changes the provenance order.
    let reversed = merge(&[second, first]);
    assert_eq!(reversed.groups[0].id, group.id);
    assert_eq!(reversed.groups[0].hash, group.hash);
    let names: Vec<&str> = reversed.groups[0].alerts[0]
        .alertmanager
        .iter()
        .map(|am| am.name.as_str())
        .collect();
    assert_eq!(names, vec!["b", "a"]);
}

#[test]
fn merge_keeps_groups_of_different_receivers_apart() {
    let mut dev = node_down("web1", "2023-01-01T10:00:00Z");
    dev.receiver = "dev".to_owned();

    let first = published(
        "a",
        vec![node_down_group(vec![node_down("web1", "2023-01-01T10:00:00Z")])],
        Vec::new(),
    );
    let second = published(
        "b",
        vec![AlertGroup::new(
            "dev".to_owned(),
            labels(&[("alertname", "NodeDown")]),
            vec![dev],
        )],
        Vec::new(),
    );

    let merged = merge(&[first, second]);

    let receivers: Vec<&str> = merged
        .groups
        .iter()
        .map(|group| group.receiver.as_str())
        .collect();
    assert_eq!(receivers, vec!["ops", "dev"]);
}

#[test]
fn merge_folds_silences_of_the_same_alertmanager() {
    let mut silenced = node_down("web1", "2023-01-01T10:00:00Z");
    silenced.state = AlertState::Suppressed;
    silenced.silenced_by = vec!["s1".to_owned()];

    let am = published(
        "a",
        vec![node_down_group(vec![silenced])],
        vec![silence("s1", "alice", "Reboot")],
    );

    // The same Alertmanager listed twice contributes a single provenance entry.
    let merged = merge(&[am.clone(), am]);

    let instances = &merged.groups[0].alerts[0].alertmanager;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].silences["s1"].created_by, "alice");
}

#[test]
fn merge_takes_silences_and_colors_from_the_first_alertmanager() {
    let colored = |red: u8| LabelColors {
        font: Color::rgb(0, 0, 0),
        background: Color::rgb(red, 0, 0),
    };

    let first = upstream("a");
    first.publish(AlertmanagerSnapshot {
        silences: BTreeMap::from([("s1".to_owned(), silence("s1", "alice", "first"))]),
        colors: BTreeMap::from([(
            "cluster".to_owned(),
            BTreeMap::from([("eu1".to_owned(), colored(1))]),
        )]),
        ..Default::default()
    });

    let second = upstream("b");
    second.publish(AlertmanagerSnapshot {
        silences: BTreeMap::from([
            ("s1".to_owned(), silence("s1", "bob", "second")),
            ("s2".to_owned(), silence("s2", "bob", "only here")),
        ]),
        colors: BTreeMap::from([(
            "cluster".to_owned(),
            BTreeMap::from([
                ("eu1".to_owned(), colored(2)),
                ("us1".to_owned(), colored(3)),
            ]),
        )]),
        ..Default::default()
    });

    let merged = merge(&[Arc::new(first), Arc::new(second)]);

    assert_eq!(merged.silences["s1"].comment, "first");
    assert_eq!(merged.silences["s2"].comment, "only here");
    assert_eq!(merged.colors["cluster"]["eu1"], colored(1));
    assert_eq!(merged.colors["cluster"]["us1"], colored(3));
}

#[test]
fn merge_keeps_provenance_silences_when_ids_collide() {
    let silenced = |instance: &str| {
        let mut firing = node_down(instance, "2023-01-01T10:00:00Z");
        firing.state = AlertState::Suppressed;
        firing.silenced_by = vec!["7".to_owned()];
        firing
    };

    let first = published(
        "a",
        vec![node_down_group(vec![silenced("web1")])],
        vec![silence("7", "alice", "Reboot web1")],
    );
    let second = published(
        "b",
        vec![node_down_group(vec![silenced("web2")])],
        vec![silence("7", "bob", "Reboot web2")],
    );

    let merged = merge(&[first, second]);

    assert_eq!(merged.silences.len(), 1);
    assert_eq!(merged.silences["7"].created_by, "alice");

    let group = &merged.groups[0];
    let web2 = group
        .alerts
        .iter()
        .find(|alert| alert.labels["instance"] == "web2")
        .unwrap();
    assert_eq!(web2.alertmanager.len(), 1);
    assert_eq!(web2.alertmanager[0].name, "b");
    assert_eq!(web2.alertmanager[0].silences["7"].created_by, "bob");
}

#[test]
fn merge_unions_autocomplete_hints() {
    let first = published(
        "a",
        vec![node_down_group(vec![node_down("web1", "2023-01-01T10:00:00Z")])],
        Vec::new(),
    );
    let second = published(
        "b",
        vec![node_down_group(vec![node_down("web2", "2023-01-01T10:00:00Z")])],
        Vec::new(),
    );

    let merged = merge(&[first, second]);
    let values: Vec<&str> = merged
        .autocomplete
        .iter()
        .map(|hint| hint.value.as_str())
        .collect();

    assert!(values.contains(&"instance=web1"));
    assert!(values.contains(&"instance=web2"));
    assert!(values.contains(&"@alertmanager=a"));
    assert!(values.contains(&"@alertmanager=b"));
    assert_eq!(
        values.iter().filter(|value| **value == "alertname=NodeDown").count(),
        1
    );
}

#[test]
fn merge_reports_upstream_health() {
    let merged = merge(&[Arc::new(upstream("a")), Arc::new(upstream("b"))]);

    assert!(merged.groups.is_empty());
    let names: Vec<&str> = merged
        .upstreams
        .iter()
        .map(|health| health.name.as_str())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(merged
        .upstreams
        .iter()
        .all(|health| health.state == PollerState::Idle && health.last_success.is_none()));
}

fn filtered_snapshot() -> MergedSnapshot {
    let mut critical = node_down("web1", "2023-01-01T10:00:00Z");
    critical.labels.insert("severity".to_owned(), "critical".to_owned());

    let mut warning = node_down("web2", "2023-01-01T09:00:00Z");
    warning.labels.insert("severity".to_owned(), "warning".to_owned());
    warning.state = AlertState::Suppressed;
    warning.silenced_by = vec!["s1".to_owned()];

    let mut disk = alert(&[("alertname", "DiskFull"), ("instance", "db1")], "2023-01-01T08:00:00Z");
    disk.receiver = "storage".to_owned();

    let mut silences = vec![silence("s1", "alice", "Patching, DEVOPS-42")];
    Enricher::new(&EnrichmentConfig {
        jira_regex: vec![crate::service::enrichment::parse_jira_rule(
            "DEVOPS-[0-9]+@https://jira.example.com",
        )
        .unwrap()],
        ..Default::default()
    })
    .detect_jira(&mut silences[0]);

    let am = published(
        "prod",
        vec![
            node_down_group(vec![critical, warning]),
            AlertGroup::new("storage".to_owned(), labels(&[("alertname", "DiskFull")]), vec![disk]),
        ],
        silences,
    );

    merge(&[am])
}

fn matching_instances(response: &handlers::AlertsResponse) -> Vec<String> {
    response
        .groups
        .iter()
        .flat_map(|group| &group.alerts)
        .map(|alert| alert.labels["instance"].clone())
        .collect()
}

#[test]
fn alerts_without_filters() {
    let response = build_alerts_response(filtered_snapshot(), &[]);

    assert_eq!(response.status, "success");
    assert_eq!(response.groups.len(), 2);
    assert!(response.filters.is_empty());
    assert_eq!(response.counters["alertname"]["NodeDown"], 2);
    assert_eq!(response.counters["alertname"]["DiskFull"], 1);
    assert_eq!(response.upstreams.len(), 1);
    assert_eq!(response.silences["s1"].jira_id.as_deref(), Some("DEVOPS-42"));
}

#[test]
fn alerts_with_filters() {
    let response = build_alerts_response(
        filtered_snapshot(),
        &["alertname=NodeDown".to_owned(), "severity!=warning".to_owned()],
    );

    assert_eq!(matching_instances(&response), vec!["web1"]);
    assert_eq!(response.groups.len(), 1);
    assert_eq!(response.groups[0].state_count[&AlertState::Active], 1);
    assert_eq!(response.counters["instance"].len(), 1);
    assert_eq!(response.counters["severity"]["critical"], 1);

    let hits: Vec<usize> = response.filters.iter().map(|filter| filter.hits).collect();
    assert_eq!(hits, vec![2, 2]);
}

#[test]
fn invalid_filters_are_reported_but_not_applied() {
    let response = build_alerts_response(
        filtered_snapshot(),
        &[
            "instance=web1".to_owned(),
            "severity!=page".to_owned(),
            "bogus".to_owned(),
        ],
    );

    assert_eq!(matching_instances(&response), vec!["web1"]);
    insta::assert_yaml_snapshot!(response.filters, @r###"
    - text: instance=web1
      hits: 1
      isValid: true
    - text: severity!=page
      hits: 3
      isValid: true
    - text: bogus
      hits: 0
      isValid: false
    "###);
}

#[test]
fn regex_filters_are_anchored() {
    let partial = build_alerts_response(filtered_snapshot(), &["instance=~web".to_owned()]);
    assert!(partial.groups.is_empty());

    let full = build_alerts_response(filtered_snapshot(), &["instance=~web.*".to_owned()]);
    assert_eq!(matching_instances(&full), vec!["web1", "web2"]);

    let negated = build_alerts_response(filtered_snapshot(), &["instance!~web.*".to_owned()]);
    assert_eq!(matching_instances(&negated), vec!["db1"]);

    let broken = parse_filter("instance=~web(");
    assert!(!broken.is_valid());
}

#[test]
fn special_filters() {
    let cases = [
        ("@receiver=storage", vec!["db1"]),
        ("@state=suppressed", vec!["web2"]),
        ("@state!=suppressed", vec!["web1", "db1"]),
        ("@alertmanager=prod", vec!["web1", "web2", "db1"]),
        ("@alertmanager=staging", vec![]),
        ("@silence_author=alice", vec!["web2"]),
        ("@silence_jira=DEVOPS-42", vec!["web2"]),
        ("@silence_jira=~DEVOPS-.*", vec!["web2"]),
    ];

    for (filter, expected) in cases {
        let response = build_alerts_response(filtered_snapshot(), &[filter.to_owned()]);
        assert_eq!(matching_instances(&response), expected, "filter {filter}");
    }

    assert!(!parse_filter("@unknown=x").is_valid());
    assert!(!parse_filter("=x").is_valid());
}

#[test]
fn filter_values_may_contain_operators() {
    let mut firing = alert(&[("query", "a=b")], "2023-01-01T00:00:00Z");
    firing.receiver = "ops".to_owned();

    let mut filter = parse_filter("query=a=b");
    assert!(filter.apply(&firing));
    assert_eq!(
        filter.status(),
        FilterStatus {
            text: "query=a=b".to_owned(),
            hits: 1,
            is_valid: true,
        }
    );
}

#[test]
fn autocomplete_matches_token_prefixes() {
    let snapshot = filtered_snapshot();

    let results = autocomplete(&snapshot, "WEB");
    assert_eq!(
        results,
        vec![
            "instance!=web1",
            "instance!=web2",
            "instance=web1",
            "instance=web2",
        ]
    );

    let results = autocomplete(&snapshot, "@silence_j");
    assert_eq!(
        results,
        vec!["@silence_jira!=DEVOPS-42", "@silence_jira=DEVOPS-42"]
    );

    assert!(autocomplete(&snapshot, "nothing-like-this").is_empty());
}

#[test]
fn autocomplete_is_limited() {
    let alerts = (0..30)
        .map(|index| node_down(&format!("web{index:02}"), "2023-01-01T10:00:00Z"))
        .collect();
    let merged = merge(&[published("a", vec![node_down_group(alerts)], Vec::new())]);

    assert_eq!(autocomplete(&merged, "web").len(), 20);
}

#[tokio::test]
async fn merge_pulled_alertmanagers() {
    run_test(
        mock_pair_setup,
        mock_pair_cleanup,
        |(first, second)| async move {
            // arrange
            let groups = success(json!([{
                "labels": { "alertname": "NodeDown" },
                "blocks": [{
                    "alerts": [{
                        "labels": { "alertname": "NodeDown", "instance": "web1" },
                        "annotations": {},
                        "startsAt": "2023-01-01T10:00:00Z",
                        "endsAt": "0001-01-01T00:00:00Z",
                        "generatorURL": "",
                        "status": { "state": "active", "silencedBy": [], "inhibitedBy": [] }
                    }],
                    "routeOpts": { "receiver": "ops" }
                }]
            }]));
            for upstream in [&first, &second] {
                upstream.respond_json("/api/v1/status", status_response("0.15.0"));
                upstream.respond_json("/api/v1/alerts/groups", groups.clone());
                upstream.respond_json("/api/v1/silences", success(json!([])));
            }

            let context = test_context(&EnrichmentConfig::default());
            let a = Arc::new(Alertmanager::new("a", first.url().clone(), Duration::from_secs(5)).unwrap());
            let b = Arc::new(Alertmanager::new("b", second.url().clone(), Duration::from_secs(5)).unwrap());

            // act
            let cancel = CancellationToken::new();
            a.pull(&context, &cancel).await.unwrap();
            b.pull(&context, &cancel).await.unwrap();
            let merged = merge(&[a, b]);

            // assert
            assert_eq!(merged.groups.len(), 1);
            assert_eq!(merged.groups[0].alerts.len(), 1);
            let names: Vec<&str> = merged.groups[0].alerts[0]
                .alertmanager
                .iter()
                .map(|am| am.name.as_str())
                .collect();
            assert_eq!(names, vec!["a", "b"]);
            assert!(merged
                .upstreams
                .iter()
                .all(|health| health.version.as_deref() == Some("0.15.0")));
        },
    )
    .await;
}
