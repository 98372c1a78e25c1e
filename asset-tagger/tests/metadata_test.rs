mod common;

use asset_tagger::retry::{BackoffSchedule, RetryPolicy};
use asset_tagger::{
    AssetRef, AssetsApiWriter, CommitOutcome, ContentNodeWriter, MetadataCommitter, PropertySet, TaggerError, WritePath,
};
use common::{fast_delay, init_tracing, Reply, Script, StubServer, ASSET_PATH, TOKEN};
use serde_json::{json, Value};
use std::sync::Arc;

const API_PATH: &str = "/api/assets/brand/shoes/runner.jpg";
const NODE_PATH: &str = "/content/dam/brand/shoes/runner.jpg/jcr:content/metadata";

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        pre_attempt_delay: fast_delay(),
        schedule: BackoffSchedule::Constant { interval: fast_delay() },
    }
}

fn properties() -> PropertySet {
    let mut props = PropertySet::new();
    props.insert("aigen:color".to_string(), json!("red"));
    props.insert("aigen:keywords".to_string(), json!(["running", "shoe"]));
    props.insert("aigen:status".to_string(), json!("processed"));
    props
}

fn assets_api(server: &StubServer) -> (MetadataCommitter, AssetRef) {
    let writer = AssetsApiWriter::new(reqwest::Client::new(), TOKEN);
    (
        MetadataCommitter::new(Arc::new(writer), policy()),
        AssetRef::new(ASSET_PATH, &server.base_url),
    )
}

fn content_node(server: &StubServer) -> (MetadataCommitter, AssetRef) {
    let writer = ContentNodeWriter::new(reqwest::Client::new(), TOKEN);
    (
        MetadataCommitter::new(Arc::new(writer), policy()),
        AssetRef::new(ASSET_PATH, &server.base_url),
    )
}

fn status_body(code: i64, message: &str) -> Value {
    json!({
        "class": ["core/response"],
        "properties": { "status.code": code, "status.message": message }
    })
}

#[tokio::test]
async fn test_assets_api_commit_succeeds_on_embedded_status() {
    init_tracing();
    let script = Script::new().on(API_PATH, vec![Reply::json(200, status_body(200, "OK"))]);
    let server = StubServer::start(script).await;
    let (committer, asset) = assets_api(&server);

    let report = committer.commit(&asset, &properties()).await.expect("committed");

    assert_eq!(report.path, WritePath::AssetsApi);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, CommitOutcome::TerminalSuccess);

    let request = &server.script.requests()[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(request.path, API_PATH);
    assert_eq!(request.headers["authorization"], format!("Bearer {}", TOKEN));
    assert_eq!(request.headers["cache-control"], "no-cache");

    let body: Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body["class"], "asset");
    assert_eq!(body["properties"]["metadata/aigen:color"], "red");
    assert_eq!(body["properties"]["metadata/aigen:keywords"], json!(["running", "shoe"]));
    assert_eq!(body["properties"]["metadata/aigen:status"], "processed");
    assert!(body["properties"].get("aigen:color").is_none());
}

#[tokio::test]
async fn test_assets_api_embedded_failure_exhausts_budget() {
    let script = Script::new().on(API_PATH, vec![Reply::json(200, status_body(500, "repository busy"))]);
    let server = StubServer::start(script).await;
    let (committer, asset) = assets_api(&server);

    let err = committer.commit(&asset, &properties()).await.unwrap_err();

    match err {
        TaggerError::MetadataCommitFailed {
            asset,
            path,
            attempts,
            last_error,
            attempt_log,
        } => {
            assert_eq!(asset, ASSET_PATH);
            assert_eq!(path, WritePath::AssetsApi);
            assert_eq!(attempts, 3);
            assert!(last_error.contains("500"), "{last_error}");

            let outcomes: Vec<CommitOutcome> = attempt_log.iter().map(|a| a.outcome).collect();
            assert_eq!(
                outcomes,
                vec![
                    CommitOutcome::TransientFailure,
                    CommitOutcome::TransientFailure,
                    CommitOutcome::TerminalFailure
                ]
            );
            let numbers: Vec<u32> = attempt_log.iter().map(|a| a.attempt_number).collect();
            assert_eq!(numbers, vec![1, 2, 3]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.script.count(API_PATH), 3);
}

#[tokio::test]
async fn test_unparsable_body_is_retried() {
    let script = Script::new().on(
        API_PATH,
        vec![
            Reply::text(200, "<html>maintenance</html>"),
            Reply::json(200, status_body(200, "OK")),
        ],
    );
    let server = StubServer::start(script).await;
    let (committer, asset) = assets_api(&server);

    let report = committer.commit(&asset, &properties()).await.expect("committed");

    let outcomes: Vec<CommitOutcome> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(outcomes, vec![CommitOutcome::TransientFailure, CommitOutcome::TerminalSuccess]);
    assert!(report.attempts.iter().all(|a| a.outcome != CommitOutcome::Pending));
    assert!(report.attempts[0].detail.is_some());
    assert_eq!(report.attempts[1].attempt_number, 2);
}

#[tokio::test]
async fn test_empty_success_body_is_not_success() {
    let script = Script::new().on(API_PATH, vec![Reply::status(200)]);
    let server = StubServer::start(script).await;
    let (committer, asset) = assets_api(&server);

    let err = committer.commit(&asset, &properties()).await.unwrap_err();

    assert_eq!(err.kind(), "MetadataCommitFailed");
    assert_eq!(server.script.count(API_PATH), 3);
}

#[tokio::test]
async fn test_status_code_as_string_is_not_success() {
    let script = Script::new().on(
        API_PATH,
        vec![Reply::json(200, json!({ "properties": { "status.code": "200" } }))],
    );
    let server = StubServer::start(script).await;
    let (committer, asset) = assets_api(&server);

    let err = committer.commit(&asset, &properties()).await.unwrap_err();

    assert_eq!(err.kind(), "MetadataCommitFailed");
}

#[tokio::test]
async fn test_content_node_form_repeats_array_values() {
    let script = Script::new().on(NODE_PATH, vec![Reply::status(200)]);
    let server = StubServer::start(script).await;
    let (committer, asset) = content_node(&server);

    let report = committer.commit(&asset, &properties()).await.expect("committed");
    assert_eq!(report.path, WritePath::ContentNode);

    let request = &server.script.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, NODE_PATH);
    assert_eq!(
        request.headers["content-type"],
        "application/x-www-form-urlencoded"
    );

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(request.body.as_bytes())
        .into_owned()
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("aigen:color".to_string(), "red".to_string()),
            ("aigen:keywords".to_string(), "running".to_string()),
            ("aigen:keywords".to_string(), "shoe".to_string()),
            ("aigen:status".to_string(), "processed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_content_node_retries_until_2xx() {
    let script = Script::new().on(NODE_PATH, vec![Reply::text(500, "oops"), Reply::status(201)]);
    let server = StubServer::start(script).await;
    let (committer, asset) = content_node(&server);

    let report = committer.commit(&asset, &properties()).await.expect("committed");

    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].outcome, CommitOutcome::TransientFailure);
    assert_eq!(report.attempts[1].outcome, CommitOutcome::TerminalSuccess);
    assert_eq!(server.script.count(NODE_PATH), 2);
}

#[test]
fn test_endpoints() {
    let asset = AssetRef::new(ASSET_PATH, "https://author.example.com/");
    assert_eq!(
        AssetsApiWriter::endpoint(&asset),
        "https://author.example.com/api/assets/brand/shoes/runner.jpg"
    );
    assert_eq!(
        ContentNodeWriter::endpoint(&asset),
        "https://author.example.com/content/dam/brand/shoes/runner.jpg/jcr:content/metadata"
    );
}

#[test]
fn test_payload_leaves_input_untouched() {
    let props = properties();
    let before = props.clone();
    let payload = AssetsApiWriter::payload(&props);
    assert_eq!(props, before);
    assert_eq!(payload["properties"].as_object().map(|p| p.len()), Some(3));
}
