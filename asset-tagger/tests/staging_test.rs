use asset_tagger::staging::media_type_of;
use asset_tagger::{AssetRef, FetchedPayload, PayloadStager, RenditionCandidate, Stage, StageStatus, TempDirStager, Timeline};
use base64::{engine::general_purpose, Engine as _};
use std::time::Duration;

const BYTES: &[u8] = b"\x89PNG\r\n\x1a\nrendition";

fn payload(suffix: &str, content_type: Option<&str>) -> FetchedPayload {
    FetchedPayload {
        bytes: BYTES.to_vec(),
        byte_length: BYTES.len(),
        content_type: content_type.map(str::to_string),
        candidate: RenditionCandidate::new(suffix),
        candidate_index: 0,
    }
}

fn asset() -> AssetRef {
    AssetRef::new("/content/dam/brand/shoes/red runner.jpg", "https://author.example.com")
}

#[tokio::test]
async fn test_stage_encode_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stager = TempDirStager::new(dir.path());
    let fetched = payload("/jcr:content/renditions/cq5dam.thumbnail.319.319.png", Some("image/png"));

    let staged = stager.stage(&asset(), &fetched).await.expect("staged");

    let name = staged.path.file_name().and_then(|n| n.to_str()).expect("file name");
    assert!(name.starts_with("red_runner_"), "{name}");
    assert!(name.ends_with(".png"), "{name}");
    assert_eq!(staged.byte_length, BYTES.len());
    assert_eq!(staged.media_type, "image/png");

    let image = stager.encode(&staged).await.expect("encoded");
    assert_eq!(image.base64, general_purpose::STANDARD.encode(BYTES));
    assert_eq!(image.data_url(), format!("data:image/png;base64,{}", image.base64));

    stager.cleanup(&staged).await.expect("cleaned");
    assert!(!staged.path.exists());
}

#[tokio::test]
async fn test_staged_names_are_unique_per_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stager = TempDirStager::new(dir.path());
    let fetched = payload("/jcr:content/renditions/original", None);

    let first = stager.stage(&asset(), &fetched).await.expect("staged");
    let second = stager.stage(&asset(), &fetched).await.expect("staged");

    assert_ne!(first.path, second.path);
    assert!(first.path.to_string_lossy().ends_with(".jpeg"));
}

#[tokio::test]
async fn test_cleanup_of_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stager = TempDirStager::new(dir.path());
    let staged = stager
        .stage(&asset(), &payload("/renditions/a.png", Some("image/png")))
        .await
        .expect("staged");

    stager.cleanup(&staged).await.expect("first cleanup");
    assert!(stager.cleanup(&staged).await.is_err());
}

#[test]
fn test_media_type_falls_back_to_jpeg() {
    assert_eq!(media_type_of(&payload("/a.png", Some("image/png; charset=binary"))), "image/png");
    assert_eq!(media_type_of(&payload("/a.png", Some("application/octet-stream"))), "image/jpeg");
    assert_eq!(media_type_of(&payload("/a.png", None)), "image/jpeg");
}

#[test]
fn test_timeline_is_append_only_in_order() {
    let mut timeline = Timeline::new();
    timeline.succeeded(Stage::Validate, "ok", Duration::from_millis(1));
    timeline.failed(Stage::Commit, "HTTP 500", Duration::from_millis(12));
    timeline.skipped(Stage::Cleanup, "nothing staged");

    assert_eq!(timeline.stages(), vec![Stage::Validate, Stage::Commit, Stage::Cleanup]);
    assert_eq!(timeline.find(Stage::Commit).map(|r| r.status), Some(StageStatus::Failed));
    assert_eq!(timeline.find(Stage::Commit).map(|r| r.elapsed_ms), Some(12));

    let json = serde_json::to_value(&timeline).expect("json");
    assert_eq!(json[0]["stage"], "validate");
    assert_eq!(json[2]["status"], "skipped");
}
