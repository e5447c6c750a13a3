use super::*;
use tempfile::TempDir;

fn sample_manifest() -> IndexManifest {
    IndexManifest {
        model_id: "BAAI/bge-small-en-v1.5".to_string(),
        dimension: 384,
        count: 42,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn manifest_round_trips_through_disk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let manifest = sample_manifest();

    manifest
        .write(temp_dir.path())
        .await
        .expect("should write manifest");
    let read = IndexManifest::read(temp_dir.path())
        .await
        .expect("should read manifest");

    assert_eq!(read, manifest);
    assert!(temp_dir.path().join(MANIFEST_FILE).exists());
}

#[tokio::test]
async fn remove_marks_index_missing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    IndexManifest::remove(temp_dir.path())
        .await
        .expect("removing an absent manifest is fine");

    sample_manifest()
        .write(temp_dir.path())
        .await
        .expect("should write manifest");
    IndexManifest::remove(temp_dir.path())
        .await
        .expect("should remove manifest");

    assert!(matches!(
        IndexManifest::read(temp_dir.path()).await,
        Err(QaError::IndexNotFound { .. })
    ));
}

#[tokio::test]
async fn missing_manifest_means_no_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    match IndexManifest::read(temp_dir.path()).await {
        Err(QaError::IndexNotFound { path }) => assert_eq!(path, temp_dir.path()),
        other => panic!("expected IndexNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_manifest_is_a_database_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join(MANIFEST_FILE), "{ not json").expect("should write");

    let result = IndexManifest::read(temp_dir.path()).await;
    assert!(matches!(result, Err(QaError::Database(_))));
}

#[test]
fn manifest_uses_readable_field_names() {
    let json = serde_json::to_string(&sample_manifest()).expect("can serialize json");

    assert!(json.contains("\"model_id\":\"BAAI/bge-small-en-v1.5\""));
    assert!(json.contains("\"dimension\":384"));
    assert!(json.contains("\"count\":42"));
    assert!(json.contains("\"created_at\""));
}

#[test]
fn default_top_k_matches_retriever_default() {
    assert_eq!(DEFAULT_TOP_K, 4);
}
