use gridpad_storage::{resolve_key, MemoryBlobStore, ResolveError, ResolveRequest};

fn request<'a>(
    recorded_path: &'a str,
    file_name: &'a str,
    parent_path: Option<&'a str>,
    legacy_prefixes: &'a [String],
) -> ResolveRequest<'a> {
    ResolveRequest {
        recorded_path,
        file_name,
        parent_path,
        legacy_prefixes,
    }
}

#[tokio::test(flavor = "current_thread")]
async fn first_resolvable_candidate_wins() {
    let blob = MemoryBlobStore::new();
    // Both the normalized path and the legacy root location resolve; the
    // earlier candidate must win.
    blob.put("jobs/12/docs/file.csv", b"normalized", "text/csv");
    blob.put("file.csv", b"legacy", "text/csv");

    let resolved = resolve_key(&blob, &request("/jobs/12/docs", "file.csv", None, &[]))
        .await
        .expect("resolve");
    assert_eq!(resolved.key, "jobs/12/docs/file.csv");
    assert_eq!(blob.get(&resolved.key).unwrap(), b"normalized");
}

#[tokio::test(flavor = "current_thread")]
async fn raw_recorded_path_beats_normalization() {
    let blob = MemoryBlobStore::new();
    blob.put("odd//path", b"raw", "text/csv");
    blob.put("odd/path/file.csv", b"normalized", "text/csv");

    let resolved = resolve_key(&blob, &request("odd//path", "file.csv", None, &[]))
        .await
        .expect("resolve");
    assert_eq!(resolved.key, "odd//path");
}

#[tokio::test(flavor = "current_thread")]
async fn parent_folder_path_is_tried_after_the_recorded_path() {
    let blob = MemoryBlobStore::new();
    blob.put("folders/7/file.csv", b"via-parent", "text/csv");

    let resolved = resolve_key(
        &blob,
        &request("stale/location", "file.csv", Some("folders/7"), &[]),
    )
    .await
    .expect("resolve");
    assert_eq!(resolved.key, "folders/7/file.csv");
}

#[tokio::test(flavor = "current_thread")]
async fn legacy_prefix_conventions_are_the_last_direct_candidates() {
    let blob = MemoryBlobStore::new();
    blob.put("uploads/file.csv", b"legacy", "text/csv");

    let legacy = vec!["uploads".to_string()];
    let resolved = resolve_key(&blob, &request("gone/away", "file.csv", None, &legacy))
        .await
        .expect("resolve");
    assert_eq!(resolved.key, "uploads/file.csv");
}

#[tokio::test(flavor = "current_thread")]
async fn listing_sweep_finds_a_sibling_match() {
    let blob = MemoryBlobStore::new();
    // Nothing at any direct candidate; the blob sits under a subfolder of
    // the recorded path's parent.
    blob.put("jobs/12/archive/file.csv", b"swept", "text/csv");

    let resolved = resolve_key(&blob, &request("jobs/12/docs", "file.csv", None, &[]))
        .await
        .expect("resolve");
    assert_eq!(resolved.key, "jobs/12/archive/file.csv");
}

#[tokio::test(flavor = "current_thread")]
async fn exhausting_every_candidate_is_a_hard_failure() {
    let blob = MemoryBlobStore::new();
    blob.put("unrelated/key.bin", b"x", "application/octet-stream");

    let err = resolve_key(&blob, &request("jobs/12/docs", "file.csv", None, &[]))
        .await
        .expect_err("nothing to find");
    match err {
        ResolveError::NotFound { file_name, tried } => {
            assert_eq!(file_name, "file.csv");
            assert!(tried >= 2);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}
