//! Storage-key resolution.
//!
//! A file record's logical path does not always equal its blob key: files
//! uploaded before a path-convention migration live under older layouts.
//! Resolution builds an ordered, de-duplicated candidate list, probes each
//! in turn, and only then falls back to a bounded directory listing.
//! Exhausting every candidate is a hard failure — retrying cannot help,
//! because nothing about the inputs changes.

use thiserror::Error;

use crate::{BlobError, BlobStore};

/// Cap on listing entries examined per prefix during the fallback sweep.
const LIST_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no blob found for `{file_name}` after {tried} candidates")]
    NotFound { file_name: String, tried: usize },
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// Inputs the resolver works from, all taken off the file record.
#[derive(Clone, Debug)]
pub struct ResolveRequest<'a> {
    pub recorded_path: &'a str,
    pub file_name: &'a str,
    /// The containing folder's own recorded path, when the file is in one.
    pub parent_path: Option<&'a str>,
    /// Historical key layouts to try root-relatively (oldest last).
    pub legacy_prefixes: &'a [String],
}

/// A successful resolution: the key that answered, and its signed URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyResolution {
    pub key: String,
    pub url: String,
}

/// Build the ordered, de-duplicated candidate list.
///
/// Order is the contract: (a) the raw recorded path, (b) the normalized
/// path, (c) parent folder path + file name, (d) legacy root-relative and
/// prefixed conventions. Callers and tests rely on earlier candidates
/// winning.
pub fn candidate_keys(request: &ResolveRequest<'_>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    push(request.recorded_path.to_string());

    let normalized = normalize_path(request.recorded_path, request.file_name);
    push(normalized);

    if let Some(parent) = request.parent_path {
        let parent = collapse_slashes(parent);
        if !parent.is_empty() {
            push(format!("{parent}/{}", request.file_name));
        }
    }

    push(request.file_name.to_string());
    for prefix in request.legacy_prefixes {
        let prefix = collapse_slashes(prefix);
        if !prefix.is_empty() {
            push(format!("{prefix}/{}", request.file_name));
        }
    }

    out
}

/// Strip leading/duplicate slashes, then append the file name — unless the
/// path already ends in, or anywhere contains, a filename-like segment.
fn normalize_path(path: &str, file_name: &str) -> String {
    let collapsed = collapse_slashes(path);
    if collapsed.is_empty() {
        return file_name.to_string();
    }

    let has_file_segment = collapsed
        .split('/')
        .any(|segment| segment == file_name || looks_like_file_name(segment));
    if has_file_segment {
        collapsed
    } else {
        format!("{collapsed}/{file_name}")
    }
}

fn collapse_slashes(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// A dot after the first character marks an extension, and therefore a file.
fn looks_like_file_name(segment: &str) -> bool {
    match segment.rfind('.') {
        Some(0) | None => false,
        Some(_) => true,
    }
}

/// Probe candidates strictly in order; first success wins. If every direct
/// candidate misses, sweep each candidate's parent prefix (and one level of
/// subfolders) for an exact file-name match.
pub async fn resolve_key<B: BlobStore>(
    blob: &B,
    request: &ResolveRequest<'_>,
) -> Result<KeyResolution, ResolveError> {
    let candidates = candidate_keys(request);

    for key in &candidates {
        if let Some(url) = blob.signed_read_url(key).await? {
            return Ok(KeyResolution {
                key: key.clone(),
                url,
            });
        }
        log::debug!("candidate miss: {key}");
    }

    // Listing fallback: the blob may sit next to where a candidate pointed.
    let mut swept: Vec<String> = Vec::new();
    for key in &candidates {
        let prefix = parent_prefix(key);
        if let Some(found) = sweep_prefix(blob, &prefix, request.file_name, &mut swept).await? {
            return Ok(found);
        }
    }

    Err(ResolveError::NotFound {
        file_name: request.file_name.to_string(),
        tried: candidates.len(),
    })
}

fn parent_prefix(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Search one prefix, then its immediate subfolders, for the file name.
async fn sweep_prefix<B: BlobStore>(
    blob: &B,
    prefix: &str,
    file_name: &str,
    swept: &mut Vec<String>,
) -> Result<Option<KeyResolution>, ResolveError> {
    if swept.iter().any(|p| p == prefix) {
        return Ok(None);
    }
    swept.push(prefix.to_string());

    let entries = blob.list(prefix).await?;
    let entries = &entries[..entries.len().min(LIST_LIMIT)];

    for entry in entries {
        if !entry.is_folder && entry.name == file_name {
            let key = join_key(prefix, file_name);
            if let Some(url) = blob.signed_read_url(&key).await? {
                return Ok(Some(KeyResolution { key, url }));
            }
        }
    }

    // One level down only; this is a salvage pass, not a crawl.
    for entry in entries {
        if !entry.is_folder {
            continue;
        }
        let sub = join_key(prefix, &entry.name);
        if swept.iter().any(|p| p == &sub) {
            continue;
        }
        swept.push(sub.clone());

        let sub_entries = blob.list(&sub).await?;
        let sub_entries = &sub_entries[..sub_entries.len().min(LIST_LIMIT)];
        for sub_entry in sub_entries {
            if !sub_entry.is_folder && sub_entry.name == file_name {
                let key = join_key(&sub, file_name);
                if let Some(url) = blob.signed_read_url(&key).await? {
                    return Ok(Some(KeyResolution { key, url }));
                }
            }
        }
    }

    Ok(None)
}

fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

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

    #[test]
    fn candidates_are_ordered_and_deduplicated() {
        let legacy = vec!["uploads".to_string()];
        let keys = candidate_keys(&request(
            "//jobs/12//docs",
            "file.csv",
            Some("/jobs/12/docs/"),
            &legacy,
        ));
        assert_eq!(
            keys,
            vec![
                "//jobs/12//docs".to_string(),
                "jobs/12/docs/file.csv".to_string(),
                "file.csv".to_string(),
                "uploads/file.csv".to_string(),
            ]
        );
    }

    #[test]
    fn normalization_appends_the_file_name_only_when_missing() {
        assert_eq!(
            normalize_path("/jobs/12/docs", "file.csv"),
            "jobs/12/docs/file.csv"
        );
        assert_eq!(
            normalize_path("jobs/12/docs/file.csv", "file.csv"),
            "jobs/12/docs/file.csv"
        );
        // A different filename-like segment still suppresses the append.
        assert_eq!(
            normalize_path("jobs/12/old-name.csv", "file.csv"),
            "jobs/12/old-name.csv"
        );
        // Dot-directories are not filenames.
        assert_eq!(
            normalize_path(".hidden/docs", "file.csv"),
            ".hidden/docs/file.csv"
        );
        assert_eq!(normalize_path("", "file.csv"), "file.csv");
    }

    #[test]
    fn empty_inputs_produce_no_empty_candidates() {
        let keys = candidate_keys(&request("", "file.csv", None, &[]));
        assert_eq!(keys, vec!["file.csv".to_string()]);
    }
}
