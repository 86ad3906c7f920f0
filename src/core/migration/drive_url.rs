// Pure helpers around Google Drive share links and object-store URIs.
// Nothing here does I/O, so the migration service and the HTTP layer can both
// lean on the same rules for "which file is this" and "is this row done".

use once_cell::sync::Lazy;
use regex::Regex;

/// Drive share-link shapes we know how to read, tried in order.
static DRIVE_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/file/d/([a-zA-Z0-9_-]+)",
        r"id=([a-zA-Z0-9_-]+)",
        r"/open\?id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("drive id pattern is valid"))
    .collect()
});

const GCS_SCHEME: &str = "gs://";

/// Extracts the file id from a Google Drive URL.
///
/// Supports `/file/d/<id>/view`, `open?id=<id>` and `uc?id=<id>&export=download`.
pub fn extract_google_drive_id(url: &str) -> Option<String> {
    DRIVE_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Object key a Drive file lands on inside the bucket.
pub fn object_key(prefix: &str, file_id: &str) -> String {
    format!("{}/{}.mp3", prefix.trim_end_matches('/'), file_id)
}

/// `gs://<bucket>/<key>` URI for an uploaded object.
pub fn gcs_uri(bucket: &str, key: &str) -> String {
    format!("{}{}/{}", GCS_SCHEME, bucket, key)
}

/// A row counts as migrated once its storage column holds a `gs://bucket/key` URI.
/// Empty strings, placeholders and foreign URLs are still pending.
pub fn is_migrated(bucket_url: Option<&str>) -> bool {
    let Some(rest) = bucket_url.map(str::trim).and_then(|u| u.strip_prefix(GCS_SCHEME)) else {
        return false;
    };

    match rest.split_once('/') {
        Some((bucket, key)) => !bucket.is_empty() && !key.trim().is_empty(),
        None => false,
    }
}

/// Content type sent with the upload, keyed off the object extension.
pub fn content_type_for(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with(".wav") {
        "audio/wav"
    } else {
        "audio/mpeg"
    }
}
