//! Unique, timestamp-derived file names for uploads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Nanoseconds since the epoch, strictly increasing across calls in this process.
pub fn unique_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);

    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// `photo.png` -> `photo-<timestamp>.png`; names without an extension get
/// the timestamp appended. Any directory part of `original_name` is dropped.
pub fn unique_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let stamp = unique_timestamp();

    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{stem}-{stamp}.{ext}")
        }
        _ => format!("{base}-{stamp}"),
    }
}

pub fn is_directory_marker(path: &str) -> bool {
    path.ends_with('/')
}

/// Paths ending in `/` name a directory and get a fresh unique file name
/// appended; any other path is used verbatim.
pub fn resolve_target_path(path: &str, original_name: &str) -> String {
    if is_directory_marker(path) {
        format!("{path}{}", unique_file_name(original_name))
    } else {
        path.to_string()
    }
}

/// A fresh unique path for `original_name` under `base_path`.
pub fn unique_path_under(base_path: &str, original_name: &str) -> String {
    let file_name = unique_file_name(original_name);
    if base_path.is_empty() || is_directory_marker(base_path) {
        format!("{base_path}{file_name}")
    } else {
        format!("{base_path}/{file_name}")
    }
}
