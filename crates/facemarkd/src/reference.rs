//! Mapping from a user to their stored reference image.

use std::path::{Path, PathBuf};

/// Derive the reference identifier for a user.
///
/// The first whitespace-separated word of the name, lowercased; when the name
/// is blank, the local part of the email, lowercased. `None` if both are blank.
pub fn unique_id(user_name: &str, user_email: &str) -> Option<String> {
    if let Some(word) = user_name.split_whitespace().next() {
        return Some(word.to_lowercase());
    }
    let local = user_email.trim().split('@').next().unwrap_or("").trim();
    (!local.is_empty()).then(|| local.to_lowercase())
}

/// Reference image path for `unique_id` under `dir`.
///
/// Identifiers containing path separators or `..` are refused so a caller
/// cannot read outside the reference directory.
pub fn reference_path(dir: &Path, unique_id: &str) -> Option<PathBuf> {
    if unique_id.is_empty()
        || unique_id.contains('/')
        || unique_id.contains('\\')
        || unique_id.contains("..")
    {
        return None;
    }
    Some(dir.join(format!("{unique_id}.jpg")))
}
