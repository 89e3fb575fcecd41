//! Checks applied to an uploaded file before it reaches the agent.

use std::path::Path;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["pdf", "png", "jpg", "jpeg", "gif"];

pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn allowed_file(filename: &str) -> bool {
    file_extension(filename).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

pub fn unsupported_message(filename: &str) -> String {
    let shown = file_extension(filename).map(|ext| format!(".{}", ext)).unwrap_or_else(|| filename.to_string());
    format!(
        "Unsupported file type: {}. Allowed types: {}",
        shown,
        ALLOWED_EXTENSIONS.join(", ")
    )
}
