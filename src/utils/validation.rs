//! Input validation utilities

use crate::constants::MAX_FILENAME_LENGTH;

/// Validate a source filename: one plain path component
pub fn validate_filename(filename: &str) -> Result<(), String> {
    if filename.trim().is_empty() {
        return Err("Filename must not be empty".to_string());
    }
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(format!(
            "Filename must be at most {} characters",
            MAX_FILENAME_LENGTH
        ));
    }
    if filename == "." || filename == ".." {
        return Err(format!("Invalid filename: {}", filename));
    }
    if filename
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    {
        return Err(format!("Invalid filename: {}", filename));
    }
    Ok(())
}
