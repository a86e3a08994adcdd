//! Filename helpers for names derived from user-supplied paths.
//!
//! Workspace directories and synthesized output names are built from the
//! stems of caller paths, which may contain characters that are invalid on
//! some platforms.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest stem kept in a workspace directory name, in characters.
pub const MAX_STEM_CHARS: usize = 48;

/// Sanitize a path stem for use as a single path component.
///
/// Control characters and Windows-invalid characters become `_` (runs are
/// collapsed), leading/trailing spaces and dots are trimmed, and an empty
/// result becomes `"unnamed"`.
///
/// ```
/// use reface::utils::filename::sanitize_stem;
///
/// assert_eq!(sanitize_stem("clip:final?"), "clip_final_");
/// assert_eq!(sanitize_stem("..."), "unnamed");
/// ```
pub fn sanitize_stem(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }
    trimmed.to_string()
}

/// Sanitize and truncate a stem to at most [`MAX_STEM_CHARS`] characters.
pub fn short_stem(input: &str) -> String {
    let sanitized = sanitize_stem(input);
    match sanitized.char_indices().nth(MAX_STEM_CHARS) {
        Some((idx, _)) => sanitized[..idx].trim_end_matches([' ', '.']).to_string(),
        None => sanitized,
    }
}
