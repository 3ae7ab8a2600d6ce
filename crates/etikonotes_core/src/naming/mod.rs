//! Note id generation and title derivation from note content.

use uuid::Uuid;

use crate::constants::{DEFAULT_TITLE, MAX_TITLE_LENGTH, TITLE_ELLIPSIS};

/// HTML-escaped space the editor's markdown serializer emits for leading blanks.
const ESCAPED_SPACE: &str = "&#x20;";

/// Generate a fresh note identifier.
///
/// # Returns
/// A 32-character lowercase hex string (the simple form of a random UUID).
pub fn generate_note_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Derive a display title from markdown content.
///
/// Uses the first line only: leading `#` markers and escaped spaces are
/// removed and whitespace trimmed. Titles longer than [`MAX_TITLE_LENGTH`]
/// characters are cut at a character boundary and suffixed with `...`.
///
/// # Arguments
/// - `markdown`: Full note body.
///
/// # Returns
/// The derived title, or [`DEFAULT_TITLE`] when nothing usable remains.
pub fn derive_title(markdown: &str) -> String {
    let first_line = markdown.split('\n').next().unwrap_or_default();
    let bounded = truncate_chars(first_line, MAX_TITLE_LENGTH * 2);
    let cleaned = bounded.trim_start_matches('#').replace(ESCAPED_SPACE, "");
    let title = cleaned.trim();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        let cut = truncate_chars(title, MAX_TITLE_LENGTH);
        return format!("{}{}", cut.trim(), TITLE_ELLIPSIS);
    }
    title.to_string()
}

fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &value[..byte_index],
        None => value,
    }
}
