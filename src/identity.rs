//! Validation and normalization of client-supplied identity fields.
//!
//! These are pure functions with no access to connection or room state,
//! so they are tested exhaustively here and trusted everywhere else.

use serde_json::Value;

use crate::protocol::Status;

/// Maximum length of an application or room name.
const MAX_CHANNEL_LEN: usize = 64;

/// Maximum length of a display name after normalization.
const MAX_NAME_LEN: usize = 24;

/// Display name substituted when normalization yields an empty string.
pub const DEFAULT_NAME: &str = "Player";

/// Check whether a value is usable as an application or room name.
///
/// Valid names are 1..=64 characters drawn from `[A-Za-z0-9_-]`. The room
/// key separator (`:`) is outside this class, so a valid `app`/`room` pair
/// can never collide with another pair's composite key.
pub fn valid_channel_name(value: &str) -> bool {
    (1..=MAX_CHANNEL_LEN).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Normalize a display name: collapse whitespace runs to a single space,
/// trim, truncate to 24 characters, and fall back to [`DEFAULT_NAME`] if
/// nothing remains. Never fails.
pub fn normalize_display_name(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_NAME_LEN).collect();
    if truncated.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        truncated
    }
}

/// Normalize a presence status. Anything other than the exact literal
/// `"playing"` degrades to [`Status::Lobby`]; presence is cosmetic, so
/// malformed input is never an error.
pub fn normalize_presence_status(value: Option<&str>) -> Status {
    match value {
        Some("playing") => Status::Playing,
        _ => Status::Lobby,
    }
}

/// Coerce a JSON value into the string fed to [`normalize_display_name`].
/// Strings pass through, scalars render as their JSON text, and anything
/// else (null, missing, arrays, objects) is treated as empty.
pub fn coerce_name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
