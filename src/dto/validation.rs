//! Validation helpers for DTOs.

use validator::ValidationError;

/// Rejects text that would break a player's display: control characters or
/// leading/trailing whitespace.
///
/// ```ignore
/// validate_display_text("Ada")      // Ok
/// validate_display_text(" Ada")     // Err - untrimmed
/// validate_display_text("Ada\nBob") // Err - control character
/// ```
pub fn validate_display_text(text: &str) -> Result<(), ValidationError> {
    if text.trim() != text {
        let mut err = ValidationError::new("display_text_untrimmed");
        err.message = Some("Text must not start or end with whitespace".into());
        return Err(err);
    }

    if text.chars().any(char::is_control) {
        let mut err = ValidationError::new("display_text_control");
        err.message = Some("Text must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}
