use crate::error::ApiError;

/// Maximum display length of a single speech unit. The demo streams one
/// character per event; tokens and words stay comfortably below this.
const MAX_UNIT_TEXT_CHARS: usize = 64;

/// Validate one incoming transcription event.
///
/// Only the display text is validated here. Timing offsets pass through
/// untouched: malformed timing degrades to "not highlighted" inside the
/// scheduler, and rejecting the request would also drop the unit from the
/// transcript.
pub fn validate_transcription_event(text: &str) -> Result<(), ApiError> {
    if text.is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_UNIT_TEXT_CHARS {
        return Err(ApiError::InvalidInput(format!(
            "Unit text too long (max {} characters)",
            MAX_UNIT_TEXT_CHARS
        )));
    }
    Ok(())
}

/// Validate session ID format (UUID)
pub fn validate_session_id(id: &str) -> Result<(), ApiError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ApiError::InvalidInput(format!("Invalid session ID format: {}", id)))
}
