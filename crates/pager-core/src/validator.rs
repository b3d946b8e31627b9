//! Input validation and sanitization for published messages.
//!
//! Every accepted message is trimmed, bounds-checked and HTML-escaped before
//! it reaches the store or the hub.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Maximum message length in characters, counted after trimming.
pub const MAX_MESSAGE_LENGTH: usize = 50;

/// Maximum correlation identifier length in characters.
pub const MAX_CORRELATION_ID_LENGTH: usize = 100;

/// Reasons a publish body is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No body, or no `message` field, or `message` is null.
    #[error("Invalid JSON body")]
    MissingBody,

    /// `message` is present but is not a string.
    #[error("Message must be a string")]
    WrongType,

    /// `message` is empty after trimming.
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// `message` is longer than the configured bound after trimming.
    #[error("Message too long (max {max} characters, got {length})")]
    TooLong {
        /// Trimmed length in characters.
        length: usize,
        /// Configured bound.
        max: usize,
    },

    /// The correlation identifier is not a string or is too long.
    #[error("Invalid correlationId (must be a string of at most {max} characters)")]
    InvalidCorrelationId {
        /// Configured bound.
        max: usize,
    },
}

impl ValidationError {
    /// Short, stable label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingBody => "missing_body",
            ValidationError::WrongType => "wrong_type",
            ValidationError::EmptyMessage => "empty_message",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::InvalidCorrelationId { .. } => "invalid_correlation_id",
        }
    }
}

/// Length bounds applied by the [`Validator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Maximum correlation identifier length in characters.
    pub max_correlation_id_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_message_length: MAX_MESSAGE_LENGTH,
            max_correlation_id_length: MAX_CORRELATION_ID_LENGTH,
        }
    }
}

/// Text that has been trimmed, bounds-checked and escaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SanitizedText(String);

impl SanitizedText {
    /// Borrow the sanitized text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the sanitized text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully validated publish body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
    /// Sanitized message text.
    pub text: SanitizedText,
    /// Correlation identifier, if the publisher supplied one.
    pub correlation_id: Option<String>,
}

/// Validates raw publish bodies.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: ValidationLimits,
}

impl Validator {
    /// Create a validator with the given limits.
    #[must_use]
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Get the configured limits.
    #[must_use]
    pub fn limits(&self) -> ValidationLimits {
        self.limits
    }

    /// Validate a raw JSON publish body.
    ///
    /// The correlation identifier is read from `correlationId`, falling back
    /// to the legacy `clientId` key. A null identifier counts as absent.
    ///
    /// # Errors
    ///
    /// Returns the first rule the body violates.
    pub fn validate(&self, body: Option<&Value>) -> Result<ValidatedMessage, ValidationError> {
        let message = body
            .and_then(|b| b.get("message"))
            .filter(|m| !m.is_null())
            .ok_or(ValidationError::MissingBody)?;

        let text = self.validate_text(message)?;

        let raw_id = body
            .and_then(|b| b.get("correlationId").or_else(|| b.get("clientId")))
            .filter(|id| !id.is_null());
        let correlation_id = match raw_id {
            Some(id) => Some(self.validate_correlation_id(id)?),
            None => None,
        };

        Ok(ValidatedMessage {
            text,
            correlation_id,
        })
    }

    /// Validate and sanitize the `message` value alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a string, is blank, or is too long.
    pub fn validate_text(&self, raw: &Value) -> Result<SanitizedText, ValidationError> {
        let text = raw.as_str().ok_or(ValidationError::WrongType)?;
        self.sanitize(text)
    }

    /// Trim, bound and escape a message string.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is blank or too long.
    pub fn sanitize(&self, text: &str) -> Result<SanitizedText, ValidationError> {
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        let length = trimmed.chars().count();
        if length > self.limits.max_message_length {
            return Err(ValidationError::TooLong {
                length,
                max: self.limits.max_message_length,
            });
        }

        Ok(SanitizedText(escape_html(trimmed)))
    }

    fn validate_correlation_id(&self, raw: &Value) -> Result<String, ValidationError> {
        let invalid = ValidationError::InvalidCorrelationId {
            max: self.limits.max_correlation_id_length,
        };
        let id = raw.as_str().ok_or_else(|| invalid.clone())?;
        if id.chars().count() > self.limits.max_correlation_id_length {
            return Err(invalid);
        }
        Ok(id.to_string())
    }
}

/// Escape the HTML-significant characters `<`, `>`, `"`, `'` and `/`.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(body: Value) -> Result<ValidatedMessage, ValidationError> {
        Validator::default().validate(Some(&body))
    }

    #[test]
    fn test_accepts_plain_message() {
        let validated = validate(json!({"message": "Hello"})).unwrap();
        assert_eq!(validated.text.as_str(), "Hello");
        assert!(validated.correlation_id.is_none());
    }

    #[test]
    fn test_trims_whitespace() {
        let validated = validate(json!({"message": "  Hello  "})).unwrap();
        assert_eq!(validated.text.as_str(), "Hello");
    }

    #[test]
    fn test_missing_body() {
        assert_eq!(
            Validator::default().validate(None),
            Err(ValidationError::MissingBody)
        );
        assert_eq!(validate(json!({})), Err(ValidationError::MissingBody));
        assert_eq!(
            validate(json!({"message": null})),
            Err(ValidationError::MissingBody)
        );
    }

    #[test]
    fn test_wrong_type() {
        for message in [json!(12345), json!(["test"]), json!({"text": "test"}), json!(true)] {
            assert_eq!(
                validate(json!({ "message": message })),
                Err(ValidationError::WrongType)
            );
        }
    }

    #[test]
    fn test_empty_and_blank() {
        assert_eq!(validate(json!({"message": ""})), Err(ValidationError::EmptyMessage));
        assert_eq!(
            validate(json!({"message": "   "})),
            Err(ValidationError::EmptyMessage)
        );
    }

    #[test]
    fn test_length_bound() {
        assert!(validate(json!({"message": "a".repeat(50)})).is_ok());
        assert_eq!(
            validate(json!({"message": "a".repeat(51)})),
            Err(ValidationError::TooLong { length: 51, max: 50 })
        );
        // Surrounding whitespace does not count toward the bound.
        assert!(validate(json!({"message": format!("  {}  ", "a".repeat(50))})).is_ok());
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(validate(json!({"message": "👍".repeat(50)})).is_ok());
        assert!(validate(json!({"message": "👍❤️✨"})).is_ok());
    }

    #[test]
    fn test_escapes_html() {
        let validated = validate(json!({"message": "<script>alert(\"x\")</script>"})).unwrap();
        let text = validated.text.as_str();
        for raw in ['<', '>', '"', '\'', '/'] {
            assert!(!text.contains(raw), "{raw} left unescaped in {text}");
        }
        assert_eq!(
            text,
            "&lt;script&gt;alert(&quot;x&quot;)&lt;&#x2F;script&gt;"
        );
        assert_eq!(escape_html("it's"), "it&#x27;s");
    }

    #[test]
    fn test_correlation_id() {
        let validated = validate(json!({"message": "Test", "correlationId": "test-123"})).unwrap();
        assert_eq!(validated.correlation_id.as_deref(), Some("test-123"));

        let legacy = validate(json!({"message": "Test", "clientId": "legacy"})).unwrap();
        assert_eq!(legacy.correlation_id.as_deref(), Some("legacy"));

        let null_id = validate(json!({"message": "Test", "correlationId": null})).unwrap();
        assert!(null_id.correlation_id.is_none());
    }

    #[test]
    fn test_invalid_correlation_id() {
        let err = ValidationError::InvalidCorrelationId { max: 100 };
        assert_eq!(
            validate(json!({"message": "Test", "correlationId": 123})),
            Err(err.clone())
        );
        assert_eq!(
            validate(json!({"message": "Test", "clientId": "a".repeat(101)})),
            Err(err)
        );
        assert!(validate(json!({"message": "Test", "correlationId": "a".repeat(100)})).is_ok());
    }

    #[test]
    fn test_custom_limits() {
        let validator = Validator::new(ValidationLimits {
            max_message_length: 5,
            max_correlation_id_length: 2,
        });
        assert!(validator.validate(Some(&json!({"message": "12345"}))).is_ok());
        assert!(matches!(
            validator.validate(Some(&json!({"message": "123456"}))),
            Err(ValidationError::TooLong { max: 5, .. })
        ));
    }

    #[test]
    fn test_sanitize_counts_chars_before_escaping() {
        let validator = Validator::default();
        let text = "<".repeat(50);
        let sanitized = validator.sanitize(&text).unwrap();
        assert_eq!(sanitized.as_str(), "&lt;".repeat(50));
        assert_eq!(validator.sanitize("   "), Err(ValidationError::EmptyMessage));
    }
}
