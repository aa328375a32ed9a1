use validator::ValidateEmail;

use crate::error::FieldErrors;

/// Trimmed value, or `None` when blank.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Records a field error when `value` exceeds `max` characters.
pub fn check_length(fields: &mut FieldErrors, field: &str, value: &str, max: usize) -> bool {
    if value.chars().count() > max {
        fields.insert(
            field.to_string(),
            format!("{field} may not be longer than {max} characters"),
        );
        false
    } else {
        true
    }
}

pub fn check_email(fields: &mut FieldErrors, field: &str, value: &str) -> bool {
    if value.validate_email() {
        true
    } else {
        fields.insert(field.to_string(), format!("{field} must be a valid email address"));
        false
    }
}
