//! Field-level validation shared by catalog operations.

use unicode_normalization::UnicodeNormalization;

/// Canonical form used to compare software names.
///
/// Names are NFC-normalized, lowercased, and stripped of all whitespace, so
/// `"Libre Office"` and `"libreoffice"` collide.
pub fn normalize_software_name(name: &str) -> String {
    name.nfc()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Validate a software name.
pub fn validate_software_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Software name cannot be empty".to_string());
    }
    Ok(())
}

/// Validate an agent email.
///
/// Only the shape `local@domain` is checked; deliverability belongs to the
/// user directory.
pub fn validate_email(email: &str) -> Result<(), String> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(format!("Invalid email (missing '@'): {}", email));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(format!("Invalid email: {}", email));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(format!("Invalid email (contains whitespace): {}", email));
    }
    Ok(())
}
