/// Input validators for account data
///
/// Every value that reaches the persistence layer goes through one of these
/// first. They return the normalized value on success so callers never store
/// the raw input by accident.

use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MIN_NAME_LENGTH: usize = 3;
const MAX_NAME_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 6;
// bcrypt only looks at the first 72 bytes
const MAX_PASSWORD_LENGTH: usize = 72;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").unwrap();

    static ref DNI_REGEX: Regex = Regex::new(r"^[A-Za-z0-9\-]{5,20}$").unwrap();

    static ref SQL_INJECTION_PATTERNS: [Regex; 6] = [
        // Union-based SQL injection
        Regex::new(r"(?i)\s+UNION\s+").unwrap(),
        // Comment-based injection
        Regex::new(r"(--|;|/\*|\*/)").unwrap(),
        // Stacked queries
        Regex::new(r"(?i);\s*(INSERT|UPDATE|DELETE|DROP|CREATE|ALTER)").unwrap(),
        // Time-based blind injection
        Regex::new(r"(?i)\b(SLEEP|WAITFOR|BENCHMARK|DBMS_LOCK)\s*\(").unwrap(),
        // Boolean-based injection
        Regex::new(r#"(?i)(\bOR\b|\bAND\b)\s*(['"][0-9]*['"]|[0-9]+)\s*=\s*(['"][0-9]*['"]|[0-9]+|True|False)"#).unwrap(),
        // Function-based injection
        Regex::new(r"(?i)\b(CAST|CONVERT|SUBSTRING|CONCAT|LOAD_FILE)\s*\(").unwrap(),
    ];
}

/// Validates and normalizes an email address (trimmed, lowercased)
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email", MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    // no SQL pattern check: a local part may legally contain `--` or quotes,
    // and queries bind their values
    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email"));
    }

    Ok(normalize_email(trimmed))
}

/// Lowercases and trims an email without validating it.
///
/// Used on the login path, where a malformed address must look exactly like
/// an unknown one.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates a personal name field (`first_name`, `last_name`)
pub fn is_valid_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }

    let char_count = trimmed.chars().count();
    if char_count < MIN_NAME_LENGTH {
        return Err(ValidationError::TooShort(field, MIN_NAME_LENGTH));
    }

    if char_count > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field, MAX_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent(field));
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_string())
}

/// Checks password length bounds and that the confirmation matches.
///
/// The password itself is never trimmed or otherwise altered.
pub fn is_valid_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }

    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    if password != confirmation {
        return Err(ValidationError::Mismatch("password_confirmation", "password"));
    }

    Ok(())
}

pub fn is_valid_phone(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim();
    if !PHONE_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("phone"));
    }
    Ok(trimmed.to_string())
}

pub fn is_valid_dni(dni: &str) -> Result<String, ValidationError> {
    let trimmed = dni.trim();
    if !DNI_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("dni"));
    }
    Ok(trimmed.to_uppercase())
}

/// Parses an ISO-8601 calendar date (`YYYY-MM-DD`) that is not in the future
pub fn parse_birthdate(value: &str) -> Result<NaiveDate, ValidationError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidFormat("birthdate"))?;

    if date > Utc::now().date_naive() {
        return Err(ValidationError::InvalidFormat("birthdate"));
    }

    Ok(date)
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if let Some(at_pos) = email.find('@') {
        let local_part = &email[..at_pos];
        if local_part.len() > 64 {
            return true;
        }
    }

    if email.matches('@').count() != 1 {
        return true;
    }

    email.contains('\0')
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    if name.chars().any(|c| c.is_control()) {
        return true;
    }

    let special_char_count = name
        .chars()
        .filter(|c| {
            !c.is_alphanumeric() && !c.is_whitespace() && *c != '-' && *c != '.' && *c != '\''
        })
        .count();

    special_char_count > 3
}

fn contains_sql_injection_patterns(input: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(input))
}
