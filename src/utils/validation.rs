// Validation utilities for user input
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_TAGS: usize = 3;
pub const MAX_TAG_LENGTH: usize = 30;
pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 32;

const SPECIAL_CHARACTERS: &str = "#$%'^,()*+.:|=?@/[]_`{}!;-~";

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("valid username regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
    })
}

/// Letters, digits and @/./+/-/_ only
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::Validation("Username is required".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(Error::Validation(format!(
            "Username must be at most {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username_regex().is_match(username) {
        return Err(Error::Validation(
            "Username may contain only letters, digits and @/./+/-/_".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    if !email_regex().is_match(email) {
        return Err(Error::Validation("Enter a valid email address".to_string()));
    }
    Ok(())
}

/// Password policy: 8..=32 characters with at least two of a letter, a digit
/// and a special character.
pub fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(Error::Validation(format!(
            "Password must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    if [has_letter, has_digit, has_special].iter().filter(|b| **b).count() < 2 {
        return Err(Error::Validation(format!(
            "Password must include at least two of the following elements: \
             a letter, a digit, a special character ({SPECIAL_CHARACTERS})"
        )));
    }
    Ok(())
}

/// Cross-field signup checks
pub fn validate_signup_passwords(username: &str, password: &str, password2: &str) -> Result<()> {
    validate_password(password)?;
    if password != password2 {
        return Err(Error::Validation("Passwords do not match".to_string()));
    }
    if password == username {
        return Err(Error::Validation(
            "Password and username must not match".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(Error::Validation(format!(
            "Title must be at most {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Validation("Text is required".to_string()));
    }
    Ok(())
}

/// Split a comma-separated tag field into normalized tag names
pub fn parse_tag_list(raw: &str) -> Result<Vec<String>> {
    let tags: Vec<String> = raw.split(',').map(str::to_string).collect();
    normalize_tags(&tags)
}

/// Trim, lowercase and de-duplicate tags, enforcing the per-question limit
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || normalized.contains(&tag) {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(Error::Validation(format!(
                "Tags must be at most {MAX_TAG_LENGTH} characters"
            )));
        }
        normalized.push(tag);
    }

    if normalized.len() > MAX_TAGS {
        return Err(Error::Validation(
            "There should be no more than three tags".to_string(),
        ));
    }
    Ok(normalized)
}

/// Avatars are referenced by URL
pub fn validate_avatar_url(url: &str) -> Result<()> {
    let ok = (url.starts_with("http://") || url.starts_with("https://"))
        && !url.chars().any(char::is_whitespace)
        && url.len() <= 2048;
    if !ok {
        return Err(Error::Validation("Enter a valid avatar URL".to_string()));
    }
    Ok(())
}

/// Only same-site absolute paths are accepted as post-login redirect targets
pub fn safe_next_path(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && path != "/logout" => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
