// args.rs - Command argument validation
// Pure parsing of the free-text arguments prefix commands receive. Every
// failure is a `ValidationError` that is shown to the user verbatim; nothing
// here touches shared state.

use thiserror::Error;

use crate::store::CacheDays;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please provide a search query.")]
    EmptyQuery,
    #[error("Please provide how many days to keep the cache (1-14).")]
    MissingDays,
    #[error("Days must be a whole number from 1 to 14 (got `{0}`).")]
    InvalidDays(String),
    #[error("Please provide a username.")]
    MissingUser,
    #[error("Minutes must be a positive whole number (got `{0}`).")]
    InvalidMinutes(String),
}

pub fn require_query(raw: &str) -> Result<String, ValidationError> {
    let query = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        Err(ValidationError::EmptyQuery)
    } else {
        Ok(query)
    }
}

fn split_first(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(match raw.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (raw, ""),
    })
}

pub fn parse_cache_days(raw: &str) -> Result<CacheDays, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(CacheDays::new)
        .ok_or_else(|| ValidationError::InvalidDays(raw.trim().to_string()))
}

/// `<days> <query>` for the cache command. Days are checked before the query.
pub fn parse_cache_args(raw: &str) -> Result<(CacheDays, String), ValidationError> {
    let (days, rest) = split_first(raw).ok_or(ValidationError::MissingDays)?;
    let days = parse_cache_days(days)?;
    Ok((days, require_query(rest)?))
}

pub fn parse_username(raw: &str) -> Result<String, ValidationError> {
    split_first(raw)
        .map(|(user, _)| user.to_string())
        .ok_or(ValidationError::MissingUser)
}

/// `<username> <minutes>` for the block command.
pub fn parse_block_args(raw: &str) -> Result<(String, u32), ValidationError> {
    let (user, rest) = split_first(raw).ok_or(ValidationError::MissingUser)?;
    let minutes = rest
        .parse::<u32>()
        .ok()
        .filter(|m| *m > 0)
        .ok_or_else(|| ValidationError::InvalidMinutes(rest.to_string()))?;
    Ok((user.to_string(), minutes))
}
