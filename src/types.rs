//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based identity of one accepted connection
//! - `DisplayName`: a validated, non-empty printable-ASCII name
//!
//! and the line validation shared by naming and chat input.

use uuid::Uuid;

use crate::error::LineError;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4; one is minted per accepted connection and used as the
/// registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name chosen once at admission
///
/// Only constructed from text that passed `validate_line`, so it is
/// always non-empty printable ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    /// Validate raw input as a name
    ///
    /// Returns `Ok(None)` for blank input (the caller re-prompts).
    pub fn parse(raw: &[u8]) -> Result<Option<Self>, LineError> {
        Ok(validate_line(raw)?.map(Self))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check whether every byte is printable ASCII (32..=126)
pub fn is_printable_ascii(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (32..=126).contains(b))
}

/// Trim surrounding ASCII whitespace and validate one inbound line
///
/// - blank after trimming: `Ok(None)`
/// - any byte outside 32..=126: `Err(InvalidCharacters)`
/// - otherwise the trimmed text
pub fn validate_line(raw: &[u8]) -> Result<Option<String>, LineError> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !is_printable_ascii(trimmed) {
        return Err(LineError::InvalidCharacters);
    }
    // Printable ASCII is always valid UTF-8
    Ok(Some(String::from_utf8_lossy(trimmed).into_owned()))
}
