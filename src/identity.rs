//! Endpoint identifiers (chat nicknames).
//!
//! A nickname becomes part of a filesystem path and of a shared-memory object
//! name, so it is validated once at the edge and carried as [`EndpointId`]
//! afterwards.

use std::fmt::{Display, Formatter};

use crate::errors::IdentifierIssue;
use crate::{AppError, Result};

/// Maximum nickname length in bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 30;

/// Characters that may not appear in a nickname.
pub const FORBIDDEN_CHARS: [char; 4] = ['/', '[', ']', '-'];

/// A validated nickname.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    /// Validate `raw` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidIdentifier` with [`IdentifierIssue::TooLong`]
    /// for names over [`MAX_IDENTIFIER_BYTES`], or
    /// [`IdentifierIssue::Forbidden`] for empty names, `.`, `..`, and names
    /// containing any of [`FORBIDDEN_CHARS`].
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() > MAX_IDENTIFIER_BYTES {
            return Err(AppError::InvalidIdentifier(
                IdentifierIssue::TooLong,
                format!("'{raw}' exceeds {MAX_IDENTIFIER_BYTES} bytes"),
            ));
        }

        if raw.is_empty() || raw == "." || raw == ".." {
            return Err(AppError::InvalidIdentifier(
                IdentifierIssue::Forbidden,
                format!("'{raw}' is not a usable nickname"),
            ));
        }

        if let Some(ch) = raw.chars().find(|ch| FORBIDDEN_CHARS.contains(ch)) {
            return Err(AppError::InvalidIdentifier(
                IdentifierIssue::Forbidden,
                format!("'{raw}' contains forbidden character '{ch}'"),
            ));
        }

        Ok(Self(raw.to_owned()))
    }

    /// Borrow the nickname.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EndpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EndpointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
