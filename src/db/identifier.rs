// ABOUTME: Allow-list validation and bracket quoting for SQL Server identifiers
// ABOUTME: Every database or table name passes through here before it is spliced into SQL

use thiserror::Error;

/// SQL Server's sysname limit
pub const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier '{0}' is longer than 128 characters")]
    TooLong(String),
    #[error("identifier '{name}' contains disallowed character {found:?}")]
    DisallowedCharacter { name: String, found: char },
    #[error("identifier '{0}' has leading or trailing whitespace")]
    Whitespace(String),
}

/// Check a database or table name against the allow-list.
///
/// Letters and digits (any script), `_`, `@`, `#`, `$`, `-`, `.` and inner
/// spaces are accepted. Quotes, brackets, `;`, comment markers and control
/// characters are not. A `.` is literal once the name is bracket-quoted.
pub fn validate(name: &str) -> Result<&str, IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong(name.to_string()));
    }
    if name.trim() != name {
        return Err(IdentifierError::Whitespace(name.to_string()));
    }
    if let Some(found) = name.chars().find(|c| !is_allowed(*c)) {
        return Err(IdentifierError::DisallowedCharacter {
            name: name.to_string(),
            found,
        });
    }
    // "--" starts a comment even inside an otherwise clean name
    if name.contains("--") {
        return Err(IdentifierError::DisallowedCharacter {
            name: name.to_string(),
            found: '-',
        });
    }
    Ok(name)
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$' | '-' | '.' | ' ')
}

/// Wrap a name in brackets, doubling any closing bracket.
///
/// Validated names never contain `]`; the escaping covers names that come
/// back from the server itself (column names used for ordering).
pub fn quote(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
