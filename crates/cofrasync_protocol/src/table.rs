//! Table names and dependency declarations.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

const MAX_TABLE_NAME_LEN: usize = 64;

/// Validated table name.
///
/// Names start with an ASCII lowercase letter and contain only lowercase
/// letters, digits and `_`, at most 64 bytes. They appear in URLs, journal
/// entries and CLI output unescaped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Validates and wraps `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidTableName`] describing the first rule
    /// the name breaks.
    pub fn new(name: impl Into<String>) -> ProtocolResult<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.len() > MAX_TABLE_NAME_LEN {
            Some("longer than 64 bytes")
        } else if !name.as_bytes()[0].is_ascii_lowercase() {
            Some("must start with a lowercase letter")
        } else if !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            Some("only lowercase letters, digits and '_' are allowed")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ProtocolError::InvalidTableName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TableName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TableName {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for TableName {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

/// A table and the tables its records reference.
///
/// A dependency means "records of `name` hold ids of records in
/// `depends_on`", so the referenced tables must be applied first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: TableName,
    /// Referenced tables.
    pub depends_on: Vec<TableName>,
}

impl TableSpec {
    /// A table without references.
    #[must_use]
    pub fn new(name: TableName) -> Self {
        Self {
            name,
            depends_on: Vec::new(),
        }
    }

    /// Adds a referenced table.
    #[must_use]
    pub fn depends_on(mut self, table: TableName) -> Self {
        if !self.depends_on.contains(&table) {
            self.depends_on.push(table);
        }
        self
    }
}
