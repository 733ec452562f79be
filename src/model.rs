use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::sql_types::Text;
use serde::Deserialize;
use std::fmt;

/// Identifier of the one record this service ever touches
pub const COUNTER_ID: &str = "count";

/// The persisted visitor count, as returned by the increment statement
#[derive(Clone, Debug, PartialEq, Eq, QueryableByName)]
pub struct CounterRecord {
    #[diesel(sql_type = Text)]
    pub id: String,
    #[diesel(sql_type = BigInt)]
    pub visitor_count: i64,
}

/// Name of the table holding the counter record.
///
/// The table is addressed by a configured name, so it gets spliced into SQL
/// text rather than bound as a parameter. Construction only accepts plain
/// identifiers, which keeps the quoted form safe to interpolate.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TableName(String);

#[derive(Debug, thiserror::Error)]
#[error(
    "invalid table name {0:?}: expected 1 to 63 ASCII letters, digits or \
     underscores, not starting with a digit"
)]
pub struct InvalidTableName(String);

impl TableName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as a quoted SQL identifier
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for TableName {
    fn default() -> Self {
        TableName(String::from("visitors"))
    }
}

impl TryFrom<String> for TableName {
    type Error = InvalidTableName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let valid = match chars.next() {
            Some(first) => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && value.len() <= 63
            }
            None => false,
        };
        if valid {
            Ok(TableName(value))
        } else {
            Err(InvalidTableName(value))
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
