use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Scalar value persisted by the cache.
///
/// Cached social data is flat: identifiers, text, timestamps, and flags.
/// Booleans are persisted as integers (0/1) and therefore read back as
/// [`Value::Integer`]; `REAL` and `BLOB` columns are not part of the cache
/// schema contract and fail conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Boolean(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            Value::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Boolean(value) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*value)))
            }
            Value::Integer(value) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value)),
            Value::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(value) => Ok(Value::Integer(value)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| Value::Text(text.to_string()))
                .map_err(|err| FromSqlError::Other(Box::new(err))),
            ValueRef::Real(_) | ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// Ordered column-name → value mapping.
///
/// The pre-write shape produced by sync adapters and the post-read shape
/// returned by [`crate::Database::query_rows`]. Setting a column that is
/// already present replaces its value in place, preserving column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == column) {
            entry.1 = value;
        } else {
            self.entries.push((column, value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn set_replaces_in_place() {
        let mut row = Row::new();
        row.set("id", "post-1");
        row.set("favorited", false);
        row.set("favorited", true);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("favorited"), Some(&Value::Boolean(true)));
        let columns: Vec<_> = row.columns().collect();
        assert_eq!(columns, vec!["id", "favorited"]);
    }

    #[test]
    fn accessors_bridge_the_boolean_integer_duality() {
        assert_eq!(Value::Boolean(true).as_integer(), Some(1));
        assert_eq!(Value::Integer(0).as_boolean(), Some(false));
        assert_eq!(Value::Integer(3).as_boolean(), Some(true));
        assert_eq!(Value::Text("x".into()).as_text(), Some("x"));
        assert_eq!(Value::Text("x".into()).as_integer(), None);
        assert!(Value::Null.is_null());
    }

    #[test]
    fn values_bind_and_read_back() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (a TEXT, b INTEGER, c INTEGER, d TEXT)")
            .expect("ddl");
        conn.execute(
            "INSERT INTO t (a, b, c, d) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                Value::Text("hello".to_string()),
                Value::Integer(42),
                Value::Boolean(true),
                Value::Null,
            ],
        )
        .expect("insert");

        let (a, b, c, d) = conn
            .query_row("SELECT a, b, c, d FROM t", [], |row| {
                Ok((
                    row.get::<_, Value>(0)?,
                    row.get::<_, Value>(1)?,
                    row.get::<_, Value>(2)?,
                    row.get::<_, Value>(3)?,
                ))
            })
            .expect("select");
        assert_eq!(a, Value::Text("hello".to_string()));
        assert_eq!(b, Value::Integer(42));
        // Booleans are stored as integers; the type does not round-trip.
        assert_eq!(c, Value::Integer(1));
        assert_eq!(d, Value::Null);
    }

    #[test]
    fn serializes_as_plain_json_scalars() {
        let mut row = Row::new();
        row.set("id", "evt-9");
        row.set("all_day", false);
        row.set("start", 1_700_000_000_i64);
        row.set("location", Value::Null);
        let json = serde_json::to_value(&row).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "entries": [["id", "evt-9"], ["all_day", false], ["start", 1_700_000_000_i64], ["location", null]]
            })
        );
    }
}
