use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::db::StorageError;
use crate::value::{Row, Value};

/// Column-oriented value sets for one batched write.
///
/// Each column key maps to the full list of values for that column; the i-th
/// element across all lists forms one logical row. Every list in one write
/// must have the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySet {
    columns: BTreeMap<String, Vec<Value>>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to a column's list.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns
            .entry(column.into())
            .or_default()
            .push(value.into());
    }

    /// Replace a column's whole value list.
    pub fn set_list(&mut self, column: impl Into<String>, values: Vec<Value>) {
        self.columns.insert(column.into(), values);
    }

    /// Append every column of `row`, forming the next logical row. Columns
    /// the row does not carry receive `Null` so the lists stay aligned; the
    /// `columns` slice fixes which columns participate.
    pub fn push_row(&mut self, columns: &[&str], row: &Row) {
        for column in columns {
            let value = row.get(column).cloned().unwrap_or(Value::Null);
            self.push(*column, value);
        }
    }

    pub fn get(&self, column: &str) -> Option<&[Value]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of logical rows, or `None` when the value lists disagree.
    pub fn row_count(&self) -> Option<usize> {
        let mut lengths = self.columns.values().map(Vec::len);
        let first = lengths.next().unwrap_or(0);
        lengths.all(|len| len == first).then_some(first)
    }
}

/// How a batched write maps onto SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode<'a> {
    /// `INSERT INTO ...`; an existing row with the same primary key is an
    /// error.
    Insert,
    /// `INSERT OR REPLACE INTO ...`, the usual mode for cache refreshes.
    InsertOrReplace,
    /// `UPDATE ... SET ... WHERE primary_key = ?`. The entry set must carry
    /// the primary-key column; any subset of the remaining declared columns
    /// may be updated.
    Update { primary_key: &'a str },
    /// `DELETE ... WHERE column = ?`. The entry set must carry exactly the
    /// match column and its target values.
    Delete,
}

/// A validated write: the statement text plus the per-column value lists in
/// bind order. One prepared statement, one execution per logical row.
pub(crate) struct BatchPlan<'a> {
    pub sql: String,
    pub bind_lists: Vec<&'a [Value]>,
    pub rows: usize,
}

/// Validate preconditions and build the statement for one batched write.
/// `Ok(None)` means there is nothing to write, which is not an error.
pub(crate) fn plan_write<'a>(
    table: &str,
    keys: &[&str],
    entries: &'a EntrySet,
    mode: WriteMode<'_>,
) -> Result<Option<BatchPlan<'a>>, StorageError> {
    if entries.is_empty() {
        return Ok(None);
    }
    let rows = entries
        .row_count()
        .ok_or(StorageError::MalformedBatch("column value lists have unequal lengths"))?;
    if rows == 0 {
        return Ok(None);
    }

    let plan = match mode {
        WriteMode::Insert | WriteMode::InsertOrReplace => {
            let mut bind_lists = Vec::with_capacity(keys.len());
            for key in keys {
                let list = entries.get(key).ok_or(StorageError::MalformedBatch(
                    "insert requires a value list for every declared column",
                ))?;
                bind_lists.push(list);
            }
            let mut sql = String::from(match mode {
                WriteMode::InsertOrReplace => "INSERT OR REPLACE INTO ",
                _ => "INSERT INTO ",
            });
            sql.push_str(table);
            sql.push_str(" (");
            sql.push_str(&keys.join(", "));
            sql.push_str(") VALUES (");
            for index in 1..=keys.len() {
                if index > 1 {
                    sql.push_str(", ");
                }
                let _ = write!(sql, "?{index}");
            }
            sql.push(')');
            BatchPlan { sql, bind_lists, rows }
        }
        WriteMode::Update { primary_key } => {
            let key_list = entries.get(primary_key).ok_or(StorageError::MalformedBatch(
                "update requires the primary-key column",
            ))?;
            let set_columns: Vec<&str> = keys
                .iter()
                .copied()
                .filter(|key| *key != primary_key && entries.contains(key))
                .collect();
            if set_columns.is_empty() {
                return Err(StorageError::MalformedBatch(
                    "update requires at least one non-key column",
                ));
            }
            let mut sql = String::from("UPDATE ");
            sql.push_str(table);
            sql.push_str(" SET ");
            let mut bind_lists = Vec::with_capacity(set_columns.len() + 1);
            for (index, column) in set_columns.iter().enumerate() {
                if index > 0 {
                    sql.push_str(", ");
                }
                let _ = write!(sql, "{column} = ?{}", index + 1);
                bind_lists.push(entries.get(column).unwrap_or(&[]));
            }
            let _ = write!(sql, " WHERE {primary_key} = ?{}", set_columns.len() + 1);
            bind_lists.push(key_list);
            BatchPlan { sql, bind_lists, rows }
        }
        WriteMode::Delete => {
            if entries.column_count() != 1 {
                return Err(StorageError::MalformedBatch(
                    "delete takes exactly one match column",
                ));
            }
            let column = entries
                .column_names()
                .next()
                .ok_or(StorageError::MalformedBatch("delete takes exactly one match column"))?;
            let list = entries.get(column).unwrap_or(&[]);
            let sql = format!("DELETE FROM {table} WHERE {column} = ?1");
            BatchPlan {
                sql,
                bind_lists: vec![list],
                rows,
            }
        }
    };
    Ok(Some(plan))
}
