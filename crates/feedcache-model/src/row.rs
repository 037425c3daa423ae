use feedcache_storage::{Row, Value};

/// Integer display role, the post-read addressing scheme a list view uses.
pub type Role = u32;

/// Role carrying the stable identity key of a row.
pub const KEY_ROLE: Role = 0;

/// One visible item: an ordered role → value mapping.
///
/// Identity lives at [`KEY_ROLE`]; it must be unique within a model's row
/// set and stable across refreshes for the same logical entity, since the
/// diff synchronizer matches rows by it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelRow {
    entries: Vec<(Role, Value)>,
}

impl ModelRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a role's value, keeping entries sorted by role.
    pub fn set(&mut self, role: Role, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.binary_search_by_key(&role, |(r, _)| *r) {
            Ok(index) => self.entries[index].1 = value,
            Err(index) => self.entries.insert(index, (role, value)),
        }
    }

    pub fn get(&self, role: Role) -> Option<&Value> {
        self.entries
            .binary_search_by_key(&role, |(r, _)| *r)
            .ok()
            .map(|index| &self.entries[index].1)
    }

    /// The identity value at [`KEY_ROLE`], if present.
    pub fn key(&self) -> Option<&Value> {
        self.get(KEY_ROLE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &Value)> {
        self.entries.iter().map(|(role, value)| (*role, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Column → role remapping applied to rows coming back from a read.
///
/// Built once per model; the first mapping conventionally assigns the
/// identity column to [`KEY_ROLE`].
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    entries: Vec<(String, Role)>,
}

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, column: impl Into<String>, role: Role) -> Self {
        self.entries.push((column.into(), role));
        self
    }

    /// Remap a storage row into a display row. Columns absent from the row
    /// come through as `Null` so every row exposes the same roles.
    pub fn remap(&self, row: &Row) -> ModelRow {
        let mut out = ModelRow::new();
        for (column, role) in &self.entries {
            let value = row.get(column).cloned().unwrap_or(Value::Null);
            out.set(*role, value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_stay_sorted_and_replace_in_place() {
        let mut row = ModelRow::new();
        row.set(3, "body");
        row.set(KEY_ROLE, "post-1");
        row.set(3, "edited body");
        let roles: Vec<Role> = row.iter().map(|(role, _)| role).collect();
        assert_eq!(roles, vec![0, 3]);
        assert_eq!(row.get(3), Some(&Value::Text("edited body".into())));
        assert_eq!(row.key(), Some(&Value::Text("post-1".into())));
    }

    #[test]
    fn remap_fills_missing_columns_with_null() {
        let mut storage_row = Row::new();
        storage_row.set("id", "post-1");
        storage_row.set("title", "hello");

        let roles = RoleMap::new()
            .map("id", KEY_ROLE)
            .map("title", 1)
            .map("thumbnail", 2);
        let model_row = roles.remap(&storage_row);
        assert_eq!(model_row.key(), Some(&Value::Text("post-1".into())));
        assert_eq!(model_row.get(1), Some(&Value::Text("hello".into())));
        assert_eq!(model_row.get(2), Some(&Value::Null));
    }
}
