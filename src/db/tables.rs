//! Record type to table registration.
//!
//! Applications register each record type once at configuration time; the
//! mapper resolves table names from this map instead of inspecting types at
//! runtime.

use std::any::{TypeId, type_name};
use std::collections::HashMap;

/// Table metadata for one registered record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMap {
    pub table_name: String,
    /// Full Rust path of the record type.
    pub type_name: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<TypeId, TableMap>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_table_with_name`](Self::add_table_with_name).
    pub fn with_table<T: 'static>(mut self, table_name: impl Into<String>) -> Self {
        self.add_table_with_name::<T>(table_name);
        self
    }

    /// Register `T` under an explicit table name. Re-registering replaces.
    pub fn add_table_with_name<T: 'static>(&mut self, table_name: impl Into<String>) -> &TableMap {
        let entry = TableMap {
            table_name: table_name.into(),
            type_name: type_name::<T>(),
        };
        self.tables.insert(TypeId::of::<T>(), entry);
        &self.tables[&TypeId::of::<T>()]
    }

    /// Register `T` under its bare type name.
    pub fn add_table<T: 'static>(&mut self) -> &TableMap {
        self.add_table_with_name::<T>(bare_type_name::<T>())
    }

    pub fn table_for<T: 'static>(&self) -> Option<&TableMap> {
        self.tables.get(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Last path segment of a type's name with generic arguments removed.
///
/// `my_app::models::User` becomes `User`, `Wrapper<my_app::X>` becomes `Wrapper`.
pub fn bare_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
