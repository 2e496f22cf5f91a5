//! SQL dialect rules needed by the mapper: identifier quoting and string
//! concatenation.
//!
//! Table name case is not portable. MySQL folds table names to lower case
//! when `lower_case_table_names` is set, which is the default on Windows
//! hosts; PostgreSQL folds unquoted identifiers to lower case everywhere.

use crate::models::BackendKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql {
        engine: String,
        encoding: String,
        /// Mirrors the server's `lower_case_table_names` setting.
        lower_case_table_names: bool,
    },
    Postgres,
}

impl Dialect {
    /// Dialect for a backend kind with host defaults.
    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Sqlite => Dialect::Sqlite,
            BackendKind::MySql => Dialect::mysql(),
            BackendKind::Postgres => Dialect::Postgres,
        }
    }

    /// MySQL dialect with InnoDB/UTF8 defaults and the host OS case rule.
    pub fn mysql() -> Self {
        Dialect::MySql {
            engine: "InnoDB".to_string(),
            encoding: "UTF8".to_string(),
            lower_case_table_names: cfg!(windows),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Dialect::Sqlite => BackendKind::Sqlite,
            Dialect::MySql { .. } => BackendKind::MySql,
            Dialect::Postgres => BackendKind::Postgres,
        }
    }

    /// Quote an identifier (table or column name).
    pub fn quote_field(&self, field: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", field.replace('"', "\"\"")),
            Dialect::Postgres => format!("\"{}\"", field.to_lowercase().replace('"', "\"\"")),
            Dialect::MySql {
                lower_case_table_names,
                ..
            } => {
                let name = if *lower_case_table_names {
                    field.to_lowercase()
                } else {
                    field.to_string()
                };
                format!("`{}`", name.replace('`', "``"))
            }
        }
    }

    /// Concatenate SQL expressions.
    pub fn concat(&self, args: &[&str]) -> String {
        match self {
            Dialect::MySql { .. } => format!("CONCAT({})", args.join(", ")),
            Dialect::Sqlite | Dialect::Postgres => args.join(" || "),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::MySql {
                engine, encoding, ..
            } => write!(f, "MySQL ({}, {})", engine, encoding),
            other => write!(f, "{}", other.kind()),
        }
    }
}
