//! Host descriptor models.
//!
//! A host descriptor names one SQL backend: its kind, credentials, network
//! address or file name, and a free-form parameter bag. Descriptors are loaded
//! once from JSON and never mutated afterwards.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Supported backend kinds.
///
/// Host files carry the kind as its tag (`sqlite3`, `mysql`, `postgres`);
/// parsing goes through [`FromStr`], so aliases and the unknown-kind error are
/// the same for files and code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum BackendKind {
    /// Embedded file store.
    Sqlite,
    /// Networked server. Includes MariaDB
    MySql,
    /// Networked server.
    Postgres,
}

impl BackendKind {
    /// True for backends that live in a local file rather than behind a server.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Sqlite)
    }

    /// Get the display name for this backend kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }

    /// The tag used in host descriptor files.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite3",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// URL scheme understood by the driver.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Get the default port for this backend kind.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for BackendKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite3" | "sqlite" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(DbError::configuration(
                format!("sql host type {:?} unknown", other),
                "Supported backend types are sqlite3, mysql and postgres",
            )),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = DbError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        tag.parse()
    }
}

impl From<BackendKind> for &'static str {
    fn from(kind: BackendKind) -> Self {
        kind.tag()
    }
}

/// Connection parameters for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlHost {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub host: String,
    /// Accepts a number or a numeric string. Falls back to the kind's default port.
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    /// Database name; for embedded backends the file name without `.sqlite`.
    pub db_name: String,
    /// Driver parameters, serialized into the connection string in key order.
    #[serde(default)]
    pub connection_params: BTreeMap<String, String>,
    /// Embedded backends only: create the file when no candidate path opens.
    #[serde(default)]
    pub create_if_missing: bool,
}

impl SqlHost {
    /// Descriptor for an embedded file store.
    pub fn sqlite(db_name: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::Sqlite,
            user: String::new(),
            host: String::new(),
            port: None,
            db_name: db_name.into(),
            connection_params: BTreeMap::new(),
            create_if_missing: false,
        }
    }

    /// Descriptor for a networked server.
    pub fn networked(
        kind: BackendKind,
        user: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        db_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            user: user.into(),
            host: host.into(),
            port,
            db_name: db_name.into(),
            connection_params: BTreeMap::new(),
            create_if_missing: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connection_params.insert(key.into(), value.into());
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Port to dial: explicit port, else the kind's default.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or_else(|| self.kind.default_port())
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match Option::<PortRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortRepr::Number(port)) => Ok(Some(port)),
        Some(PortRepr::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(PortRepr::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port {:?}", text))),
    }
}

/// Named collection of host descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlHosts {
    hosts: BTreeMap<String, SqlHost>,
}

impl SqlHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, key: impl Into<String>, host: SqlHost) -> Self {
        self.insert(key, host);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, host: SqlHost) {
        self.hosts.insert(key.into(), host);
    }

    /// Look up a descriptor by selection key.
    pub fn get(&self, key: &str) -> DbResult<&SqlHost> {
        if self.hosts.is_empty() {
            return Err(DbError::configuration(
                "No host descriptors configured",
                "Load a host descriptor file before initializing datasources",
            ));
        }
        self.hosts.get(key).ok_or_else(|| {
            DbError::configuration(
                format!("No host descriptor named '{}'", key),
                format!(
                    "Known keys: {}",
                    self.hosts.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            )
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Parse a JSON object of `key -> descriptor`.
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON host descriptor file.
    pub fn from_path(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DbError::configuration(
                format!("Cannot read host file {}: {}", path.display(), e),
                "Check the --hosts path",
            )
        })?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("sqlite3".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("mysql".parse::<BackendKind>().unwrap(), BackendKind::MySql);
        assert_eq!("mariadb".parse::<BackendKind>().unwrap(), BackendKind::MySql);
        assert_eq!(
            "postgresql".parse::<BackendKind>().unwrap(),
            BackendKind::Postgres
        );
        assert!(matches!(
            "oracle".parse::<BackendKind>(),
            Err(DbError::Configuration { .. })
        ));
    }

    #[test]
    fn test_backend_kind_embedded() {
        assert!(BackendKind::Sqlite.is_embedded());
        assert!(!BackendKind::MySql.is_embedded());
        assert_eq!(BackendKind::MySql.default_port(), Some(3306));
        assert_eq!(BackendKind::Sqlite.default_port(), None);
    }

    #[test]
    fn test_parse_host_file() {
        let hosts = SqlHosts::from_json_str(
            r#"{
                "dsn1": { "type": "sqlite3", "db_name": "main" },
                "dsn2": {
                    "type": "mysql",
                    "user": "app",
                    "host": "db.internal",
                    "port": "3307",
                    "db_name": "exchange",
                    "connection_params": { "charset": "utf8mb4", "ssl-mode": "required" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(hosts.len(), 2);
        let sqlite = hosts.get("dsn1").unwrap();
        assert_eq!(sqlite.kind, BackendKind::Sqlite);
        assert_eq!(sqlite.db_name, "main");
        assert!(!sqlite.create_if_missing);

        let mysql = hosts.get("dsn2").unwrap();
        assert_eq!(mysql.kind, BackendKind::MySql);
        assert_eq!(mysql.port, Some(3307));
        assert_eq!(mysql.connection_params.len(), 2);
    }

    #[test]
    fn test_port_defaults_per_kind() {
        let hosts = SqlHosts::from_json_str(
            r#"{ "pg": { "type": "postgres", "host": "h", "port": "", "db_name": "d" } }"#,
        )
        .unwrap();
        let pg = hosts.get("pg").unwrap();
        assert_eq!(pg.port, None);
        assert_eq!(pg.port_or_default(), Some(5432));
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = SqlHosts::from_json_str(r#"{ "x": { "type": "oracle", "db_name": "d" } }"#)
            .unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(err.to_string().contains("sql host type \"oracle\" unknown"));
    }

    #[test]
    fn test_kind_aliases_in_host_file() {
        let hosts = SqlHosts::from_json_str(
            r#"{
                "a": { "type": "SQLite", "db_name": "main" },
                "b": { "type": "mariadb", "host": "h", "db_name": "d" },
                "c": { "type": "postgresql", "host": "h", "db_name": "d" }
            }"#,
        )
        .unwrap();
        assert_eq!(hosts.get("a").unwrap().kind, BackendKind::Sqlite);
        assert_eq!(hosts.get("b").unwrap().kind, BackendKind::MySql);
        assert_eq!(hosts.get("c").unwrap().kind, BackendKind::Postgres);
    }

    #[test]
    fn test_kind_serializes_as_tag() {
        let json = serde_json::to_string(&SqlHost::sqlite("main")).unwrap();
        assert!(json.contains(r#""type":"sqlite3""#));
        let back: SqlHost = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, BackendKind::Sqlite);
    }

    #[test]
    fn test_malformed_json_gets_generic_suggestion() {
        let err = SqlHosts::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(!err.suggestion().unwrap().contains("backend types"));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let hosts = SqlHosts::new().with_host("dsn1", SqlHost::sqlite("main"));
        let err = hosts.get("dsn9").unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(err.suggestion().unwrap().contains("dsn1"));
    }

    #[test]
    fn test_empty_hosts_rejected() {
        let hosts = SqlHosts::new();
        assert!(matches!(
            hosts.get("dsn1"),
            Err(DbError::Configuration { .. })
        ));
    }
}
