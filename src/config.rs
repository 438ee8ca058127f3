//! Connection parameters handed to the driver.
//!
//! Precedence when loading: explicit path > `DOCVERB_CONFIG` > `<config dir>/docverb.toml` >
//! `./docverb.toml` > defaults, then `DOCVERB_*` environment overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::errors::DbError;
use crate::types::ReadPreference;

pub const DEFAULT_HOST: &str = "localhost:27017";
pub const CONFIG_FILE_NAME: &str = "docverb.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Logical database selected on the client.
    pub name: String,
    pub hosts: Vec<String>,
    pub replica_set: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect eagerly when the client is built.
    pub connect: bool,
    pub read_preference: ReadPreference,
    pub read_preference_tags: Vec<BTreeMap<String, String>>,
    pub secondary_acceptable_latency_ms: u64,
    pub connect_timeout_ms: u64,
    pub socket_timeout_ms: u64,
    /// Raw transport context (TLS material, socket tuning), passed through untouched.
    pub socket_context: toml::Table,
    /// Extra client options: authMechanism, authSource, ssl, w, wTimeoutMS, journal, fsync...
    pub options: toml::Table,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: "test".into(),
            hosts: vec![DEFAULT_HOST.into()],
            replica_set: None,
            username: None,
            password: None,
            connect: false,
            read_preference: ReadPreference::Nearest,
            read_preference_tags: Vec::new(),
            secondary_acceptable_latency_ms: 15,
            connect_timeout_ms: 60_000,
            socket_timeout_ms: 30_000,
            socket_context: toml::Table::new(),
            options: toml::Table::new(),
        }
    }
}

impl ConnectionConfig {
    /// Parse a TOML document; missing keys take their defaults.
    ///
    /// # Errors
    /// Returns `DbError::Toml` for malformed input.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str::<Self>(s)?)
    }

    /// Resolve, parse, override from the environment and validate.
    ///
    /// # Errors
    /// Returns an error when an explicit path cannot be read, a file does not parse, or the
    /// resulting configuration fails validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        let mut cfg = match explicit {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(p)?)?,
            None => match find_config_paths().into_iter().find(|p| p.exists()) {
                Some(p) => {
                    log::debug!("loading connection config from {}", p.display());
                    Self::from_toml_str(&std::fs::read_to_string(&p)?)?
                }
                None => Self::default(),
            },
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `DOCVERB_DB`, `DOCVERB_HOSTS`, `DOCVERB_REPLICA_SET` and `DOCVERB_READ_PREFERENCE`.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for an unknown read preference.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("DOCVERB_DB") {
            self.name = db;
        }
        if let Some(hosts) = lookup("DOCVERB_HOSTS") {
            self.hosts = hosts.split(',').map(|h| h.trim().to_string()).collect();
        }
        if let Some(rs) = lookup("DOCVERB_REPLICA_SET") {
            self.replica_set = Some(rs);
        }
        if let Some(rp) = lookup("DOCVERB_READ_PREFERENCE") {
            self.read_preference = rp.parse()?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns `DbError::Config` naming the first offending parameter.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.name.is_empty() || self.name.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(DbError::Config(format!("invalid database name '{}'", self.name)));
        }
        if self.hosts.is_empty() || self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(DbError::Config("at least one non-blank host is required".into()));
        }
        if self.connect_timeout_ms == 0 || self.socket_timeout_ms == 0 {
            return Err(DbError::Config("connect/socket timeouts must be positive".into()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(DbError::Config("password given without username".into()));
        }
        if self.read_preference == ReadPreference::Primary && !self.read_preference_tags.is_empty() {
            return Err(DbError::Config("read preference tags cannot be combined with primary".into()));
        }
        Ok(())
    }

    /// `mongodb://host1,host2` with whitespace removed from the host list.
    #[must_use]
    pub fn connection_uri(&self) -> String {
        let hosts = self.hosts.join(",").replace(' ', "");
        format!("mongodb://{hosts}")
    }

    /// Options document for the client; explicit settings win over `options` entries, except
    /// `db`, which `options` may override.
    #[must_use]
    pub fn client_options(&self) -> Document {
        let mut out = table_to_document(&self.options);
        if !out.contains_key("db") {
            out.insert("db", self.name.clone());
        }
        if let Some(u) = &self.username {
            out.insert("username", u.clone());
        }
        if let Some(p) = &self.password {
            out.insert("password", p.clone());
        }
        if let Some(rs) = &self.replica_set {
            out.insert("replicaSet", rs.clone());
        }
        out.insert("connect", self.connect);
        out.insert("connectTimeoutMS", clamp_ms(self.connect_timeout_ms));
        out.insert("socketTimeoutMS", clamp_ms(self.socket_timeout_ms));
        out.insert("secondaryAcceptableLatencyMS", clamp_ms(self.secondary_acceptable_latency_ms));
        out
    }

    #[must_use]
    pub fn read_preference_tag_documents(&self) -> Vec<Document> {
        self.read_preference_tags
            .iter()
            .map(|set| set.iter().map(|(k, v)| (k.clone(), Bson::String(v.clone()))).collect())
            .collect()
    }

    #[must_use]
    pub fn socket_context_document(&self) -> Document {
        table_to_document(&self.socket_context)
    }
}

fn clamp_ms(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn find_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(p) = std::env::var("DOCVERB_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE_NAME));
    }
    paths
}

fn table_to_document(table: &toml::Table) -> Document {
    table.iter().map(|(k, v)| (k.clone(), toml_to_bson(v))).collect()
}

fn toml_to_bson(v: &toml::Value) -> Bson {
    match v {
        toml::Value::String(s) => Bson::String(s.clone()),
        toml::Value::Integer(i) => Bson::Int64(*i),
        toml::Value::Float(f) => Bson::Double(*f),
        toml::Value::Boolean(b) => Bson::Boolean(*b),
        toml::Value::Datetime(d) => Bson::String(d.to_string()),
        toml::Value::Array(a) => Bson::Array(a.iter().map(toml_to_bson).collect()),
        toml::Value::Table(t) => Bson::Document(table_to_document(t)),
    }
}
