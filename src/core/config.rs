//! Key/value configuration
//!
//! Settings are read from an ordered list of [`ConfigSource`]s; the first
//! source that knows a key wins. Typed readers never fail: a missing or
//! unparsable value falls back to the caller's default and the bad value is
//! logged.

use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use chrono::{Local, NaiveDateTime};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// A source of configuration values
pub trait ConfigSource: Send + Sync {
    /// Raw value for `key`, `None` when the source does not define it
    fn value(&self, key: &str) -> Option<String>;

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

/// Environment variables, `PREFIX_KEY` with the key upper-cased and
/// non-alphanumeric characters replaced by `_`
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for `key`
    pub fn variable_name(&self, key: &str) -> String {
        let key: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}_{}", self.prefix.to_ascii_uppercase(), key)
        }
    }
}

impl ConfigSource for EnvSource {
    fn value(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }

    fn describe(&self) -> String {
        format!("environment ({}_*)", self.prefix)
    }
}

/// In-memory values
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MapSource {
    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn describe(&self) -> String {
        format!("map ({} keys)", self.values.len())
    }
}

/// A JSON document; nested objects are addressed with dotted keys
/// (`connectionStrings.SCANP.providerName`)
#[derive(Debug, Clone, Default)]
pub struct JsonFileSource {
    origin: String,
    values: HashMap<String, String>,
}

impl JsonFileSource {
    /// Load `path`. An unreadable or malformed file is a `Config` error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DatabaseError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut source = Self::parse(&text)?;
        source.origin = path.display().to_string();
        debug!(path = %path.display(), keys = source.values.len(), "configuration file loaded");
        Ok(source)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let document: JsonValue = serde_json::from_str(text)
            .map_err(|e| DatabaseError::config(format!("invalid configuration JSON: {}", e)))?;
        let mut values = HashMap::new();
        flatten(None, &document, &mut values);
        Ok(Self {
            origin: "json".to_string(),
            values,
        })
    }
}

fn flatten(prefix: Option<&str>, value: &JsonValue, out: &mut HashMap<String, String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let path = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, key),
                    None => key.clone(),
                };
                flatten(Some(&path), child, out);
            }
        }
        JsonValue::Null => {}
        JsonValue::String(s) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), s.clone());
            }
        }
        other => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), other.to_string());
            }
        }
    }
}

impl ConfigSource for JsonFileSource {
    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

/// Provider and connection string of a named connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub provider_name: String,
    pub connection_string: String,
}

/// Layered configuration reader
#[derive(Default)]
pub struct Settings {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source consulted after the existing ones
    #[must_use]
    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn add_source(&mut self, source: impl ConfigSource + 'static) {
        self.sources.push(Box::new(source));
    }

    /// Raw value, `None` when no source defines `key`
    pub fn value(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|s| s.value(key))
    }

    /// Value with surrounding whitespace removed, `None` when blank
    fn trimmed(&self, key: &str) -> Option<String> {
        self.value(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn read_string(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_string())
    }

    /// `true`/`false` in any case; anything else yields `default`
    pub fn read_bool(&self, key: &str, default: bool) -> bool {
        match self.trimmed(key) {
            None => default,
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            Some(v) => {
                warn!(key, value = %v, "invalid boolean setting, using default");
                default
            }
        }
    }

    pub fn read_numeric<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.trimmed(key) {
            None => default,
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!(key, value = %v, "invalid numeric setting, using default");
                default
            }),
        }
    }

    pub fn read_datetime(&self, key: &str, default: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        match self.trimmed(key) {
            None => default,
            Some(v) => match DatabaseValue::from(v.as_str()).as_datetime() {
                Some(dt) => Some(dt),
                None => {
                    warn!(key, value = %v, "invalid date setting, using default");
                    default
                }
            },
        }
    }

    /// `connectionStrings.<name>.connectionString` and `.providerName`
    pub fn connection_profile(&self, name: &str) -> Option<ConnectionProfile> {
        let connection_string = self.trimmed(&format!("connectionStrings.{}.connectionString", name))?;
        let provider_name = self
            .trimmed(&format!("connectionStrings.{}.providerName", name))
            .unwrap_or_default();
        Some(ConnectionProfile {
            name: name.to_string(),
            provider_name,
            connection_string,
        })
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.describe()).collect()
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("sources", &self.sources())
            .finish()
    }
}

/// `yyyy-MM-dd-HH-mm-ss-user[-extra][.ext]`, unique per second and user
pub fn unique_file_name(user: &str, extra: Option<&str>, ext: Option<&str>) -> String {
    let mut name = format!("{}-{}", Local::now().format("%Y-%m-%d-%H-%M-%S"), user);
    if let Some(extra) = extra.map(str::trim).filter(|s| !s.is_empty()) {
        name.push('-');
        name.push_str(extra);
    }
    if let Some(ext) = ext.map(str::trim).filter(|s| !s.is_empty()) {
        name.push('.');
        name.push_str(ext);
    }
    name
}
