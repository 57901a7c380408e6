//! Connection registry
//!
//! Maps application keys (`"SCAN"`, `"ORDERS"`, ...) to shared connection
//! wrappers. The registry is an ordinary value handed to whoever needs it;
//! clone the `Arc` around it to share it between tasks.

use super::connection::{Credentials, DbConnection};
use super::error::{DatabaseError, Result};
use super::provider::ProviderCatalog;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Wrapper shared between every user of a registry key
pub type SharedConnection = Arc<tokio::sync::Mutex<DbConnection>>;

struct Entry {
    provider_name: String,
    connection_string: String,
    connection: SharedConnection,
}

/// Keyed store of connection wrappers
pub struct ConnectionRegistry {
    providers: Arc<ProviderCatalog>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    pub fn new(providers: Arc<ProviderCatalog>) -> Self {
        Self {
            providers,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn providers(&self) -> &ProviderCatalog {
        &self.providers
    }

    /// Register a connection under `key`.
    ///
    /// If `key` already holds a connection built from the same provider and
    /// connection string, that instance is returned. Otherwise a new wrapper
    /// replaces whatever was registered.
    pub fn add_connection(
        &self,
        key: &str,
        provider_name: &str,
        connection_string: &str,
        credentials: Option<&Credentials>,
    ) -> Result<SharedConnection> {
        let provider = self.providers.resolve(provider_name)?;
        let connection = DbConnection::new(provider, connection_string, credentials).with_key(key);
        let resolved = connection.connection_string().to_string();

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.connection_string == resolved
                && entry.provider_name.eq_ignore_ascii_case(provider_name)
            {
                debug!(key, "connection already registered");
                return Ok(Arc::clone(&entry.connection));
            }
            info!(key, provider = provider_name, "replacing registered connection");
        } else {
            info!(key, provider = provider_name, "registering connection");
        }

        let shared = Arc::new(tokio::sync::Mutex::new(connection));
        entries.insert(
            key.to_string(),
            Entry {
                provider_name: provider_name.to_string(),
                connection_string: resolved,
                connection: Arc::clone(&shared),
            },
        );
        Ok(shared)
    }

    /// Register an already-built wrapper, replacing any existing entry
    pub fn insert(&self, key: &str, connection: DbConnection) -> SharedConnection {
        let provider_name = connection.settings().provider_name().to_string();
        let connection_string = connection.connection_string().to_string();
        let shared = Arc::new(tokio::sync::Mutex::new(connection.with_key(key)));
        self.entries.write().insert(
            key.to_string(),
            Entry {
                provider_name,
                connection_string,
                connection: Arc::clone(&shared),
            },
        );
        debug!(key, "connection inserted");
        shared
    }

    pub fn get(&self, key: &str) -> Option<SharedConnection> {
        self.entries
            .read()
            .get(key)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Like [`get`](Self::get), failing with `UnknownConnection`
    pub fn require(&self, key: &str) -> Result<SharedConnection> {
        self.get(key)
            .ok_or_else(|| DatabaseError::UnknownConnection(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop the entry for `key`. Holders of the shared wrapper keep it.
    pub fn remove(&self, key: &str) -> Option<SharedConnection> {
        let removed = self.entries.write().remove(key).map(|entry| entry.connection);
        if removed.is_some() {
            info!(key, "connection removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// A private, unopened copy of the wrapper registered under `key`, for
    /// work that must not share the registered wrapper's transaction stack
    pub async fn detached(&self, key: &str) -> Result<DbConnection> {
        let shared = self.require(key)?;
        let connection = shared.lock().await;
        Ok(connection.detached())
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("providers", &self.providers)
            .field("keys", &self.keys())
            .finish()
    }
}
