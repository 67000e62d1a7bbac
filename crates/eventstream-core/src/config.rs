//! Service configuration read from the process environment (and `.env`).
//!
//! Every reader takes a lookup function instead of touching `std::env`
//! directly so that tests can supply their own values.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::platform::hub::{DEFAULT_CONSUMER_GROUP, DEFAULT_MAX_BATCH_BYTES, DEFAULT_PARTITION_COUNT};
use crate::platform::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, InMemoryEventHub};
use crate::policy::CheckpointPolicy;
use crate::session::DEFAULT_DRAIN_TIMEOUT;

pub const HUB_CONNECTION_KEY: &str = "ehns_connstring";
pub const HUB_NAME_KEY: &str = "eh_name";
pub const CONSUMER_GROUP_KEY: &str = "consumergroup";
pub const STORAGE_CONNECTION_KEY: &str = "storageacc_connstr";
pub const CONTAINER_NAME_KEY: &str = "blobcontainername";
pub const CHECKPOINT_THRESHOLD_KEY: &str = "eventsBeforeCheckpoint";
pub const DEFAULT_PARTITION_KEY: &str = "eh_partition_id";
pub const DRAIN_TIMEOUT_KEY: &str = "drain_timeout_ms";

const MISSING_HUB: &str = "Event Hub Namespace and Hub Name must be provided.";
const MISSING_STORAGE: &str = "Storage Account and Blob Container Name must be provided.";
const MEMORY_SCHEME: &str = "memory://";
const FILE_SCHEME: &str = "file://";

/// Load `.env` from the crate directory, then from the working directory.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Process-environment lookup; blank values count as absent.
pub fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Key=Value;Key=Value` connection string. Keys compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    endpoint: String,
    properties: HashMap<String, String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut properties = HashMap::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConnectionString(format!("segment '{part}' is not Key=Value"))
            })?;
            properties.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        let endpoint = properties
            .remove("endpoint")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing Endpoint".into()))?;
        Ok(Self {
            endpoint,
            properties,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_in_memory(&self) -> bool {
        self.endpoint.starts_with(MEMORY_SCHEME)
    }

    fn positive_usize(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.property(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidConnectionString(format!(
                        "{key} must be a positive integer, got '{raw}'"
                    ))
                }),
        }
    }
}

/// Where the hub lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    pub connection: ConnectionString,
    pub hub_name: String,
    pub consumer_group: String,
    pub partition_count: usize,
    pub max_batch_bytes: usize,
}

impl HubSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let (Some(raw), Some(hub_name)) = (
            non_blank(&lookup, HUB_CONNECTION_KEY),
            non_blank(&lookup, HUB_NAME_KEY),
        ) else {
            return Err(ConfigError::Missing(MISSING_HUB.into()));
        };
        let connection = ConnectionString::parse(&raw)?;
        let partition_count = connection.positive_usize("PartitionCount", DEFAULT_PARTITION_COUNT)?;
        let max_batch_bytes = connection.positive_usize("MaxBatchBytes", DEFAULT_MAX_BATCH_BYTES)?;
        Ok(Self {
            connection,
            hub_name,
            consumer_group: non_blank(&lookup, CONSUMER_GROUP_KEY)
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            partition_count,
            max_batch_bytes,
        })
    }

    /// Builds the platform client. Only `memory://` endpoints are served in process.
    pub fn connect(&self) -> Result<InMemoryEventHub, ConfigError> {
        if !self.connection.is_in_memory() {
            return Err(ConfigError::Unsupported(self.connection.endpoint().to_string()));
        }
        Ok(InMemoryEventHub::with_max_batch_bytes(
            self.hub_name.clone(),
            self.partition_count,
            self.max_batch_bytes,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointBackend {
    InMemory,
    Directory(PathBuf),
}

/// Checkpoint storage account plus container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStorageSettings {
    pub backend: CheckpointBackend,
    pub container: String,
}

impl CheckpointStorageSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let (Some(raw), Some(container)) = (
            non_blank(&lookup, STORAGE_CONNECTION_KEY),
            non_blank(&lookup, CONTAINER_NAME_KEY),
        ) else {
            return Err(ConfigError::Missing(MISSING_STORAGE.into()));
        };
        let backend = if raw.starts_with(MEMORY_SCHEME) {
            CheckpointBackend::InMemory
        } else if let Some(dir) = raw.strip_prefix(FILE_SCHEME).filter(|d| !d.is_empty()) {
            CheckpointBackend::Directory(PathBuf::from(dir))
        } else {
            return Err(ConfigError::Unsupported(raw));
        };
        Ok(Self { backend, container })
    }

    pub fn open(&self) -> Arc<dyn CheckpointStore> {
        match &self.backend {
            CheckpointBackend::InMemory => Arc::new(InMemoryCheckpointStore::new()),
            CheckpointBackend::Directory(dir) => {
                Arc::new(FileCheckpointStore::new(dir.join(&self.container)))
            }
        }
    }
}

/// Knobs of the reader services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    pub policy: CheckpointPolicy,
    pub drain_timeout: Duration,
}

impl ReaderSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let drain_timeout = non_blank(&lookup, DRAIN_TIMEOUT_KEY)
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_DRAIN_TIMEOUT, Duration::from_millis);
        Self {
            policy: CheckpointPolicy::from_override(lookup(CHECKPOINT_THRESHOLD_KEY).as_deref()),
            drain_timeout,
        }
    }
}

/// Default target partition of the request publisher: the configured id when
/// it is an integer, otherwise `"0"`.
pub fn default_partition(lookup: impl Fn(&str) -> Option<String>) -> String {
    non_blank(&lookup, DEFAULT_PARTITION_KEY)
        .filter(|id| id.parse::<i32>().is_ok())
        .unwrap_or_else(|| "0".to_string())
}
