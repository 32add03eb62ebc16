//! Advisor configuration, persisted as TOML.
//!
//! ```toml
//! [store]
//! backend = "http"
//! url = "http://localhost:8080"
//! repository = "test-repo"
//! timeout_secs = 30
//!
//! [vocabulary]
//! namespace = "http://localhost/8080/intentOntology#"
//!
//! [resolver]
//! cache = false
//! ```
//!
//! Every section and field is optional; an empty file yields the defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorResult, ConfigError};
use crate::paths::AdvisorPaths;
use crate::registrar::DEFAULT_MAX_ALLOCATION_ATTEMPTS;
use crate::store::{CachedStore, EmbeddedStore, FactStore, HttpStore, HttpStoreConfig};
use crate::vocab::{DEFAULT_NAMESPACE, DMOP_NAMESPACE, Vocabulary};

/// Top-level advisor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub registrar: RegistrarConfig,
}

/// Which fact store to talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// GraphDB / RDF4J repository over HTTP.
    Http {
        #[serde(default = "default_url")]
        url: String,
        #[serde(default = "default_repository")]
        repository: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// In-process oxigraph store. Without a path, the XDG data dir is used.
    Embedded {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

fn default_url() -> String {
    "http://localhost:8080".into()
}
fn default_repository() -> String {
    "test-repo".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Http {
            url: default_url(),
            repository: default_repository(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Ontology namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_dataset_namespace")]
    pub dataset_namespace: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}
fn default_dataset_namespace() -> String {
    DMOP_NAMESPACE.into()
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            dataset_namespace: default_dataset_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Memoise SELECT results until the next successful write.
    #[serde(default = "default_cache")]
    pub cache: bool,
}

fn default_cache() -> bool {
    false
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache: default_cache(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarConfig {
    #[serde(default = "default_max_allocation_attempts")]
    pub max_allocation_attempts: u32,
}

fn default_max_allocation_attempts() -> u32 {
    DEFAULT_MAX_ALLOCATION_ATTEMPTS
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            max_allocation_attempts: default_max_allocation_attempts(),
        }
    }
}

impl AdvisorConfig {
    /// Parse a config from TOML text. `origin` only labels errors.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Load an explicit config file, or the default one if it exists.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_file = AdvisorPaths::resolve()?.config_file();
        if default_file.is_file() {
            tracing::debug!(path = %default_file.display(), "loading config");
            Self::load(&default_file)
        } else {
            Ok(Self::default())
        }
    }

    /// Build the vocabulary described by `[vocabulary]`.
    pub fn vocabulary(&self) -> AdvisorResult<Vocabulary> {
        Ok(Vocabulary::new(
            &self.vocabulary.namespace,
            &self.vocabulary.dataset_namespace,
        )?)
    }

    /// Open the configured fact store, wrapped in a query cache when enabled.
    pub fn open_store(&self) -> AdvisorResult<Arc<dyn FactStore>> {
        let store: Arc<dyn FactStore> = match &self.store {
            StoreConfig::Http {
                url,
                repository,
                timeout_secs,
            } => {
                let config = HttpStoreConfig {
                    base_url: url.clone(),
                    repository: repository.clone(),
                    timeout: Duration::from_secs(*timeout_secs),
                };
                tracing::debug!(url = %url, repository = %repository, "using http store");
                self.maybe_cached(HttpStore::new(config))
            }
            StoreConfig::Embedded { path } => {
                let path = match path {
                    Some(p) => p.clone(),
                    None => AdvisorPaths::resolve()?.store_dir(),
                };
                let store = EmbeddedStore::open(&path).map_err(|e| ConfigError::EmbeddedOpen {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                tracing::debug!(path = %path.display(), "using embedded store");
                self.maybe_cached(store)
            }
        };
        Ok(store)
    }

    fn maybe_cached<S: FactStore + 'static>(&self, store: S) -> Arc<dyn FactStore> {
        if self.resolver.cache {
            Arc::new(CachedStore::new(store))
        } else {
            Arc::new(store)
        }
    }
}
