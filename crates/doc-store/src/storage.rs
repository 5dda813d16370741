use std::path::{Path, PathBuf};

use heed::{Env, EnvOpenOptions, WithoutTls};
use time::Duration;

use doc_types::Error;

use crate::cache::ArtifactCache;
use crate::fingerprint_store::FingerprintStore;
use crate::intent_log::IntentLog;
use crate::registry::DocumentRegistry;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub paths_registry: PathBuf,
    pub paths_fingerprint: PathBuf,
    pub paths_cache: PathBuf,
    pub paths_intent_log: PathBuf,
    pub cache_ttl: Option<Duration>,
    pub extractor_version: String,
    /// LMDB map size for each of the four environments, in bytes.
    pub map_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            paths_registry: PathBuf::from("data/registry"),
            paths_fingerprint: PathBuf::from("data/fingerprint"),
            paths_cache: PathBuf::from("data/cache"),
            paths_intent_log: PathBuf::from("data/intent_log"),
            cache_ttl: None,
            extractor_version: "v1".to_string(),
            map_size: 1 << 30,
        }
    }
}

/// Unifies the lifecycles of the Registry, Fingerprint Store, Artifact
/// Cache, and Intent Log behind one object so startup/shutdown order is
/// explicit (spec §9 design note) rather than scattered module-level
/// singletons, as the source system used.
///
/// All four stores share one LMDB environment rooted at
/// `paths_registry`, each as its own named database within it, the way
/// `index-scheduler` keeps its task/batch/mapping databases in a single
/// environment rather than one per concern. The sibling
/// `paths_fingerprint`/`paths_cache`/`paths_intent_log` directories are
/// reserved for a future split into dedicated environments and are not
/// read by `open`.
pub struct StorageContext {
    pub env: Env<WithoutTls>,
    pub registry: DocumentRegistry,
    pub fingerprint_store: FingerprintStore,
    pub artifact_cache: ArtifactCache,
    pub intent_log: IntentLog,
}

impl StorageContext {
    pub fn open(config: &StorageConfig) -> Result<Self, Error> {
        // The four stores share one environment (they are always opened and
        // closed together) but each keeps its own named database within it,
        // as `index-scheduler` does for its task/batch/mapping databases.
        std::fs::create_dir_all(&config.paths_registry)?;
        let nb_dbs = DocumentRegistry::nb_dbs()
            + FingerprintStore::nb_dbs()
            + ArtifactCache::nb_dbs()
            + IntentLog::nb_dbs();
        let env = unsafe {
            EnvOpenOptions::new().map_size(config.map_size).max_dbs(nb_dbs).open(&config.paths_registry)?
        };

        let mut wtxn = env.write_txn()?;
        let registry = DocumentRegistry::new(&env, &mut wtxn)?;
        let fingerprint_store = FingerprintStore::new(&env, &mut wtxn)?;
        let artifact_cache =
            ArtifactCache::new(&env, &mut wtxn, config.cache_ttl, config.extractor_version.clone())?;
        let intent_log = IntentLog::new(&env, &mut wtxn)?;
        wtxn.commit()?;

        Ok(StorageContext { env, registry, fingerprint_store, artifact_cache, intent_log })
    }

    pub fn open_at(base: impl AsRef<Path>) -> Result<Self, Error> {
        let base = base.as_ref();
        Self::open(&StorageConfig {
            paths_registry: base.join("registry"),
            paths_fingerprint: base.join("fingerprint"),
            paths_cache: base.join("cache"),
            paths_intent_log: base.join("intent_log"),
            ..StorageConfig::default()
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn open_for_test(base: impl AsRef<Path>) -> Self {
        Self::open_at(base).expect("test storage context must open")
    }
}
