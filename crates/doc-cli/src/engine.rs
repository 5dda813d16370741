//! Wires one `Config` into a running set of stores, adapters, and services:
//! the `StorageContext`, the two `IndexAdapter`s, the `IndexManager`, the
//! `Scheduler`, and `HybridSearch`. Analogous to how `meilisearch`'s
//! `main.rs` assembles an `IndexScheduler` from an `Opt`, just without an
//! HTTP server sitting on top of it.

use std::sync::Arc;

use doc_index::{ChunkConfig, IndexManager, KeywordAdapter, TimeoutConfig, VectorAdapter};
use doc_scheduler::{Scheduler, SchedulerOptions};
use doc_search::HybridSearch;
use doc_store::{StorageConfig, StorageContext};
use doc_types::Error;

use crate::capabilities::{HashingVectorizer, NoopKeywordGenerator, PlainTextExtractor};
use crate::config::{Config, DefaultFusionMethod};

/// Default LMDB map size for the adapter-local environments; the shared
/// registry environment sizes itself from `StorageConfig::default`.
const ADAPTER_MAP_SIZE: usize = 1 << 30;

pub struct Engine {
    pub config: Config,
    pub storage: Arc<StorageContext>,
    pub vector: Arc<VectorAdapter>,
    pub keyword: Arc<KeywordAdapter>,
    pub index_manager: Arc<IndexManager>,
    pub scheduler: Arc<Scheduler>,
    pub search: Arc<HybridSearch>,
}

impl Engine {
    pub fn open(config: Config) -> Result<Self, Error> {
        let storage_config = StorageConfig {
            paths_registry: config.paths.registry.clone(),
            paths_fingerprint: config.paths.fingerprint.clone(),
            paths_cache: config.paths.cache.clone(),
            paths_intent_log: config.paths.intent_log.clone(),
            // `cache.enabled = false` is realized as a zero TTL rather than
            // a separate code path through `ArtifactCache`: every entry is
            // immediately stale, so every ingest falls through to the real
            // `ContentExtractor` call (spec §6 `cache.enabled`).
            cache_ttl: if config.cache.enabled {
                config.cache.ttl_secs.map(time::Duration::seconds)
            } else {
                Some(time::Duration::ZERO)
            },
            extractor_version: config.extractor_version.clone(),
            map_size: StorageConfig::default().map_size,
        };
        let storage = Arc::new(StorageContext::open(&storage_config)?);

        let vector =
            Arc::new(VectorAdapter::open(&config.paths.vector, config.vector.dimensions, ADAPTER_MAP_SIZE)?);
        let keyword = Arc::new(KeywordAdapter::open(
            &config.paths.keyword,
            config.keyword.k1,
            config.keyword.b,
            ADAPTER_MAP_SIZE,
        )?);

        let vectorizer = Arc::new(HashingVectorizer::new(config.vector.dimensions));
        let index_manager = Arc::new(IndexManager::new(
            Arc::clone(&storage),
            Arc::clone(&vector) as _,
            Arc::clone(&keyword) as _,
            Arc::new(PlainTextExtractor),
            Arc::clone(&vectorizer) as _,
            Some(Arc::new(NoopKeywordGenerator) as _),
            ChunkConfig { chunk_size: config.chunking.size, chunk_overlap: config.chunking.overlap },
            TimeoutConfig {
                base: std::time::Duration::from_secs(config.timeouts.base_secs),
                per_page: std::time::Duration::from_secs(config.timeouts.per_page_secs),
                ..TimeoutConfig::default()
            },
            config.extractor_version.clone(),
        )?);

        let queue = Arc::new(doc_scheduler::JobQueue::open(&config.paths.queue, ADAPTER_MAP_SIZE)?);

        let scheduler = Arc::new(Scheduler::new(
            queue,
            Arc::clone(&index_manager),
            None,
            SchedulerOptions { worker_count: config.workers.count, max_attempts: config.workers.max_attempts },
        ));

        let search = Arc::new(
            HybridSearch::new(Arc::clone(&vector) as _, Arc::clone(&keyword) as _, vectorizer)
                .with_consensus_boost(config.hybrid.consensus_boost),
        );

        Ok(Engine { config, storage, vector, keyword, index_manager, scheduler, search })
    }

    pub fn default_fusion_method(&self) -> doc_search::FusionMethod {
        match self.config.hybrid.default_method {
            DefaultFusionMethod::Rrf => doc_search::FusionMethod::Rrf { k_rrf: self.config.hybrid.rrf_k },
            DefaultFusionMethod::Weighted => doc_search::FusionMethod::Weighted { alpha: self.config.hybrid.alpha },
            DefaultFusionMethod::Adaptive => doc_search::FusionMethod::Adaptive,
        }
    }
}
