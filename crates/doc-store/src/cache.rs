use heed::types::{Bytes, SerdeJson};
use heed::{Database, Env, RoTxn, RwTxn, WithoutTls};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use doc_types::chunk::{Pair, ParseMethod};
use doc_types::Error;

mod db_name {
    pub const ARTIFACTS: &str = "artifact-cache";
}

/// Content-addressed cache key: `H(content) xor H(prompt) xor H(extractor_version)`
/// collapsed to 32 bytes, per spec §4.2.
pub fn cache_key(content_fp: &[u8; 32], prompt: &str, extractor_version: &str) -> [u8; 32] {
    let prompt_h = Sha256::digest(prompt.as_bytes());
    let version_h = Sha256::digest(extractor_version.as_bytes());
    let mut key = [0u8; 32];
    for i in 0..32 {
        key[i] = content_fp[i] ^ prompt_h[i] ^ version_h[i];
    }
    key
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub text: String,
    pub pairs: Vec<Pair>,
    pub parse_method: ParseMethod,
    pub extractor_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}

/// Content-addressed, read-mostly store of fully-parsed extractor output.
/// Entries are pure functions of their key (invariant I4): evicting one is
/// always safe, never required for correctness. Consulted before invoking
/// the out-of-core `ContentExtractor`.
pub struct ArtifactCache {
    artifacts: Database<Bytes, SerdeJson<CachedArtifact>>,
    ttl: Option<Duration>,
    current_extractor_version: String,
}

impl ArtifactCache {
    pub(crate) const fn nb_dbs() -> u32 {
        1
    }

    pub(crate) fn new(
        env: &Env<WithoutTls>,
        wtxn: &mut RwTxn,
        ttl: Option<Duration>,
        current_extractor_version: String,
    ) -> Result<Self, Error> {
        let artifacts = env.create_database(wtxn, Some(db_name::ARTIFACTS))?;
        Ok(ArtifactCache { artifacts, ttl, current_extractor_version })
    }

    /// A cache hit is authoritative only when the stored `extractor_version`
    /// matches the current one and the entry has not expired; otherwise the
    /// caller must treat this as a miss and re-extract.
    pub fn get(&self, rtxn: &RoTxn, key: &[u8; 32]) -> Result<Option<CachedArtifact>, Error> {
        let Some(artifact) = self.artifacts.get(rtxn, key.as_slice())? else {
            return Ok(None);
        };
        if artifact.extractor_version != self.current_extractor_version {
            return Ok(None);
        }
        if let Some(ttl) = self.ttl {
            if OffsetDateTime::now_utc() - artifact.cached_at > ttl {
                return Ok(None);
            }
        }
        Ok(Some(artifact))
    }

    pub fn put(&self, wtxn: &mut RwTxn, key: &[u8; 32], artifact: &CachedArtifact) -> Result<(), Error> {
        self.artifacts.put(wtxn, key.as_slice(), artifact)?;
        Ok(())
    }

    /// Explicit admin hook; never called automatically on `remove` (spec §9
    /// open question: "never evict on remove" is retained).
    pub fn clear(&self, wtxn: &mut RwTxn) -> Result<(), Error> {
        self.artifacts.clear(wtxn)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::StorageContext;

    #[test]
    fn stale_extractor_version_is_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = StorageContext::open_for_test(dir.path());
        let cache = &ctx.artifact_cache;
        let key = cache_key(&[1u8; 32], "prompt", "v1");

        let mut wtxn = ctx.env.write_txn().unwrap();
        cache
            .put(
                &mut wtxn,
                &key,
                &CachedArtifact {
                    text: "hi".into(),
                    pairs: vec![],
                    parse_method: ParseMethod::GenericText,
                    extractor_version: "v0-stale".into(),
                    cached_at: OffsetDateTime::now_utc(),
                },
            )
            .unwrap();
        wtxn.commit().unwrap();

        let rtxn = ctx.env.read_txn().unwrap();
        assert!(cache.get(&rtxn, &key).unwrap().is_none());
    }
}
