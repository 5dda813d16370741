use heed::types::{SerdeJson, Str};
use heed::{Database, Env, RoTxn, RwTxn, WithoutTls};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use doc_types::{DocumentId, Error, Fingerprint};

mod db_name {
    pub const ENTRIES: &str = "fingerprint-entries";
}

/// What was last processed for a given source (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub fingerprint: Fingerprint,
    pub doc_id: DocumentId,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Persistent mapping `normalized source -> (fingerprint, doc_id, updated_at)`.
/// Writes are fsynced by `heed`/LMDB before `RwTxn::commit` returns, so a
/// successful `put` is durable before it is reported complete.
pub struct FingerprintStore {
    entries: Database<Str, SerdeJson<FingerprintEntry>>,
}

impl FingerprintStore {
    pub(crate) const fn nb_dbs() -> u32 {
        1
    }

    pub(crate) fn new(env: &Env<WithoutTls>, wtxn: &mut RwTxn) -> Result<Self, Error> {
        let entries = env.create_database(wtxn, Some(db_name::ENTRIES))?;
        Ok(FingerprintStore { entries })
    }

    pub fn lookup(&self, rtxn: &RoTxn, source_key: &str) -> Result<Option<FingerprintEntry>, Error> {
        Ok(self.entries.get(rtxn, source_key)?)
    }

    pub fn put(&self, wtxn: &mut RwTxn, source_key: &str, entry: &FingerprintEntry) -> Result<(), Error> {
        self.entries.put(wtxn, source_key, entry)?;
        Ok(())
    }

    pub fn delete(&self, wtxn: &mut RwTxn, source_key: &str) -> Result<bool, Error> {
        Ok(self.entries.delete(wtxn, source_key)?)
    }

    /// Deletes every entry whose `updated_at` predates `older_than`.
    pub fn sweep(&self, wtxn: &mut RwTxn, older_than: OffsetDateTime) -> Result<usize, Error> {
        let stale: Vec<String> = self
            .entries
            .iter(wtxn)?
            .filter_map(|r| r.ok())
            .filter(|(_, entry)| entry.updated_at < older_than)
            .map(|(key, _)| key.to_owned())
            .collect();
        let count = stale.len();
        for key in stale {
            self.entries.delete(wtxn, &key)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::StorageContext;
    use doc_types::SourceHandle;

    #[test]
    fn put_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = StorageContext::open_for_test(dir.path());
        let store = &ctx.fingerprint_store;

        let source = SourceHandle::parse("/tmp/a.pdf");
        let entry = FingerprintEntry {
            fingerprint: Fingerprint::of(b"hi", None, None),
            doc_id: DocumentId("abc".into()),
            updated_at: OffsetDateTime::now_utc(),
        };

        let mut wtxn = ctx.env.write_txn().unwrap();
        store.put(&mut wtxn, &source.normalized(), &entry).unwrap();
        wtxn.commit().unwrap();

        let rtxn = ctx.env.read_txn().unwrap();
        let got = store.lookup(&rtxn, &source.normalized()).unwrap().unwrap();
        assert_eq!(got.doc_id, entry.doc_id);
    }
}
