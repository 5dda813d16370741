use std::collections::HashSet;

use heed::types::{SerdeJson, Str};
use heed::{Database, Env, RoTxn, RwTxn, WithoutTls};
use time::OffsetDateTime;

use doc_types::{DocumentId, DocumentRecord, DocumentState, Error};

mod db_name {
    pub const RECORDS: &str = "registry-records";
    pub const SOURCE_INDEX: &str = "registry-source-index";
}

/// Per-document consistency verdict produced by `verify_consistency` (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    Consistent,
    MissingInVector,
    MissingInKeyword,
    OrphanInVector,
    OrphanInKeyword,
    StateInconsistent,
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub verdicts: Vec<(DocumentId, Consistency)>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.verdicts.iter().all(|(_, c)| *c == Consistency::Consistent)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<DocumentState>,
}

#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Paging { offset: 0, limit: 100 }
    }
}

/// Single source of truth for what is indexed (spec §4.3). The primary
/// database is keyed by `doc_id`; the secondary index tracks the single
/// `doc_id` currently `Ready` for a given normalized source (invariant I3).
pub struct DocumentRegistry {
    records: Database<Str, SerdeJson<DocumentRecord>>,
    source_index: Database<Str, Str>,
}

impl DocumentRegistry {
    pub(crate) const fn nb_dbs() -> u32 {
        2
    }

    pub(crate) fn new(env: &Env<WithoutTls>, wtxn: &mut RwTxn) -> Result<Self, Error> {
        let records = env.create_database(wtxn, Some(db_name::RECORDS))?;
        let source_index = env.create_database(wtxn, Some(db_name::SOURCE_INDEX))?;
        Ok(DocumentRegistry { records, source_index })
    }

    pub fn get(&self, rtxn: &RoTxn, doc_id: &DocumentId) -> Result<Option<DocumentRecord>, Error> {
        Ok(self.records.get(rtxn, doc_id.as_str())?)
    }

    pub fn find_by_source(&self, rtxn: &RoTxn, source_key: &str) -> Result<Option<DocumentRecord>, Error> {
        let Some(doc_id) = self.source_index.get(rtxn, source_key)? else {
            return Ok(None);
        };
        self.records.get(rtxn, doc_id).map_err(Error::from)
    }

    pub fn list(&self, rtxn: &RoTxn, filter: &ListFilter, paging: Paging) -> Result<Vec<DocumentRecord>, Error> {
        let mut out = Vec::new();
        for result in self.records.iter(rtxn)? {
            let (_, record) = result?;
            if let Some(state) = filter.state {
                if record.state != state {
                    continue;
                }
            }
            out.push(record);
        }
        out.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(out.into_iter().skip(paging.offset).take(paging.limit).collect())
    }

    /// Writes the record and, when it is `Ready`, (re)points the source
    /// index at it. Both writes happen in the caller's single transaction
    /// so they are never observed half-applied.
    pub fn upsert(&self, wtxn: &mut RwTxn, source_key: &str, record: &DocumentRecord) -> Result<(), Error> {
        self.records.put(wtxn, record.doc_id.as_str(), record)?;
        if record.state == DocumentState::Ready {
            self.source_index.put(wtxn, source_key, record.doc_id.as_str())?;
        }
        Ok(())
    }

    pub fn set_state(
        &self,
        wtxn: &mut RwTxn,
        doc_id: &DocumentId,
        state: DocumentState,
        error: Option<String>,
    ) -> Result<(), Error> {
        let Some(mut record) = self.records.get(wtxn, doc_id.as_str())? else {
            return Err(Error::Consistency {
                doc_id: doc_id.to_string(),
                detail: "set_state on unknown doc_id".into(),
            });
        };
        record.state = state;
        record.last_error = error;
        record.updated_at = OffsetDateTime::now_utc();
        self.records.put(wtxn, doc_id.as_str(), &record)?;
        Ok(())
    }

    /// Invariant I5: deletion must also clear the source index when this
    /// `doc_id` is the one currently pointed to.
    pub fn delete(&self, wtxn: &mut RwTxn, doc_id: &DocumentId) -> Result<(), Error> {
        if let Some(record) = self.records.get(wtxn, doc_id.as_str())? {
            let source_key = record.source.normalized();
            if self.source_index.get(wtxn, &source_key)?.as_deref() == Some(doc_id.as_str()) {
                self.source_index.delete(wtxn, &source_key)?;
            }
        }
        self.records.delete(wtxn, doc_id.as_str())?;
        Ok(())
    }

    /// Compares registry flags against adapter-reported doc-id sets. The
    /// adapters themselves are opaque to this crate (spec §4.4 lives in
    /// `doc-index`); callers pass in what each adapter reports so the
    /// Registry never depends on the adapter traits.
    pub fn verify_consistency(
        &self,
        rtxn: &RoTxn,
        vector_doc_ids: &HashSet<DocumentId>,
        keyword_doc_ids: &HashSet<DocumentId>,
    ) -> Result<ConsistencyReport, Error> {
        let mut verdicts = Vec::new();
        let mut seen = HashSet::new();

        for result in self.records.iter(rtxn)? {
            let (_, record) = result?;
            seen.insert(record.doc_id.clone());
            let in_vector = vector_doc_ids.contains(&record.doc_id);
            let in_keyword = keyword_doc_ids.contains(&record.doc_id);

            let verdict = if record.state == DocumentState::Ready && (!in_vector || !in_keyword) {
                if !in_vector {
                    Consistency::MissingInVector
                } else {
                    Consistency::MissingInKeyword
                }
            } else if record.state == DocumentState::Ready && !record.is_consistent_when_ready() {
                Consistency::StateInconsistent
            } else if record.state != DocumentState::Ready && (in_vector || in_keyword) {
                Consistency::StateInconsistent
            } else {
                Consistency::Consistent
            };
            verdicts.push((record.doc_id.clone(), verdict));
        }

        for doc_id in vector_doc_ids.difference(&seen) {
            verdicts.push((doc_id.clone(), Consistency::OrphanInVector));
        }
        for doc_id in keyword_doc_ids.difference(&seen) {
            verdicts.push((doc_id.clone(), Consistency::OrphanInKeyword));
        }

        Ok(ConsistencyReport { verdicts })
    }
}
