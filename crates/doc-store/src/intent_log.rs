use heed::byteorder::BE;
use heed::types::{SerdeJson, U64};
use heed::{Database, Env, RoTxn, RwTxn, WithoutTls};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use doc_types::{ChunkWrite, DocumentId, DocumentRecord, Error};

use crate::cache::CachedArtifact;

mod db_name {
    pub const INTENTS: &str = "intent-log";
}

pub type OpId = u64;
type BEU64 = U64<BE>;

/// One primitive, idempotent action the Index Manager can apply (spec §4.6).
///
/// Each variant carries everything needed to re-execute it after a crash
/// without re-invoking the `ContentExtractor` or `Vectorizer`: the Intent
/// Log is the durable record of "what we were about to do", not just "what
/// we were about to do it to", so replay never needs to re-derive chunk
/// text or embeddings from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PrimitiveStep {
    CachePut { key: [u8; 32], artifact: CachedArtifact },
    RegistryWrite { record: DocumentRecord },
    VectorAdd { doc_id: DocumentId, writes: Vec<ChunkWrite> },
    VectorDelete { doc_id: DocumentId },
    KeywordAdd { doc_id: DocumentId, writes: Vec<ChunkWrite> },
    KeywordDelete { doc_id: DocumentId },
    /// Deletes the Registry row of a document superseded by a replacement
    /// (spec invariant I3: at most one `Ready` record per source).
    RegistryDelete { doc_id: DocumentId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentState {
    InProgress,
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRecord {
    pub op_id: OpId,
    pub doc_id: DocumentId,
    pub steps: Vec<PrimitiveStep>,
    /// Index of the next step to execute; steps before this index have
    /// already succeeded and must not be re-applied in a way that isn't
    /// idempotent (adapters' `add`/`delete` are idempotent so replay is
    /// safe regardless, but tracking progress avoids redundant work).
    pub next_step: usize,
    pub state: IntentState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl IntentRecord {
    pub fn new(op_id: OpId, doc_id: DocumentId, steps: Vec<PrimitiveStep>, now: OffsetDateTime) -> Self {
        IntentRecord { op_id, doc_id, steps, next_step: 0, state: IntentState::InProgress, created_at: now }
    }
}

/// Durable, append-only log of in-progress mutations (spec §4.6, §6). On
/// process restart, every `InProgress` record is re-planned from its
/// recorded step list and idempotently retried.
pub struct IntentLog {
    intents: Database<BEU64, SerdeJson<IntentRecord>>,
}

impl IntentLog {
    pub(crate) const fn nb_dbs() -> u32 {
        1
    }

    pub(crate) fn new(env: &Env<WithoutTls>, wtxn: &mut RwTxn) -> Result<Self, Error> {
        let intents = env.create_database(wtxn, Some(db_name::INTENTS))?;
        Ok(IntentLog { intents })
    }

    pub fn announce(&self, wtxn: &mut RwTxn, record: &IntentRecord) -> Result<(), Error> {
        self.intents.put(wtxn, &record.op_id, record)?;
        Ok(())
    }

    pub fn advance(&self, wtxn: &mut RwTxn, op_id: OpId, next_step: usize) -> Result<(), Error> {
        let Some(mut record) = self.intents.get(wtxn, &op_id)? else {
            return Err(Error::Consistency {
                doc_id: op_id.to_string(),
                detail: "advance on unknown intent".into(),
            });
        };
        record.next_step = next_step;
        self.intents.put(wtxn, &op_id, &record)?;
        Ok(())
    }

    pub fn mark_committed(&self, wtxn: &mut RwTxn, op_id: OpId) -> Result<(), Error> {
        self.set_state(wtxn, op_id, IntentState::Committed)
    }

    /// Cooperative cancellation rolls the intent back to `InProgress` so a
    /// subsequent startup or retry can resume it (spec §4.7).
    pub fn mark_cancelled_as_in_progress(&self, wtxn: &mut RwTxn, op_id: OpId) -> Result<(), Error> {
        self.set_state(wtxn, op_id, IntentState::InProgress)
    }

    fn set_state(&self, wtxn: &mut RwTxn, op_id: OpId, state: IntentState) -> Result<(), Error> {
        let Some(mut record) = self.intents.get(wtxn, &op_id)? else {
            return Err(Error::Consistency {
                doc_id: op_id.to_string(),
                detail: "set_state on unknown intent".into(),
            });
        };
        record.state = state;
        self.intents.put(wtxn, &op_id, &record)?;
        Ok(())
    }

    pub fn get(&self, rtxn: &RoTxn, op_id: OpId) -> Result<Option<IntentRecord>, Error> {
        Ok(self.intents.get(rtxn, &op_id)?)
    }

    /// Highest `op_id` seen across all intents (any state), used to seed a
    /// fresh in-memory counter after a restart so newly announced intents
    /// never collide with ones already on disk.
    pub fn max_op_id(&self, rtxn: &RoTxn) -> Result<Option<OpId>, Error> {
        let mut max = None;
        for result in self.intents.iter(rtxn)? {
            let (op_id, _) = result?;
            max = Some(max.map_or(op_id, |m: OpId| m.max(op_id)));
        }
        Ok(max)
    }

    /// All intents left `InProgress`, oldest first: the recovery work list.
    pub fn in_progress(&self, rtxn: &RoTxn) -> Result<Vec<IntentRecord>, Error> {
        let mut out: Vec<IntentRecord> = self
            .intents
            .iter(rtxn)?
            .filter_map(|r| r.ok())
            .map(|(_, record)| record)
            .filter(|record| record.state == IntentState::InProgress)
            .collect();
        out.sort_by_key(|r| r.op_id);
        Ok(out)
    }

    /// Periodic compaction: drops `Committed` and `Cancelled` records older
    /// than `horizon` (spec §6).
    pub fn compact(&self, wtxn: &mut RwTxn, horizon: OffsetDateTime) -> Result<usize, Error> {
        let stale: Vec<OpId> = self
            .intents
            .iter(wtxn)?
            .filter_map(|r| r.ok())
            .filter(|(_, record)| {
                record.state != IntentState::InProgress && record.created_at < horizon
            })
            .map(|(op_id, _)| op_id)
            .collect();
        let count = stale.len();
        for op_id in stale {
            self.intents.delete(wtxn, &op_id)?;
        }
        Ok(count)
    }
}
