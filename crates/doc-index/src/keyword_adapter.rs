use std::collections::{HashMap, HashSet};

use heed::types::{SerdeJson, Str, U32 as U32Codec};
use heed::{Database, Env, EnvOpenOptions, WithoutTls};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use doc_types::{ChunkId, DocumentId, Error};

use crate::adapter::{AdapterKind, AdapterQuery, ChunkWrite, Hit, IndexAdapter, QueryFilter};
use crate::tokenize::tokenize;

mod db_name {
    pub const ID_BY_KEY: &str = "keyword-id-by-key";
    pub const PAYLOAD_BY_ID: &str = "keyword-payload-by-id";
    pub const POSTINGS: &str = "keyword-postings";
    pub const DOC_ORDINALS: &str = "keyword-doc-ordinals";
    pub const STATS: &str = "keyword-stats";
    pub const COUNTERS: &str = "keyword-counters";
}

const STATS_KEY: &str = "stats";
const NEXT_ID_KEY: &str = "next-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkPayload {
    chunk_id: ChunkId,
    text: String,
    term_freqs: HashMap<String, u32>,
    length: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Stats {
    doc_count: u32,
    total_length: u64,
}

impl Stats {
    fn avg_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_length as f64 / self.doc_count as f64
        }
    }
}

/// BM25-style inverted-index keyword backend (spec §4.4). Tokenizes and
/// indexes on write; returns raw, unnormalized BM25 scores with a
/// configured `(k1, b)`.
pub struct KeywordAdapter {
    env: Env<WithoutTls>,
    id_by_key: Database<Str, U32Codec>,
    payload_by_id: Database<U32Codec, SerdeJson<ChunkPayload>>,
    postings: Database<Str, SerdeJson<RoaringBitmap>>,
    doc_ordinals: Database<Str, SerdeJson<Vec<u32>>>,
    stats: Database<Str, SerdeJson<Stats>>,
    ids: Database<Str, U32Codec>,
    k1: f64,
    b: f64,
}

impl KeywordAdapter {
    pub fn open(
        path: impl AsRef<std::path::Path>,
        k1: f64,
        b: f64,
        map_size: usize,
    ) -> Result<Self, Error> {
        std::fs::create_dir_all(path.as_ref())?;
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(6).open(path.as_ref())? };
        let mut wtxn = env.write_txn()?;
        let id_by_key = env.create_database(&mut wtxn, Some(db_name::ID_BY_KEY))?;
        let payload_by_id = env.create_database(&mut wtxn, Some(db_name::PAYLOAD_BY_ID))?;
        let postings = env.create_database(&mut wtxn, Some(db_name::POSTINGS))?;
        let doc_ordinals = env.create_database(&mut wtxn, Some(db_name::DOC_ORDINALS))?;
        let stats = env.create_database(&mut wtxn, Some(db_name::STATS))?;
        let ids = env.create_database(&mut wtxn, Some(db_name::COUNTERS))?;
        wtxn.commit()?;
        Ok(KeywordAdapter { env, id_by_key, payload_by_id, postings, doc_ordinals, stats, ids, k1, b })
    }

    fn next_id(&self, wtxn: &mut heed::RwTxn) -> Result<u32, Error> {
        let next = self.ids.get(wtxn, NEXT_ID_KEY)?.unwrap_or(0);
        self.ids.put(wtxn, NEXT_ID_KEY, &(next + 1))?;
        Ok(next)
    }
}

impl IndexAdapter for KeywordAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Keyword
    }

    fn add(&self, doc_id: &DocumentId, writes: &[ChunkWrite]) -> Result<(), Error> {
        let mut wtxn = self.env.write_txn()?;
        let mut ordinals = Vec::with_capacity(writes.len());
        let mut stats = self.stats.get(&wtxn, STATS_KEY)?.unwrap_or_default();

        for write in writes {
            let chunk = &write.chunk;
            let key = chunk.id.to_string();

            // Idempotent overwrite: if this (doc_id, ordinal) was already
            // indexed, retract its old postings and stats contribution first.
            if let Some(old_id) = self.id_by_key.get(&wtxn, &key)? {
                if let Some(old_payload) = self.payload_by_id.get(&wtxn, &old_id)? {
                    for term in old_payload.term_freqs.keys() {
                        if let Some(mut bitmap) = self.postings.get(&wtxn, term)? {
                            bitmap.remove(old_id);
                            self.postings.put(&mut wtxn, term, &bitmap)?;
                        }
                    }
                    stats.doc_count = stats.doc_count.saturating_sub(1);
                    stats.total_length = stats.total_length.saturating_sub(old_payload.length as u64);
                }
                self.payload_by_id.delete(&mut wtxn, &old_id)?;
            }

            let tokens = tokenize(&chunk.text);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }

            let id = self.next_id(&mut wtxn)?;
            self.id_by_key.put(&mut wtxn, &key, &id)?;
            self.payload_by_id.put(
                &mut wtxn,
                &id,
                &ChunkPayload {
                    chunk_id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    term_freqs: term_freqs.clone(),
                    length: tokens.len() as u32,
                },
            )?;
            for term in term_freqs.keys() {
                let mut bitmap = self.postings.get(&wtxn, term)?.unwrap_or_default();
                bitmap.insert(id);
                self.postings.put(&mut wtxn, term, &bitmap)?;
            }

            stats.doc_count += 1;
            stats.total_length += tokens.len() as u64;
            ordinals.push(chunk.id.ordinal);
        }

        self.stats.put(&mut wtxn, STATS_KEY, &stats)?;
        self.doc_ordinals.put(&mut wtxn, doc_id.as_str(), &ordinals)?;
        wtxn.commit()?;
        Ok(())
    }

    fn delete(&self, doc_id: &DocumentId) -> Result<(), Error> {
        let mut wtxn = self.env.write_txn()?;
        let mut stats = self.stats.get(&wtxn, STATS_KEY)?.unwrap_or_default();

        if let Some(ordinals) = self.doc_ordinals.get(&wtxn, doc_id.as_str())? {
            for ordinal in ordinals {
                let key = ChunkId::new(doc_id.clone(), ordinal).to_string();
                let Some(id) = self.id_by_key.get(&wtxn, &key)? else { continue };
                if let Some(payload) = self.payload_by_id.get(&wtxn, &id)? {
                    for term in payload.term_freqs.keys() {
                        if let Some(mut bitmap) = self.postings.get(&wtxn, term)? {
                            bitmap.remove(id);
                            self.postings.put(&mut wtxn, term, &bitmap)?;
                        }
                    }
                    stats.doc_count = stats.doc_count.saturating_sub(1);
                    stats.total_length = stats.total_length.saturating_sub(payload.length as u64);
                }
                self.payload_by_id.delete(&mut wtxn, &id)?;
                self.id_by_key.delete(&mut wtxn, &key)?;
            }
        }
        self.doc_ordinals.delete(&mut wtxn, doc_id.as_str())?;
        self.stats.put(&mut wtxn, STATS_KEY, &stats)?;
        wtxn.commit()?;
        Ok(())
    }

    fn query(&self, query: &AdapterQuery, top_k: usize, filter: &QueryFilter) -> Result<Vec<Hit>, Error> {
        let AdapterQuery::Text(text) = query else {
            return Err(Error::InvalidOptions("keyword adapter requires a text query".into()));
        };
        let rtxn = self.env.read_txn()?;
        let stats = self.stats.get(&rtxn, STATS_KEY)?.unwrap_or_default();
        if stats.doc_count == 0 {
            return Ok(Vec::new());
        }
        let avg_len = stats.avg_length();
        let n = stats.doc_count as f64;

        let mut scores: HashMap<u32, f32> = HashMap::new();
        for term in tokenize(text) {
            let Some(bitmap) = self.postings.get(&rtxn, &term)? else { continue };
            let df = bitmap.len() as f64;
            if df == 0.0 {
                continue;
            }
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for id in bitmap.iter() {
                let Some(payload) = self.payload_by_id.get(&rtxn, &id)? else { continue };
                if !filter.allows(&payload.chunk_id.doc_id) {
                    continue;
                }
                let tf = *payload.term_freqs.get(&term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let denom = tf + self.k1 * (1.0 - self.b + self.b * payload.length as f64 / avg_len.max(1.0));
                let score = idf * (tf * (self.k1 + 1.0)) / denom;
                *scores.entry(id).or_insert(0.0) += score as f32;
            }
        }

        let mut hits: Vec<Hit> = Vec::with_capacity(scores.len());
        for (id, score) in scores {
            let Some(payload) = self.payload_by_id.get(&rtxn, &id)? else { continue };
            hits.push(Hit { chunk_id: payload.chunk_id, score, payload: payload.text });
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn count(&self, doc_id: Option<&DocumentId>) -> Result<usize, Error> {
        let rtxn = self.env.read_txn()?;
        match doc_id {
            Some(doc_id) => Ok(self.doc_ordinals.get(&rtxn, doc_id.as_str())?.map(|v| v.len()).unwrap_or(0)),
            None => Ok(self.payload_by_id.len(&rtxn)? as usize),
        }
    }

    fn exists(&self, doc_id: &DocumentId) -> Result<bool, Error> {
        let rtxn = self.env.read_txn()?;
        Ok(self.doc_ordinals.get(&rtxn, doc_id.as_str())?.is_some())
    }

    fn doc_ids(&self) -> Result<HashSet<DocumentId>, Error> {
        let rtxn = self.env.read_txn()?;
        let mut out = HashSet::new();
        for result in self.doc_ordinals.iter(&rtxn)? {
            let (key, _) = result?;
            out.insert(DocumentId(key.to_owned()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use doc_types::{Chunk, ChunkId, ChunkMetadata};

    fn write(doc_id: &DocumentId, ordinal: u32, text: &str) -> ChunkWrite {
        ChunkWrite {
            chunk: Chunk::new(
                ChunkId::new(doc_id.clone(), ordinal),
                text.to_string(),
                ChunkMetadata { ordinal, ..Default::default() },
            ),
            embedding: None,
        }
    }

    #[test]
    fn exact_term_outranks_unrelated_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = KeywordAdapter::open(dir.path(), 1.2, 0.75, 1 << 20).unwrap();
        let doc_a = DocumentId("doc-a".into());
        let doc_b = DocumentId("doc-b".into());
        adapter.add(&doc_a, &[write(&doc_a, 0, "PM10K 2293937 laser power sensor")]).unwrap();
        adapter.add(&doc_b, &[write(&doc_b, 0, "completely unrelated weather report")]).unwrap();

        let hits = adapter
            .query(&AdapterQuery::Text("2293937".into()), 5, &QueryFilter::default())
            .unwrap();
        assert_eq!(hits[0].chunk_id.doc_id, doc_a);
    }

    #[test]
    fn delete_removes_all_chunks_for_doc() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = KeywordAdapter::open(dir.path(), 1.2, 0.75, 1 << 20).unwrap();
        let doc_a = DocumentId("doc-a".into());
        adapter.add(&doc_a, &[write(&doc_a, 0, "hello world"), write(&doc_a, 1, "more text")]).unwrap();
        assert_eq!(adapter.count(Some(&doc_a)).unwrap(), 2);
        adapter.delete(&doc_a).unwrap();
        assert_eq!(adapter.count(Some(&doc_a)).unwrap(), 0);
        assert_eq!(adapter.count(None).unwrap(), 0);
    }

    #[test]
    fn readd_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = KeywordAdapter::open(dir.path(), 1.2, 0.75, 1 << 20).unwrap();
        let doc_a = DocumentId("doc-a".into());
        adapter.add(&doc_a, &[write(&doc_a, 0, "hello world")]).unwrap();
        adapter.add(&doc_a, &[write(&doc_a, 0, "hello world")]).unwrap();
        assert_eq!(adapter.count(None).unwrap(), 1);
    }
}
