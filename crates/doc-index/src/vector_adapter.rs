use std::collections::HashSet;

use heed::types::{SerdeJson, Str};
use heed::{Database, Env, EnvOpenOptions, WithoutTls};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use doc_types::{ChunkId, DocumentId, Error};

use crate::adapter::{AdapterKind, AdapterQuery, ChunkWrite, Hit, IndexAdapter, QueryFilter};

mod db_name {
    pub const VECTORS: &str = "vector-entries";
    pub const DOC_ORDINALS: &str = "vector-doc-ordinals";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    embedding: Vec<f32>,
    payload: String,
}

/// Brute-force, cosine-similarity vector backend (spec §4.4). Dimensions are
/// fixed at store creation; writes whose vectors mismatch are refused. This
/// is a swappable implementation of `IndexAdapter` — an ANN backend could
/// replace it without the Index Manager or Hybrid Search noticing.
pub struct VectorAdapter {
    env: Env<WithoutTls>,
    vectors: Database<Str, SerdeJson<VectorEntry>>,
    doc_ordinals: Database<Str, SerdeJson<Vec<u32>>>,
    dimensions: usize,
}

impl VectorAdapter {
    pub fn open(path: impl AsRef<std::path::Path>, dimensions: usize, map_size: usize) -> Result<Self, Error> {
        std::fs::create_dir_all(path.as_ref())?;
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(2).open(path.as_ref())? };
        let mut wtxn = env.write_txn()?;
        let vectors = env.create_database(&mut wtxn, Some(db_name::VECTORS))?;
        let doc_ordinals = env.create_database(&mut wtxn, Some(db_name::DOC_ORDINALS))?;
        wtxn.commit()?;
        Ok(VectorAdapter { env, vectors, doc_ordinals, dimensions })
    }

    fn entry_key(chunk_id: &ChunkId) -> String {
        chunk_id.to_string()
    }
}

impl IndexAdapter for VectorAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Vector
    }

    fn add(&self, doc_id: &DocumentId, writes: &[ChunkWrite]) -> Result<(), Error> {
        let mut embeddings = Vec::with_capacity(writes.len());
        for write in writes {
            let embedding = write.embedding.clone().ok_or_else(|| {
                Error::InvalidOptions(format!(
                    "chunk {} has no embedding; vector adapter requires one",
                    write.chunk.id
                ))
            })?;
            if embedding.len() != self.dimensions {
                return Err(Error::InvalidOptions(format!(
                    "embedding has {} dimensions, expected {}",
                    embedding.len(),
                    self.dimensions
                )));
            }
            embeddings.push(embedding);
        }

        let mut wtxn = self.env.write_txn()?;
        let mut ordinals = Vec::with_capacity(writes.len());
        for (write, embedding) in writes.iter().zip(embeddings) {
            let key = Self::entry_key(&write.chunk.id);
            self.vectors.put(
                &mut wtxn,
                &key,
                &VectorEntry { embedding, payload: write.chunk.text.clone() },
            )?;
            ordinals.push(write.chunk.id.ordinal);
        }
        self.doc_ordinals.put(&mut wtxn, doc_id.as_str(), &ordinals)?;
        wtxn.commit()?;
        Ok(())
    }

    fn delete(&self, doc_id: &DocumentId) -> Result<(), Error> {
        let mut wtxn = self.env.write_txn()?;
        if let Some(ordinals) = self.doc_ordinals.get(&wtxn, doc_id.as_str())? {
            for ordinal in ordinals {
                let key = Self::entry_key(&ChunkId::new(doc_id.clone(), ordinal));
                self.vectors.delete(&mut wtxn, &key)?;
            }
        }
        self.doc_ordinals.delete(&mut wtxn, doc_id.as_str())?;
        wtxn.commit()?;
        Ok(())
    }

    fn query(&self, query: &AdapterQuery, top_k: usize, filter: &QueryFilter) -> Result<Vec<Hit>, Error> {
        let AdapterQuery::Embedding(query_vec) = query else {
            return Err(Error::InvalidOptions("vector adapter requires an embedding query".into()));
        };
        if query_vec.len() != self.dimensions {
            return Err(Error::InvalidOptions(format!(
                "query embedding has {} dimensions, expected {}",
                query_vec.len(),
                self.dimensions
            )));
        }

        let rtxn = self.env.read_txn()?;
        let mut candidates = Vec::new();
        for result in self.vectors.iter(&rtxn)? {
            let (key, entry) = result?;
            let chunk_id = parse_chunk_key(key)?;
            if !filter.allows(&chunk_id.doc_id) {
                continue;
            }
            candidates.push((chunk_id, entry));
        }
        drop(rtxn);

        let mut scored: Vec<Hit> = candidates
            .into_par_iter()
            .map(|(chunk_id, entry)| {
                let score = cosine_similarity(query_vec, &entry.embedding);
                Hit { chunk_id, score, payload: entry.payload }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn count(&self, doc_id: Option<&DocumentId>) -> Result<usize, Error> {
        let rtxn = self.env.read_txn()?;
        match doc_id {
            Some(doc_id) => Ok(self.doc_ordinals.get(&rtxn, doc_id.as_str())?.map(|v| v.len()).unwrap_or(0)),
            None => Ok(self.vectors.len(&rtxn)? as usize),
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

fn parse_chunk_key(key: &str) -> Result<ChunkId, Error> {
    let (doc_id, ordinal) = key
        .rsplit_once('#')
        .ok_or_else(|| Error::Consistency { doc_id: key.to_string(), detail: "malformed chunk key".into() })?;
    let ordinal: u32 = ordinal
        .parse()
        .map_err(|_| Error::Consistency { doc_id: key.to_string(), detail: "malformed ordinal".into() })?;
    Ok(ChunkId::new(DocumentId(doc_id.to_string()), ordinal))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use doc_types::{Chunk, ChunkId, ChunkMetadata};

    fn write(doc_id: &DocumentId, ordinal: u32, text: &str, embedding: Vec<f32>) -> ChunkWrite {
        ChunkWrite {
            chunk: Chunk::new(
                ChunkId::new(doc_id.clone(), ordinal),
                text.to_string(),
                ChunkMetadata { ordinal, ..Default::default() },
            ),
            embedding: Some(embedding),
        }
    }

    #[test]
    fn add_query_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorAdapter::open(dir.path(), 2, 1 << 20).unwrap();
        let doc_id = DocumentId("doc-a".into());
        let writes = vec![
            write(&doc_id, 0, "alpha", vec![1.0, 0.0]),
            write(&doc_id, 1, "beta", vec![0.0, 1.0]),
        ];
        adapter.add(&doc_id, &writes).unwrap();

        assert_eq!(adapter.count(Some(&doc_id)).unwrap(), 2);
        assert!(adapter.exists(&doc_id).unwrap());

        let hits = adapter
            .query(&AdapterQuery::Embedding(vec![1.0, 0.0]), 1, &QueryFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id.ordinal, 0);

        adapter.delete(&doc_id).unwrap();
        assert_eq!(adapter.count(Some(&doc_id)).unwrap(), 0);
        assert!(!adapter.exists(&doc_id).unwrap());
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorAdapter::open(dir.path(), 3, 1 << 20).unwrap();
        let doc_id = DocumentId("doc-a".into());
        let writes = vec![write(&doc_id, 0, "alpha", vec![1.0, 0.0])];
        let err = adapter.add(&doc_id, &writes).unwrap_err();
        assert_eq!(err.kind(), doc_types::ErrorKind::Validation);
    }
}
