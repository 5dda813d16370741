//! `doc_cli::config::Config`: the admin-surface configuration table (spec
//! §6), serialized to/from TOML the way `meilisearch`'s `Opt` loads from a
//! config file plus CLI overrides, but simplified to a single flat TOML
//! document since there is no HTTP listener layer here to parameterize.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use doc_types::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: usize,
    pub max_attempts: u32,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig { count: 4, max_attempts: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig { size: 1000, overlap: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Seconds. `None` (absent from TOML as `ttl = 0` is not special-cased;
    /// omit the key) means entries never expire by age.
    pub ttl_secs: Option<i64>,
    /// Spec §6 leaves compression an implementer's choice; this build never
    /// compresses cached artifacts, so the knob is accepted and ignored.
    pub compress: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { enabled: true, ttl_secs: None, compress: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimensions: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        VectorConfig { dimensions: 256 }
    }
}

/// Not in the spec §6 table directly, but `KeywordAdapter::open` requires a
/// fixed `(k1, b)` at store-creation time the same way `vector.dimensions`
/// is fixed at vector-store creation; treated as the keyword-side analogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub k1: f64,
    pub b: f64,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        KeywordConfig { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultFusionMethod {
    Rrf,
    Weighted,
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub default_method: DefaultFusionMethod,
    pub alpha: f32,
    pub rrf_k: f64,
    pub consensus_boost: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        HybridConfig { default_method: DefaultFusionMethod::Rrf, alpha: 0.5, rrf_k: 60.0, consensus_boost: 1.1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub base_secs: u64,
    pub per_page_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig { base_secs: 20, per_page_secs: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub registry: PathBuf,
    pub queue: PathBuf,
    pub cache: PathBuf,
    pub vector: PathBuf,
    pub keyword: PathBuf,
    pub fingerprint: PathBuf,
    pub intent_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            registry: PathBuf::from("data/registry"),
            queue: PathBuf::from("data/queue"),
            cache: PathBuf::from("data/registry"),
            vector: PathBuf::from("data/vector"),
            keyword: PathBuf::from("data/keyword"),
            fingerprint: PathBuf::from("data/registry"),
            intent_log: PathBuf::from("data/registry"),
        }
    }
}

/// Whole admin-surface config (spec §6 table), one TOML document per
/// `doc-cli` instance, rewritten in place by `config set`/`config reset`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub workers: WorkersConfig,
    pub chunking: ChunkingConfig,
    pub cache: CacheConfig,
    pub vector: VectorConfig,
    pub keyword: KeywordConfig,
    pub hybrid: HybridConfig,
    pub timeouts: TimeoutsConfig,
    pub paths: PathsConfig,
    /// Not part of the spec table; carried the way `StorageConfig` already
    /// carries it, so cache entries from an old extractor build never hit.
    pub extractor_version: String,
}

impl Config {
    pub fn extractor_version_default() -> String {
        "v1".to_string()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Config { extractor_version: Self::extractor_version_default(), ..Config::default() };
            config.save(path)?;
            return Ok(config);
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::InvalidOptions(format!("malformed config at {}: {e}", path.display())))
    }

    /// Like `load`, but a freshly-created config (no `config.toml` on disk
    /// yet) has every `paths.*` entry anchored under `root` instead of the
    /// bare relative defaults, so `--db-path` alone picks the whole on-disk
    /// tree the way meilitool's `--db-path` does.
    pub fn load_anchored(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let root = root.as_ref();
        let config = Config {
            extractor_version: Self::extractor_version_default(),
            paths: PathsConfig {
                registry: root.join("registry"),
                queue: root.join("queue"),
                cache: root.join("registry"),
                fingerprint: root.join("registry"),
                intent_log: root.join("registry"),
                vector: root.join("vector"),
                keyword: root.join("keyword"),
            },
            ..Config::default()
        };
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidOptions(format!("config is not serializable: {e}")))?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// `config list`: every key, flattened dot-path style, as it would
    /// appear in the spec §6 table. Goes through `serde_json::Value` as a
    /// generic tree representation rather than re-deriving one over `Config`
    /// by hand.
    pub fn list(&self) -> Vec<(String, String)> {
        let value = serde_json::to_value(self).expect("Config always serializes");
        let mut out = Vec::new();
        flatten("", &value, &mut out);
        out.sort();
        out
    }

    /// `config get <key>`: dot-path lookup, e.g. `hybrid.consensus_boost`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.list().into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// `config set <key> <value>`: parses `raw_value` with the same rules a
    /// TOML scalar follows (`true`/`false`, integers, floats, else a bare
    /// string) and writes it into the tree at `key` before re-deserializing
    /// the whole thing back into `Config`, so a malformed value is rejected
    /// before it's ever stored.
    pub fn set(&mut self, key: &str, raw_value: &str) -> Result<(), Error> {
        let mut value = serde_json::to_value(&*self).expect("Config always serializes");
        let parsed = parse_scalar(raw_value);
        set_path(&mut value, key, parsed)
            .ok_or_else(|| Error::InvalidOptions(format!("unknown config key: {key}")))?;
        *self = serde_json::from_value(value)
            .map_err(|e| Error::InvalidOptions(format!("invalid value {raw_value:?} for {key}: {e}")))?;
        Ok(())
    }

    pub fn reset(&mut self) {
        let extractor_version = self.extractor_version.clone();
        *self = Config { extractor_version, ..Config::default() };
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten(&path, v, out);
            }
        }
        other => out.push((prefix.to_string(), other.to_string().trim_matches('"').to_string())),
    }
}

fn set_path(value: &mut serde_json::Value, key: &str, new_value: serde_json::Value) -> Option<()> {
    let mut parts = key.split('.');
    let mut cursor = value;
    let last = parts.next_back()?;
    for part in parts {
        cursor = cursor.as_object_mut()?.get_mut(part)?;
    }
    let map = cursor.as_object_mut()?;
    if !map.contains_key(last) {
        return None;
    }
    map.insert(last.to_string(), new_value);
    Some(())
}

fn parse_scalar(raw: &str) -> serde_json::Value {
    if let Ok(b) = raw.parse::<bool>() {
        serde_json::Value::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        serde_json::Value::Number(i.into())
    } else if let Ok(f) = raw.parse::<f64>() {
        serde_json::Number::from_f64(f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::String(raw.to_string()))
    } else {
        serde_json::Value::String(raw.to_string())
    }
}
