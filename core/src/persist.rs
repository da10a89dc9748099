use crate::error::{Error, Result};
use crate::index::SearchIndex;
use crate::tokenizer::TokenizerKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_queries: usize,
    pub num_terms: usize,
    pub tokenizer: TokenizerKind,
    pub min_freq: u64,
    pub created_at: String,
    pub version: u32,
}

/// Layout of an index root: one subdirectory per tokenizer.
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn dir(&self, kind: TokenizerKind) -> PathBuf { self.root.join(kind.to_string()) }
    fn index(&self, kind: TokenizerKind) -> PathBuf { self.dir(kind).join("index.bin") }
    fn meta(&self, kind: TokenizerKind) -> PathBuf { self.dir(kind).join("meta.json") }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

pub fn save_search_index(paths: &IndexPaths, index: &SearchIndex, min_freq: u64) -> Result<MetaFile> {
    let kind = index.tokenizer();
    let dir = paths.dir(kind);
    create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let path = paths.index(kind);
    let f = File::create(&path).map_err(|e| Error::io(&path, e))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, index)?;
    w.flush().map_err(|e| Error::io(&path, e))?;

    let meta = MetaFile {
        num_queries: index.len(),
        num_terms: index.postings().len(),
        tokenizer: kind,
        min_freq,
        created_at: now_rfc3339(),
        version: INDEX_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(path = %dir.display(), num_queries = meta.num_queries, "search index saved");
    Ok(meta)
}

pub fn load_search_index(paths: &IndexPaths, kind: TokenizerKind) -> Result<SearchIndex> {
    let meta = load_meta(paths, kind)?;
    if meta.version != INDEX_VERSION {
        return Err(Error::Config(format!(
            "index '{}' has version {}, expected {INDEX_VERSION}",
            kind, meta.version
        )));
    }
    let path = paths.index(kind);
    let f = File::open(&path).map_err(|e| Error::io(&path, e))?;
    let index: SearchIndex = bincode::deserialize_from(BufReader::new(f))?;
    if index.tokenizer() != kind {
        return Err(Error::TokenizerMismatch { index: index.tokenizer().to_string(), ranker: kind.to_string() });
    }
    Ok(index)
}

/// Load every requested tokenizer's index, keyed by tokenizer.
pub fn load_search_indexes(
    paths: &IndexPaths,
    kinds: impl IntoIterator<Item = TokenizerKind>,
) -> Result<HashMap<TokenizerKind, Arc<SearchIndex>>> {
    let mut out = HashMap::new();
    for kind in kinds {
        if out.contains_key(&kind) {
            continue;
        }
        out.insert(kind, Arc::new(load_search_index(paths, kind)?));
    }
    Ok(out)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta(meta.tokenizer);
    let mut f = File::create(&path).map_err(|e| Error::io(&path, e))?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes()).map_err(|e| Error::io(&path, e))?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths, kind: TokenizerKind) -> Result<MetaFile> {
    let path = paths.meta(kind);
    let mut f = File::open(&path).map_err(|e| Error::io(&path, e))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(|e| Error::io(&path, e))?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
