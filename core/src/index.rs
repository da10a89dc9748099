use crate::corpus::QueryId;
use crate::error::Result;
use crate::normalize::normalize_query;
use crate::postings::PostingsIndex;
use crate::tokenizer::{dedup_tokens, Tokenizer, TokenizerKind, DEFAULT_STOP_TOKENS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_MIN_FREQ: u64 = 10;

/// One historical query as stored in a search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedQuery {
    pub text: String,
    pub normalized: String,
    pub frequency: u64,
    /// Distinct tokens of `normalized`, first occurrence order.
    pub tokens: Vec<String>,
}

/// Historical queries plus token postings, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    tokenizer: TokenizerKind,
    stop_tokens: Vec<String>,
    queries: Vec<IndexedQuery>,
    postings: PostingsIndex,
}

impl SearchIndex {
    pub fn tokenizer(&self) -> TokenizerKind {
        self.tokenizer
    }

    pub fn stop_tokens(&self) -> &[String] {
        &self.stop_tokens
    }

    pub fn queries(&self) -> &[IndexedQuery] {
        &self.queries
    }

    pub fn get(&self, id: QueryId) -> Option<&IndexedQuery> {
        self.queries.get(id as usize)
    }

    pub fn postings(&self) -> &PostingsIndex {
        &self.postings
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// `log2(N / df + 1)`; 0 for a token the index has never seen.
    pub fn idf(&self, token: &str) -> f64 {
        let df = self.postings.document_frequency(token);
        if df == 0 {
            return 0.0;
        }
        (self.queries.len() as f64 / df as f64 + 1.0).log2()
    }
}

/// 13 digits starting with 9: a book ISBN typed into the search box.
pub fn is_isbn(query: &str) -> bool {
    query.len() == 13 && query.starts_with('9') && query.bytes().all(|b| b.is_ascii_digit())
}

pub struct SearchIndexBuilder {
    kind: TokenizerKind,
    stop_tokens: Vec<String>,
    tokenizer: Arc<dyn Tokenizer>,
    min_freq: u64,
    queries: Vec<IndexedQuery>,
    postings: PostingsIndex,
    skipped: usize,
}

impl SearchIndexBuilder {
    pub fn new(kind: TokenizerKind) -> Result<Self> {
        Self::with_stop_tokens(kind, DEFAULT_STOP_TOKENS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_stop_tokens(kind: TokenizerKind, stop_tokens: Vec<String>) -> Result<Self> {
        let tokenizer = kind.build_with_stop_tokens(stop_tokens.iter().cloned())?;
        Ok(Self {
            kind,
            stop_tokens,
            tokenizer,
            min_freq: DEFAULT_MIN_FREQ,
            queries: Vec::new(),
            postings: PostingsIndex::new(),
            skipped: 0,
        })
    }

    pub fn min_freq(mut self, min_freq: u64) -> Self {
        self.min_freq = min_freq;
        self
    }

    /// Index one query unless it is too rare or an ISBN. Ids are dense over
    /// the kept queries.
    pub fn add(&mut self, text: &str, frequency: u64) -> Option<QueryId> {
        if frequency < self.min_freq || is_isbn(text) {
            self.skipped += 1;
            return None;
        }
        let normalized = normalize_query(text);
        let tokens = dedup_tokens(self.tokenizer.tokenize(&normalized));
        let id = self.queries.len() as QueryId;
        for token in &tokens {
            self.postings.insert(token, id);
        }
        tracing::trace!(id, text, ?tokens, "indexed query");
        self.queries.push(IndexedQuery { text: text.to_string(), normalized, frequency, tokens });
        Some(id)
    }

    pub fn build(self) -> SearchIndex {
        tracing::info!(
            tokenizer = %self.kind,
            num_queries = self.queries.len(),
            num_terms = self.postings.len(),
            skipped = self.skipped,
            "search index built"
        );
        SearchIndex {
            tokenizer: self.kind,
            stop_tokens: self.stop_tokens,
            queries: self.queries,
            postings: self.postings,
        }
    }
}
