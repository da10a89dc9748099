use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

lazy_static! {
    // A run of CJK ideographs, or a run of letters/digits.
    static ref RE: Regex = Regex::new(r"(?u)\p{Han}+|[[\p{L}\p{N}]&&[^\p{Han}]]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Tokens dropped by the word tokenizer unless overridden.
pub const DEFAULT_STOP_TOKENS: &[&str] = &["的", "与", "第"];

/// Splits text into the lexical units an index or a vector is built from.
pub trait Tokenizer: Send + Sync {
    /// Stable name recorded alongside indexes built with this tokenizer.
    fn name(&self) -> String;

    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Words: CJK runs and alphanumeric runs, minus stop tokens, optionally stemmed.
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    stop_tokens: HashSet<String>,
    stem: bool,
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TOKENS.iter().copied(), false)
    }
}

impl WordTokenizer {
    pub fn new<I, S>(stop_tokens: I, stem: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { stop_tokens: stop_tokens.into_iter().map(Into::into).collect(), stem }
    }

    fn is_stop_token(&self, token: &str) -> bool {
        self.stop_tokens.contains(token)
    }
}

impl Tokenizer for WordTokenizer {
    fn name(&self) -> String {
        if self.stem { "word-stem".into() } else { "word".into() }
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut tokens = Vec::new();
        for mat in RE.find_iter(&lowered) {
            let token = mat.as_str();
            if self.is_stop_token(token) {
                continue;
            }
            if self.stem {
                tokens.push(STEMMER.stem(token).to_string());
            } else {
                tokens.push(token.to_string());
            }
        }
        tokens
    }
}

/// Character n-grams per whitespace-separated chunk, padded with `n - 1`
/// underscores on both sides so chunk edges produce their own grams.
#[derive(Debug, Clone, Copy)]
pub struct NGramTokenizer {
    n: usize,
}

impl NGramTokenizer {
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidNGram(n));
        }
        Ok(Self { n })
    }

    pub fn n(&self) -> usize {
        self.n
    }
}

impl Tokenizer for NGramTokenizer {
    fn name(&self) -> String {
        match self.n {
            2 => "bigram".into(),
            n => format!("{n}gram"),
        }
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let pad = "_".repeat(self.n - 1);
        let mut grams = Vec::new();
        for chunk in text.split_whitespace() {
            let padded: Vec<char> = format!("{pad}{chunk}{pad}").chars().collect();
            for window in padded.windows(self.n) {
                grams.push(window.iter().collect());
            }
        }
        grams
    }
}

/// Serializable tokenizer selector, stored with every persisted index so the
/// searcher can rebuild the exact tokenizer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TokenizerKind {
    Word,
    WordStem,
    NGram { n: usize },
}

impl TokenizerKind {
    pub const BIGRAM: TokenizerKind = TokenizerKind::NGram { n: 2 };

    pub fn build(self) -> Result<Arc<dyn Tokenizer>> {
        self.build_with_stop_tokens(DEFAULT_STOP_TOKENS.iter().copied())
    }

    pub fn build_with_stop_tokens<I, S>(self, stop_tokens: I) -> Result<Arc<dyn Tokenizer>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(match self {
            TokenizerKind::Word => Arc::new(WordTokenizer::new(stop_tokens, false)),
            TokenizerKind::WordStem => Arc::new(WordTokenizer::new(stop_tokens, true)),
            TokenizerKind::NGram { n } => Arc::new(NGramTokenizer::new(n)?),
        })
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerKind::Word => f.write_str("word"),
            TokenizerKind::WordStem => f.write_str("word-stem"),
            TokenizerKind::NGram { n: 2 } => f.write_str("bigram"),
            TokenizerKind::NGram { n } => write!(f, "{n}gram"),
        }
    }
}

impl FromStr for TokenizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "word" | "seg" => Ok(TokenizerKind::Word),
            "word-stem" => Ok(TokenizerKind::WordStem),
            "bigram" => Ok(TokenizerKind::BIGRAM),
            other => other
                .strip_suffix("gram")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(|n| TokenizerKind::NGram { n })
                .ok_or_else(|| Error::UnknownTokenizer(other.to_string())),
        }
    }
}

impl TryFrom<String> for TokenizerKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TokenizerKind> for String {
    fn from(kind: TokenizerKind) -> String {
        kind.to_string()
    }
}

/// Distinct tokens, first occurrence order.
pub fn dedup_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
