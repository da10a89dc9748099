//! Best-match lookup over a [`SearchIndex`].
//!
//! A ranker gathers every indexed query sharing a token with the input,
//! keeps the ones its [`Condition`] admits, scores them with the product of
//! its [`ScoreKind`]s and returns the top one if it passes the eligibility
//! gate. There is no fallback to lower-ranked candidates.
//!
//! Equal scores keep candidate encounter order: query tokens in order, and
//! query ids ascending within a token's posting.

use crate::corpus::QueryId;
use crate::error::{check_unit, Error, Result};
use crate::index::{IndexedQuery, SearchIndex};
use crate::normalize::normalize_query;
use crate::tokenizer::{dedup_tokens, Tokenizer, TokenizerKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Saturation constant of the frequency factor.
pub const TF_K: f64 = 2.0;

/// Candidate text rejected outright when it equals one of these.
pub const DEFAULT_STOP_SUBSTRINGS: &[&str] = &[
    "旗舰店", "当当自营", "货到付款", "外贸原单", "外贸", "原单", "清仓特价", "清仓", "特价",
    "明星同款", "包邮", "新款", "2014", "2015", "2016",
];

/// Admission test applied to each retrieved candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Condition {
    /// Token-set Jaccard strictly above `min`.
    TokenJaccard { min: f64 },
    /// Character-set Jaccard strictly above `min`.
    CharJaccard { min: f64 },
    /// Every query token appears in the candidate.
    Subset,
    /// Conjunction of the inner conditions.
    All { of: Vec<Condition> },
}

impl Condition {
    /// Word-token similarity: token and character Jaccard both above 0.5.
    pub fn segmented() -> Self {
        Condition::All {
            of: vec![Condition::TokenJaccard { min: 0.5 }, Condition::CharJaccard { min: 0.5 }],
        }
    }

    /// Bigram similarity: gram Jaccard above 3/7.
    pub fn ngram() -> Self {
        Condition::TokenJaccard { min: 3.0 / 7.0 }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Condition::TokenJaccard { min } => check_unit("token jaccard", *min).map(drop),
            Condition::CharJaccard { min } => check_unit("char jaccard", *min).map(drop),
            Condition::Subset => Ok(()),
            Condition::All { of } => of.iter().try_for_each(Condition::validate),
        }
    }

    fn admits(&self, probe: &Probe<'_>, candidate: &Candidate<'_>) -> bool {
        match self {
            Condition::TokenJaccard { min } => token_jaccard(probe, candidate) > *min,
            Condition::CharJaccard { min } => char_jaccard(probe, candidate) > *min,
            Condition::Subset => is_subset(probe, candidate),
            Condition::All { of } => of.iter().all(|c| c.admits(probe, candidate)),
        }
    }
}

impl FromStr for Condition {
    type Err = Error;

    /// Preset names: `segmented`, `ngram`, `subset`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "segmented" | "seg" => Ok(Condition::segmented()),
            "ngram" | "gram" => Ok(Condition::ngram()),
            "subset" => Ok(Condition::Subset),
            other => Err(Error::UnknownCondition(other.to_string())),
        }
    }
}

/// Factor multiplied into a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// `f * (k + 1) / (f + k)` over the candidate frequency.
    Tf,
    /// `tf` times the summed idf of the shared tokens.
    Bm25,
    TokenJaccard,
    CharJaccard,
    /// 1 when every query token appears in the candidate, else 0.
    Subset,
}

impl ScoreKind {
    fn score(self, index: &SearchIndex, probe: &Probe<'_>, candidate: &Candidate<'_>) -> f64 {
        match self {
            ScoreKind::Tf => tf(candidate.query.frequency),
            ScoreKind::Bm25 => {
                let idf: f64 = candidate
                    .query
                    .tokens
                    .iter()
                    .filter(|t| probe.tokens.contains(t.as_str()))
                    .map(|t| index.idf(t))
                    .sum();
                tf(candidate.query.frequency) * idf
            }
            ScoreKind::TokenJaccard => token_jaccard(probe, candidate),
            ScoreKind::CharJaccard => char_jaccard(probe, candidate),
            ScoreKind::Subset => {
                if is_subset(probe, candidate) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoreKind::Tf => "tf",
            ScoreKind::Bm25 => "bm25",
            ScoreKind::TokenJaccard => "token_jaccard",
            ScoreKind::CharJaccard => "char_jaccard",
            ScoreKind::Subset => "subset",
        };
        f.write_str(name)
    }
}

impl FromStr for ScoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tf" => Ok(ScoreKind::Tf),
            "bm25" => Ok(ScoreKind::Bm25),
            "token_jaccard" | "jaccard" => Ok(ScoreKind::TokenJaccard),
            "char_jaccard" => Ok(ScoreKind::CharJaccard),
            "subset" => Ok(ScoreKind::Subset),
            other => Err(Error::UnknownScore(other.to_string())),
        }
    }
}

pub fn tf(frequency: u64) -> f64 {
    let f = frequency as f64;
    f * (TF_K + 1.0) / (f + TF_K)
}

fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn token_jaccard(probe: &Probe<'_>, candidate: &Candidate<'_>) -> f64 {
    jaccard(&probe.tokens, &candidate.tokens)
}

fn char_jaccard(probe: &Probe<'_>, candidate: &Candidate<'_>) -> f64 {
    jaccard(&probe.chars, &candidate.chars)
}

fn is_subset(probe: &Probe<'_>, candidate: &Candidate<'_>) -> bool {
    probe.tokens.is_subset(&candidate.tokens)
}

fn char_set(text: &str) -> HashSet<char> {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// The normalized input query.
struct Probe<'a> {
    tokens: HashSet<&'a str>,
    chars: HashSet<char>,
}

struct Candidate<'a> {
    query: &'a IndexedQuery,
    tokens: HashSet<&'a str>,
    chars: HashSet<char>,
}

impl<'a> Candidate<'a> {
    fn new(query: &'a IndexedQuery) -> Self {
        Self {
            query,
            tokens: query.tokens.iter().map(String::as_str).collect(),
            chars: char_set(&query.normalized),
        }
    }
}

/// Final filter on the top-ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub stop_substrings: Vec<String>,
}

impl Default for Eligibility {
    fn default() -> Self {
        Self { stop_substrings: DEFAULT_STOP_SUBSTRINGS.iter().map(|s| s.to_string()).collect() }
    }
}

impl Eligibility {
    pub fn new(stop_substrings: Vec<String>) -> Self {
        Self { stop_substrings }
    }

    /// Rejects short token forms, numbers, bare stop substrings, and a
    /// three-character match for a four-character query. Query length
    /// ignores the spaces normalization keeps between words.
    pub fn is_eligible(&self, normalized_query: &str, candidate: &IndexedQuery) -> bool {
        let joined = candidate.tokens.concat();
        let clean = joined.trim_matches('_');
        let text = candidate.text.trim();
        if clean.chars().count() <= 2 {
            false
        } else if !text.is_empty() && text.chars().all(char::is_numeric) {
            false
        } else if self.stop_substrings.iter().any(|s| s == text) {
            false
        } else {
            let query_len = normalized_query.chars().filter(|c| !c.is_whitespace()).count();
            !(query_len == 4 && text.chars().count() == 3)
        }
    }
}

/// Remove the first occurrence of the first substring of `subs` found in
/// `query`. `None` when none occurs.
pub fn strip_stop_substring(query: &str, subs: &[String]) -> Option<String> {
    subs.iter().filter(|s| !s.is_empty()).find_map(|sub| {
        query.find(sub.as_str()).map(|pos| {
            let mut out = String::with_capacity(query.len());
            out.push_str(&query[..pos]);
            out.push_str(&query[pos + sub.len()..]);
            out
        })
    })
}

/// What a ranker retrieves with and how it filters and scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub name: String,
    pub tokenizer: TokenizerKind,
    pub condition: Condition,
    #[serde(default)]
    pub scores: Vec<ScoreKind>,
}

impl SearchConfig {
    /// Bigram similarity ranked by frequency and gram overlap.
    pub fn gram() -> Self {
        Self {
            name: "gram".into(),
            tokenizer: TokenizerKind::BIGRAM,
            condition: Condition::ngram(),
            scores: vec![ScoreKind::Tf, ScoreKind::TokenJaccard],
        }
    }

    /// Word similarity ranked by frequency and token overlap.
    pub fn seg() -> Self {
        Self {
            name: "seg".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::segmented(),
            scores: vec![ScoreKind::Tf, ScoreKind::TokenJaccard],
        }
    }

    /// Candidates containing every query word, ranked like `seg`.
    pub fn seg_subset() -> Self {
        Self {
            name: "seg-subset".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::Subset,
            scores: vec![ScoreKind::Tf, ScoreKind::TokenJaccard],
        }
    }

    pub fn defaults() -> Vec<SearchConfig> {
        vec![Self::gram(), Self::seg(), Self::seg_subset()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub query_id: QueryId,
    pub text: String,
    pub score: f64,
}

pub struct SearchRanker {
    name: String,
    index: Arc<SearchIndex>,
    tokenizer: Arc<dyn Tokenizer>,
    condition: Condition,
    scores: Vec<ScoreKind>,
    eligibility: Eligibility,
}

impl SearchRanker {
    /// Rebuilds the tokenizer the index was built with.
    pub fn new(index: Arc<SearchIndex>, config: SearchConfig) -> Result<Self> {
        let tokenizer = index
            .tokenizer()
            .build_with_stop_tokens(index.stop_tokens().iter().cloned())?;
        Self::with_tokenizer(index, config, tokenizer)
    }

    /// Uses a caller-supplied tokenizer, which must carry the name of the one
    /// that built the index.
    pub fn with_tokenizer(
        index: Arc<SearchIndex>,
        config: SearchConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        config.condition.validate()?;
        let built_with = index.tokenizer().to_string();
        if config.tokenizer != index.tokenizer() || tokenizer.name() != built_with {
            return Err(Error::TokenizerMismatch { index: built_with, ranker: tokenizer.name() });
        }
        Ok(Self {
            name: config.name,
            index,
            tokenizer,
            condition: config.condition,
            scores: config.scores,
            eligibility: Eligibility::default(),
        })
    }

    /// One ranker per config, each over the index built with its tokenizer.
    pub fn from_configs(
        configs: &[SearchConfig],
        indexes: &HashMap<TokenizerKind, Arc<SearchIndex>>,
        eligibility: &Eligibility,
    ) -> Result<Vec<SearchRanker>> {
        configs
            .iter()
            .map(|config| {
                let index = indexes
                    .get(&config.tokenizer)
                    .ok_or_else(|| Error::MissingIndex(config.tokenizer.to_string()))?;
                Ok(SearchRanker::new(index.clone(), config.clone())?
                    .with_eligibility(eligibility.clone()))
            })
            .collect()
    }

    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Every admitted candidate, best first, before the eligibility gate.
    pub fn rank(&self, query: &str) -> Vec<SearchHit> {
        self.rank_normalized(&normalize_query(query))
    }

    /// Top candidate if it is eligible.
    pub fn search(&self, query: &str) -> Option<SearchHit> {
        let normalized = normalize_query(query);
        let top = self.rank_normalized(&normalized).into_iter().next()?;
        let candidate = self.index.get(top.query_id)?;
        if self.eligibility.is_eligible(&normalized, candidate) {
            Some(top)
        } else {
            tracing::debug!(ranker = %self.name, query, candidate = %top.text, "top candidate not eligible");
            None
        }
    }

    fn rank_normalized(&self, normalized: &str) -> Vec<SearchHit> {
        let tokens = dedup_tokens(self.tokenizer.tokenize(normalized));
        let probe = Probe {
            tokens: tokens.iter().map(String::as_str).collect(),
            chars: char_set(normalized),
        };

        let mut hits = Vec::new();
        for qid in self.index.postings().candidates_for(tokens.iter().map(String::as_str)) {
            let Some(query) = self.index.get(qid) else { continue };
            let candidate = Candidate::new(query);
            if !self.condition.admits(&probe, &candidate) {
                continue;
            }
            let score = self
                .scores
                .iter()
                .fold(1.0, |acc, kind| acc * kind.score(&self.index, &probe, &candidate));
            hits.push(SearchHit { query_id: qid, text: query.text.clone(), score });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchIndexBuilder;

    fn index_of(kind: TokenizerKind, rows: &[(&str, u64)]) -> Arc<SearchIndex> {
        let mut b = SearchIndexBuilder::new(kind).unwrap().min_freq(1);
        for (text, freq) in rows {
            b.add(text, *freq);
        }
        Arc::new(b.build())
    }

    fn subset_only(kind: TokenizerKind) -> SearchConfig {
        SearchConfig { name: "t".into(), tokenizer: kind, condition: Condition::Subset, scores: vec![] }
    }

    #[test]
    fn subset_condition_finds_superset_candidate() {
        let idx = index_of(TokenizerKind::Word, &[("red shoes", 20)]);
        let ranker = SearchRanker::new(idx, subset_only(TokenizerKind::Word)).unwrap();
        let hit = ranker.search("red").unwrap();
        assert_eq!(hit.text, "red shoes");
        assert_eq!(hit.score, 1.0);
    }

    #[test]
    fn short_candidates_fail_the_gate() {
        let idx = index_of(TokenizerKind::Word, &[("r e", 20)]);
        let ranker = SearchRanker::new(idx, subset_only(TokenizerKind::Word)).unwrap();
        assert_eq!(ranker.rank("r").len(), 1);
        assert!(ranker.search("r").is_none());
    }

    #[test]
    fn stop_substring_is_never_returned() {
        let idx = index_of(TokenizerKind::Word, &[("清仓特价", 1000)]);
        let ranker = SearchRanker::new(idx, subset_only(TokenizerKind::Word)).unwrap();
        assert_eq!(ranker.rank("清仓特价").len(), 1);
        assert!(ranker.search("清仓特价").is_none());

        let idx = index_of(TokenizerKind::Word, &[("summer sale", 10)]);
        let ranker = SearchRanker::new(idx, subset_only(TokenizerKind::Word))
            .unwrap()
            .with_eligibility(Eligibility::new(vec!["summer sale".into()]));
        assert!(ranker.search("summer").is_none());
    }

    #[test]
    fn numeric_and_length_heuristics() {
        let e = Eligibility::default();
        let q = |text: &str, tokens: &[&str]| IndexedQuery {
            text: text.into(),
            normalized: text.into(),
            frequency: 1,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        };
        assert!(!e.is_eligible("1234", &q("123456", &["123456"])));
        assert!(!e.is_eligible("abcd", &q("abc", &["abc"])));
        assert!(e.is_eligible("abcde", &q("abc", &["abc"])));
        assert!(!e.is_eligible("xy", &q("ab", &["ab"])));
        assert!(e.is_eligible("abc", &q("abc", &["_a", "ab", "bc", "c_"])));
    }

    #[test]
    fn four_character_query_counts_letters_not_spaces() {
        let e = Eligibility::default();
        let xyz = IndexedQuery {
            text: "xyz".into(),
            normalized: "xyz".into(),
            frequency: 1,
            tokens: vec!["xyz".into()],
        };
        assert!(!e.is_eligible(&normalize_query("ab cd"), &xyz));
        assert!(!e.is_eligible(&normalize_query("a b c d"), &xyz));
        assert!(e.is_eligible(&normalize_query("ab cde"), &xyz));
    }

    #[test]
    fn stop_substring_must_match_the_raw_text() {
        let e = Eligibility::default();
        let q = |text: &str| IndexedQuery {
            text: text.into(),
            normalized: normalize_query(text),
            frequency: 1,
            tokens: vec![normalize_query(text)],
        };
        assert!(!e.is_eligible("清仓特价", &q("清仓特价")));
        assert!(!e.is_eligible("清仓特价", &q(" 清仓特价 ")));
        assert!(e.is_eligible("清仓特价", &q("清仓特价!")));
    }

    #[test]
    fn top_candidate_only_no_fallback() {
        // "ab" outranks "ab cd" on frequency but is too short to return.
        let idx = index_of(TokenizerKind::Word, &[("ab", 100), ("ab cd", 1)]);
        let config = SearchConfig {
            name: "t".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::TokenJaccard { min: 0.0 },
            scores: vec![ScoreKind::Tf],
        };
        let ranker = SearchRanker::new(idx, config).unwrap();
        assert_eq!(ranker.rank("ab x").len(), 2);
        assert_eq!(ranker.rank("ab x")[0].text, "ab");
        assert!(ranker.search("ab x").is_none());
    }

    #[test]
    fn scores_multiply_in_order() {
        let idx = index_of(TokenizerKind::Word, &[("red shoes", 4), ("red hat box", 40)]);
        let config = SearchConfig {
            name: "t".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::TokenJaccard { min: 0.0 },
            scores: vec![ScoreKind::Tf, ScoreKind::TokenJaccard],
        };
        let ranker = SearchRanker::new(idx, config).unwrap();
        let hits = ranker.rank("red shoes");
        assert_eq!(hits[0].text, "red shoes");
        assert!((hits[0].score - tf(4) * 1.0).abs() < 1e-12);
        assert!((hits[1].score - tf(40) * 0.25).abs() < 1e-12);
    }

    #[test]
    fn bm25_sums_idf_over_shared_tokens() {
        let idx = index_of(TokenizerKind::Word, &[("red shoes", 2), ("red hat", 2), ("blue hat", 2)]);
        let config = SearchConfig {
            name: "t".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::TokenJaccard { min: 0.0 },
            scores: vec![ScoreKind::Bm25],
        };
        let ranker = SearchRanker::new(idx.clone(), config).unwrap();
        let hits = ranker.rank("red shoes");
        let expected = tf(2) * (idx.idf("red") + idx.idf("shoes"));
        assert_eq!(hits[0].text, "red shoes");
        assert!((hits[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn segmented_condition_needs_both_overlaps() {
        let idx = index_of(TokenizerKind::Word, &[("red shoes", 5), ("red xyzzyq", 5)]);
        let config = SearchConfig {
            name: "seg".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::segmented(),
            scores: vec![],
        };
        let ranker = SearchRanker::new(idx, config).unwrap();
        let hits = ranker.rank("shoes red");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "red shoes");
    }

    #[test]
    fn bigram_ranker_matches_close_spellings() {
        let idx = index_of(TokenizerKind::BIGRAM, &[("iphone case", 50), ("ipad stand", 50)]);
        let ranker = SearchRanker::new(idx, SearchConfig::gram()).unwrap();
        let hit = ranker.search("iphone cases").unwrap();
        assert_eq!(hit.text, "iphone case");
    }

    #[test]
    fn unknown_tokens_yield_nothing() {
        let idx = index_of(TokenizerKind::Word, &[("red shoes", 20)]);
        let ranker = SearchRanker::new(idx, subset_only(TokenizerKind::Word)).unwrap();
        assert!(ranker.rank("green").is_empty());
        assert!(ranker.search("").is_none());
    }

    #[test]
    fn construction_rejects_bad_configs() {
        let idx = index_of(TokenizerKind::Word, &[("red shoes", 20)]);
        assert!(matches!(
            SearchRanker::new(idx.clone(), SearchConfig::gram()),
            Err(Error::TokenizerMismatch { .. })
        ));
        let bad = SearchConfig {
            condition: Condition::All { of: vec![Condition::CharJaccard { min: 1.5 }] },
            ..SearchConfig::seg()
        };
        assert!(matches!(SearchRanker::new(idx.clone(), bad), Err(Error::InvalidThreshold { .. })));
        assert!(matches!("cosine".parse::<ScoreKind>(), Err(Error::UnknownScore(_))));
        assert!(matches!("fuzzy".parse::<Condition>(), Err(Error::UnknownCondition(_))));

        let indexes = HashMap::from([(TokenizerKind::Word, idx)]);
        let err = SearchRanker::from_configs(&SearchConfig::defaults(), &indexes, &Eligibility::default());
        assert!(matches!(err, Err(Error::MissingIndex(_))));
    }

    #[test]
    fn strips_first_matching_substring() {
        let subs = vec!["旗舰店".to_string()];
        assert_eq!(strip_stop_substring("耐克旗舰店跑鞋", &subs).as_deref(), Some("耐克跑鞋"));
        assert_eq!(strip_stop_substring("耐克跑鞋", &subs), None);
    }
}
