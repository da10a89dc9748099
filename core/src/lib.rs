//! Query-log mining: click-based clustering with lexical regrouping, and
//! best-match query suggestion over an inverted index of past queries.

pub mod cluster;
pub mod config;
pub mod corpus;
pub mod dump;
pub mod error;
pub mod index;
pub mod log;
pub mod normalize;
pub mod persist;
pub mod postings;
pub mod search;
pub mod tokenizer;
pub mod vector;

pub use cluster::{Clustering, HierarchicalGrouper, Hierarchy, IncrementalClusterer};
pub use corpus::{Corpus, Field, QueryId, QueryRecord};
pub use error::{Error, Result};
pub use index::{IndexedQuery, SearchIndex, SearchIndexBuilder};
pub use postings::PostingsIndex;
pub use search::{Condition, ScoreKind, SearchConfig, SearchHit, SearchRanker};
pub use tokenizer::{Tokenizer, TokenizerKind};
pub use vector::SparseVector;
