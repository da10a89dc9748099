use crate::vector::SparseVector;
use serde::{Deserialize, Serialize};

pub type QueryId = u32;

/// Which of a record's vectors a clustering pass compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Clicked result ids, weighted by click frequency.
    Clicks,
    /// Lexical tokens, unit weight each.
    Tokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: QueryId,
    pub text: String,
    pub frequency: u64,
    pub clicks: SparseVector,
    pub tokens: SparseVector,
}

impl QueryRecord {
    pub fn vector(&self, field: Field) -> &SparseVector {
        match field {
            Field::Clicks => &self.clicks,
            Field::Tokens => &self.tokens,
        }
    }
}

/// Every record of a log, indexed by id. Ids are assigned on push in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    records: Vec<QueryRecord>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its id.
    pub fn push(
        &mut self,
        text: impl Into<String>,
        frequency: u64,
        clicks: SparseVector,
        tokens: SparseVector,
    ) -> QueryId {
        let id = self.records.len() as QueryId;
        self.records.push(QueryRecord { id, text: text.into(), frequency, clicks, tokens });
        id
    }

    pub fn get(&self, id: QueryId) -> Option<&QueryRecord> {
        self.records.get(id as usize)
    }

    pub fn ids(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.records.iter().map(|r| r.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
