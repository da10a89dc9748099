//! Readers for the two tab-delimited query logs.
//!
//! Click log, one query per line:
//!
//! ```text
//! query\tfreq|pid\tpos\tfreq[\tpos\tfreq...]|pid\tpos\tfreq...
//! ```
//!
//! Query-frequency log: `query\tfreq`.

use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use crate::vector::SparseVector;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Filters applied to click targets while loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickFilter {
    /// Targets clicked this many times or fewer are dropped.
    pub min_click_freq: u64,
    /// Targets whose normalized weight is at or below this are dropped.
    pub min_click_weight: f64,
}

impl Default for ClickFilter {
    fn default() -> Self {
        Self { min_click_freq: 5, min_click_weight: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickLine {
    pub query: String,
    pub frequency: u64,
    /// (target id, summed click frequency) in line order.
    pub clicks: Vec<(String, u64)>,
}

fn parse_count(field: &str, line: usize, what: &str) -> Result<u64> {
    field.trim().parse().map_err(|_| Error::Parse {
        line,
        reason: format!("invalid {what} '{field}'"),
    })
}

fn split_query_freq(head: &str, line: usize) -> Result<(&str, u64)> {
    let (query, freq) = head.rsplit_once('\t').ok_or_else(|| Error::Parse {
        line,
        reason: "expected 'query<TAB>freq'".into(),
    })?;
    Ok((query, parse_count(freq, line, "query frequency")?))
}

/// Parse one click-log line. A target's frequency is the sum of the
/// frequency columns that follow each position column.
pub fn parse_click_line(raw: &str, line: usize) -> Result<ClickLine> {
    let mut parts = raw.trim_end_matches(['\r', '\n']).split('|');
    let head = parts.next().unwrap_or_default();
    let (query, frequency) = split_query_freq(head, line)?;

    let mut clicks = Vec::new();
    for part in parts {
        let cols: Vec<&str> = part.split('\t').collect();
        let pid = cols[0].trim();
        if pid.is_empty() {
            return Err(Error::Parse { line, reason: "empty click target id".into() });
        }
        let mut total = 0u64;
        for col in cols.iter().skip(2).step_by(2) {
            total = total
                .checked_add(parse_count(col, line, "click frequency")?)
                .ok_or_else(|| Error::Parse { line, reason: format!("click frequency overflow for '{pid}'") })?;
        }
        clicks.push((pid.to_string(), total));
    }
    Ok(ClickLine { query: query.to_string(), frequency, clicks })
}

/// Click vector after the frequency and weight filters, or empty when
/// nothing survives.
pub fn click_vector(clicks: &[(String, u64)], filter: &ClickFilter) -> SparseVector {
    let raw: SparseVector = clicks
        .iter()
        .filter(|(_, freq)| *freq > filter.min_click_freq)
        .map(|(pid, freq)| (pid.as_str(), *freq as f64))
        .collect();
    raw.l2_normalize()
        .retain(|w| w > filter.min_click_weight)
        .l2_normalize()
}

/// Load a click log into a corpus. Lines without a surviving click target
/// carry no behavioral signal and are skipped.
pub fn read_click_log<R: BufRead>(
    reader: R,
    filter: &ClickFilter,
    tokenizer: &dyn Tokenizer,
) -> Result<Corpus> {
    let mut corpus = Corpus::new();
    let mut skipped = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = parse_click_line(&line, n + 1)?;
        let clicks = click_vector(&parsed.clicks, filter);
        if clicks.is_empty() {
            skipped += 1;
            tracing::debug!(line = n + 1, query = %parsed.query, "no usable clicks");
            continue;
        }
        let tokens = SparseVector::from_features(tokenizer.tokenize(&parsed.query));
        corpus.push(parsed.query, parsed.frequency, clicks, tokens);
    }
    tracing::info!(records = corpus.len(), skipped, "click log loaded");
    Ok(corpus)
}

/// Parse one `query<TAB>freq` line.
pub fn parse_query_line(raw: &str, line: usize) -> Result<(String, u64)> {
    let (query, freq) = split_query_freq(raw.trim_end_matches(['\r', '\n']), line)?;
    Ok((query.to_string(), freq))
}

/// All `(query, freq)` pairs of a query-frequency log, blank lines ignored.
pub fn read_query_log<R: BufRead>(reader: R) -> Result<Vec<(String, u64)>> {
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(parse_query_line(&line, n + 1)?);
    }
    Ok(out)
}
