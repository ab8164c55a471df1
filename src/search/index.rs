//! Token index for keyword lookups
//!
//! Inverted index from lowercased token to the ids of the rows containing
//! it. Rows are indexed in id order, so every posting list is sorted
//! ascending without any extra work and range queries are binary searches.

use std::collections::{HashMap, HashSet};

/// Inverted index for keyword search over raw event text
#[derive(Debug, Default, Clone)]
pub struct TokenIndex {
    /// token (lowercased) → ascending ids
    postings: HashMap<String, Vec<i64>>,

    /// Number of rows indexed
    indexed_rows: usize,
}

impl TokenIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a single row
    ///
    /// Ids must be passed in strictly increasing order across calls.
    pub fn index_row<I>(&mut self, id: i64, tokens: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        for token in tokens {
            if !seen.insert(token.clone()) {
                continue;
            }
            let posting = self.postings.entry(token).or_default();
            debug_assert!(posting.last().map_or(true, |last| *last < id));
            posting.push(id);
        }
        self.indexed_rows += 1;
    }

    /// Ids in `(after, upto]` whose row contains every token
    ///
    /// A token with no ids in range means nothing can match.
    pub fn candidates(&self, tokens: &[String], after: i64, upto: i64) -> Vec<i64> {
        let mut lists = Vec::with_capacity(tokens.len());
        for token in tokens {
            let list = self.lookup(token, after, upto);
            if list.is_empty() {
                return Vec::new();
            }
            lists.push(list);
        }

        // Walk the shortest list, probe the others
        lists.sort_by_key(|l| l.len());
        let Some((shortest, rest)) = lists.split_first() else {
            return Vec::new();
        };

        shortest
            .iter()
            .copied()
            .filter(|id| rest.iter().all(|l| l.binary_search(id).is_ok()))
            .collect()
    }

    /// Ids in `(after, upto]` that contain `token`
    pub fn lookup(&self, token: &str, after: i64, upto: i64) -> &[i64] {
        self.postings
            .get(&token.to_lowercase())
            .map_or(&[][..], |list| range(list, after, upto))
    }

    /// Get total indexed rows
    pub fn len(&self) -> usize {
        self.indexed_rows
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.indexed_rows == 0
    }

    /// Get index statistics
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            indexed_rows: self.indexed_rows,
            unique_tokens: self.postings.len(),
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed_rows: usize,
    pub unique_tokens: usize,
}

fn range(list: &[i64], after: i64, upto: i64) -> &[i64] {
    let start = list.partition_point(|id| *id <= after);
    let end = list.partition_point(|id| *id <= upto);
    &list[start..end.max(start)]
}

/// Tokenize text into searchable tokens
/// Splits on whitespace and ASCII punctuation, lowercases
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
