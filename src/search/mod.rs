//! Full-text indexing over raw event text
//!
//! The index answers the keyword part of a query: which rows contain all of
//! a set of tokens. Everything else about a predicate is evaluated by
//! looking at the rows themselves.

mod index;

pub use index::{tokenize, IndexStats, TokenIndex};
