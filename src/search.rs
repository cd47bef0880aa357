//! Boolean query engine
//!
//! Queries are parsed once into a [`SearchQuery`] and compiled into a
//! [`QueryMatcher`], which evaluates one document line at a time.

mod matcher;
mod query;

#[cfg(test)]
mod proptests;

pub use matcher::{Match, QueryMatcher};
pub use query::{parse, QuerySyntaxError, SearchQuery};
