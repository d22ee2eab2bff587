//! Keyword search over user profiles.
//!
//! A free-text query is split into terms (whitespace separated, double-quoted
//! spans kept together) and compiled into a SQL predicate with bound
//! parameters. Every term must appear, case-insensitively, in at least one of
//! the searched fields.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Distinct terms one query may carry. Each term adds a nested `AND` to the
/// predicate and SQLite caps expression depth at 1000.
pub const MAX_TERMS: usize = 32;

static FIND_TERMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|(\S+)"#).expect("term pattern is valid"));

static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"));

/// A searchable profile column. Column names assume the profile query's
/// aliases: `p` for `user_profiles`, `u` for `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Username,
    FirstName,
    LastName,
}

impl SearchField {
    pub const PROFILE: [SearchField; 3] = [
        SearchField::Username,
        SearchField::FirstName,
        SearchField::LastName,
    ];

    fn column(self) -> &'static str {
        match self {
            SearchField::Username => "u.username",
            SearchField::FirstName => "p.first_name",
            SearchField::LastName => "p.last_name",
        }
    }
}

/// A compiled `WHERE` fragment and the values for its `?` placeholders, in
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    clause: String,
    params: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Search is limited to {max} distinct terms; got {count}.")]
pub struct TooManyTerms {
    pub count: usize,
    pub max: usize,
}

impl SearchFilter {
    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// Split a query into search terms. Quotes are stripped from quoted spans and
/// runs of whitespace inside a term collapse to a single space.
pub fn normalize_query(query: &str) -> Vec<String> {
    FIND_TERMS
        .captures_iter(query)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| SPACE_RUNS.replace_all(m.as_str().trim(), " ").into_owned())
        .filter(|term| !term.is_empty())
        .collect()
}

/// Build the predicate for `query` over `fields`. Terms are ORed across fields
/// and ANDed together; repeats that differ only in ASCII case count once.
/// Returns `None` when there is nothing to filter on, which callers treat as
/// "match everything".
pub fn build_filter(
    query: &str,
    fields: &[SearchField],
) -> Result<Option<SearchFilter>, TooManyTerms> {
    if fields.is_empty() {
        return Ok(None);
    }

    let mut seen = HashSet::new();
    let terms: Vec<String> = normalize_query(query)
        .into_iter()
        .filter(|term| seen.insert(term.to_ascii_lowercase()))
        .collect();
    if terms.is_empty() {
        return Ok(None);
    }
    if terms.len() > MAX_TERMS {
        return Err(TooManyTerms {
            count: terms.len(),
            max: MAX_TERMS,
        });
    }

    let mut groups = Vec::with_capacity(terms.len());
    let mut params = Vec::with_capacity(terms.len() * fields.len());

    for term in &terms {
        let pattern = like_pattern(term);
        let any_field: Vec<String> = fields
            .iter()
            .map(|field| format!("{} LIKE ? ESCAPE '\\'", field.column()))
            .collect();
        groups.push(format!("({})", any_field.join(" OR ")));
        params.extend(std::iter::repeat_n(pattern, fields.len()));
    }

    Ok(Some(SearchFilter {
        clause: groups.join(" AND "),
        params,
    }))
}

/// `%term%` with LIKE metacharacters escaped, so the term matches literally.
fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
