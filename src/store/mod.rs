//! Fact store boundary.
//!
//! The advisor reads and appends subject–predicate–object facts through the
//! [`FactStore`] trait. Two backends implement it:
//!
//! - [`EmbeddedStore`]: in-process oxigraph (in-memory or on-disk)
//! - [`HttpStore`]: a GraphDB / RDF4J repository over its REST protocol
//!
//! [`CachedStore`] decorates either with a result cache keyed by the exact
//! query text and bindings.
//!
//! Queries are fixed templates; the values that vary per call (user, dataset,
//! intent, email) travel as [`ParameterizedQuery`] bindings and are never
//! spliced into the template by callers.

pub mod cached;
pub mod embedded;
pub mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use oxigraph::model::{NamedNode, Term};
use regex::Regex;

use crate::error::StoreError;
use crate::vocab;

pub use cached::CachedStore;
pub use embedded::EmbeddedStore;
pub use http::{HttpStore, HttpStoreConfig};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A read/append interface to a graph of facts.
///
/// `select` is read-only. `insert` durably appends a batch as one unit.
/// An empty `Vec` from `select` is a normal outcome, not an error.
pub trait FactStore: Send + Sync {
    /// Evaluate a SELECT query and return its rows in store order.
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>>;

    /// Append a batch of facts.
    ///
    /// When the batch carries a guard, nothing is written if the guard fact is
    /// already present. Callers that need to know must read back.
    fn insert(&self, batch: &FactBatch) -> StoreResult<()>;
}

impl<S: FactStore + ?Sized> FactStore for &S {
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>> {
        (**self).select(query)
    }

    fn insert(&self, batch: &FactBatch) -> StoreResult<()> {
        (**self).insert(batch)
    }
}

impl<S: FactStore + ?Sized> FactStore for Arc<S> {
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>> {
        (**self).select(query)
    }

    fn insert(&self, batch: &FactBatch) -> StoreResult<()> {
        (**self).insert(batch)
    }
}

impl<S: FactStore + ?Sized> FactStore for Box<S> {
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>> {
        (**self).select(query)
    }

    fn insert(&self, batch: &FactBatch) -> StoreResult<()> {
        (**self).insert(batch)
    }
}

// ---------------------------------------------------------------------------
// Result rows
// ---------------------------------------------------------------------------

/// A typed value bound to a query variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Iri(String),
    Text(String),
    Integer(i64),
    Decimal(f64),
}

impl Value {
    /// String form of IRIs and plain literals.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Iri(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a non-negative count.
    ///
    /// Some stores return aggregates as untyped literals, so numeric text is
    /// accepted too.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Integer(n) => u64::try_from(*n).ok(),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Decimal(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
            _ => None,
        }
    }

    /// The value with its namespace stripped.
    pub fn local_name(&self) -> Option<&str> {
        self.as_str().map(vocab::local_name)
    }
}

/// One solution of a SELECT query: variable name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    bindings: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: &str, value: Value) -> Self {
        self.insert(var, value);
        self
    }

    pub fn insert(&mut self, var: &str, value: Value) {
        self.bindings.insert(var.to_string(), value);
    }

    pub fn get(&self, var: &str) -> Option<&Value> {
        self.bindings.get(var)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// A query template plus the values bound to its variables.
///
/// The template must contain a `WHERE {` group; backends that cannot pass
/// bindings out of band inline them there as a `VALUES` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterizedQuery {
    text: String,
    bindings: Vec<(String, Term)>,
}

impl ParameterizedQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bindings: Vec::new(),
        }
    }

    /// Bind `?var` to a term.
    pub fn bind(mut self, var: &str, value: impl Into<Term>) -> Self {
        self.bindings.push((var.to_string(), value.into()));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bindings(&self) -> &[(String, Term)] {
        &self.bindings
    }

    /// Whether `?var` is bound.
    pub fn is_bound(&self, var: &str) -> bool {
        self.bindings.iter().any(|(v, _)| v == var)
    }

    /// The template with its bindings inlined as a `VALUES` block at the top of
    /// the first `WHERE` group. Terms are written with oxigraph's N-Triples
    /// formatter, so IRIs and literals are escaped by construction.
    ///
    /// A bound template without a `WHERE` group is rejected rather than run
    /// unfiltered.
    pub fn with_inline_bindings(&self) -> StoreResult<String> {
        if self.bindings.is_empty() {
            return Ok(self.text.clone());
        }
        let Some(group) = WHERE_GROUP.find(&self.text) else {
            return Err(StoreError::Malformed {
                message: format!(
                    "query binds {} variable(s) but has no WHERE group",
                    self.bindings.len()
                ),
            });
        };
        let vars: Vec<String> = self.bindings.iter().map(|(v, _)| format!("?{v}")).collect();
        let terms: Vec<String> = self.bindings.iter().map(|(_, t)| t.to_string()).collect();
        let split = group.end();
        Ok(format!(
            "{}\n    VALUES ({}) {{ ({}) }}{}",
            &self.text[..split],
            vars.join(" "),
            terms.join(" "),
            &self.text[split..]
        ))
    }
}

/// Opening of a `WHERE` group, in any case and with optional whitespace.
static WHERE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWHERE\s*\{").unwrap());

impl fmt::Display for ParameterizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.with_inline_bindings() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str(&self.text),
        }
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// A single subject–predicate–object statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact {
    pub subject: NamedNode,
    pub predicate: NamedNode,
    pub object: Term,
}

impl Fact {
    pub fn new(subject: NamedNode, predicate: NamedNode, object: impl Into<Term>) -> Self {
        Self {
            subject,
            predicate,
            object: object.into(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Facts written together as one atomic insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactBatch {
    facts: Vec<Fact>,
    guard: Option<Fact>,
}

impl FactBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subject: NamedNode, predicate: NamedNode, object: impl Into<Term>) {
        self.facts.push(Fact::new(subject, predicate, object));
    }

    /// Only write the batch if `guard` is not already in the store.
    pub fn unless_present(mut self, guard: Fact) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn guard(&self) -> Option<&Fact> {
        self.guard.as_ref()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// SPARQL 1.1 update statement for this batch.
    pub fn to_update(&self) -> String {
        let mut body = String::new();
        for fact in &self.facts {
            body.push_str("    ");
            body.push_str(&fact.to_string());
            body.push('\n');
        }
        match &self.guard {
            None => format!("INSERT DATA {{\n{body}}}"),
            Some(guard) => {
                format!("INSERT {{\n{body}}}\nWHERE {{ FILTER NOT EXISTS {{ {guard} }} }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::Literal;

    fn iri(s: &str) -> NamedNode {
        NamedNode::new(format!("http://ns#{s}")).unwrap()
    }

    #[test]
    fn inline_bindings_land_inside_where() {
        let query = ParameterizedQuery::new("SELECT ?x WHERE {\n    ?user <http://ns#runs> ?x .\n}")
            .bind("user", iri("User1"));
        let text = query.with_inline_bindings().unwrap();
        assert!(text.contains("WHERE {\n    VALUES (?user) { (<http://ns#User1>) }"));
        assert!(text.contains("?user <http://ns#runs> ?x"));
    }

    #[test]
    fn inline_bindings_escape_literals() {
        let query = ParameterizedQuery::new("SELECT ?u WHERE { ?u <http://ns#email> ?email }")
            .bind("email", Literal::new_simple_literal("a\" } DROP ALL"));
        let text = query.with_inline_bindings().unwrap();
        assert!(text.contains(r#""a\" } DROP ALL""#));
    }

    #[test]
    fn unbound_query_is_unchanged() {
        let query = ParameterizedQuery::new("SELECT ?s WHERE { ?s ?p ?o }");
        assert_eq!(query.with_inline_bindings().unwrap(), query.text());
        assert!(!query.is_bound("s"));
    }

    #[test]
    fn where_group_is_found_in_any_spelling() {
        for template in [
            "SELECT ?o WHERE{ ?s <http://ns#p> ?o }",
            "SELECT ?o where { ?s <http://ns#p> ?o }",
            "SELECT ?o Where\n{ ?s <http://ns#p> ?o }",
        ] {
            let text = ParameterizedQuery::new(template)
                .bind("s", iri("a"))
                .with_inline_bindings()
                .unwrap();
            assert!(text.contains("VALUES (?s) { (<http://ns#a>) }"), "{text}");
            assert!(text.ends_with("?s <http://ns#p> ?o }"), "{text}");
        }
    }

    #[test]
    fn bound_query_without_where_group_is_malformed() {
        let query = ParameterizedQuery::new("SELECT ?o { ?s <http://ns#p> ?o }").bind("s", iri("a"));
        assert!(matches!(
            query.with_inline_bindings(),
            Err(StoreError::Malformed { .. })
        ));
        // Display still shows something readable.
        assert_eq!(query.to_string(), query.text());
    }

    #[test]
    fn guarded_batch_renders_filter_not_exists() {
        let mut batch = FactBatch::new();
        batch.push(iri("User0"), iri("email"), Literal::new_simple_literal("a@b.c"));
        let batch = batch.unless_present(Fact::new(iri("User0"), iri("type"), iri("User")));
        let update = batch.to_update();
        assert!(update.starts_with("INSERT {"));
        assert!(update.contains("FILTER NOT EXISTS { <http://ns#User0> <http://ns#type> <http://ns#User> . }"));
    }

    #[test]
    fn plain_batch_renders_insert_data() {
        let mut batch = FactBatch::new();
        batch.push(iri("a"), iri("b"), iri("c"));
        assert_eq!(
            batch.to_update(),
            "INSERT DATA {\n    <http://ns#a> <http://ns#b> <http://ns#c> .\n}"
        );
    }

    #[test]
    fn counts_accept_integers_and_numeric_text() {
        assert_eq!(Value::Integer(4).as_count(), Some(4));
        assert_eq!(Value::Text("12".into()).as_count(), Some(12));
        assert_eq!(Value::Integer(-1).as_count(), None);
        assert_eq!(Value::Iri("http://ns#x".into()).as_count(), None);
    }
}
