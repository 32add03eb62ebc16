//! In-process fact store backed by oxigraph.
//!
//! Useful for tests, single-user setups, and working offline against a
//! snapshot of the workflow history. Bindings are inlined as a `VALUES`
//! block since the store is queried with plain text.

use std::path::Path;
use std::sync::Mutex;

use oxigraph::model::vocab::xsd;
use oxigraph::model::{GraphName, Quad, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::StoreError;

use super::{Fact, FactBatch, FactStore, ParameterizedQuery, Row, StoreResult, Value};

/// Oxigraph-backed [`FactStore`].
pub struct EmbeddedStore {
    store: Store,
    /// Serialises guarded inserts so the presence check and the write are
    /// one step for every writer sharing this store.
    write_lock: Mutex<()>,
}

impl EmbeddedStore {
    /// Create a new in-memory store (no persistence).
    pub fn in_memory() -> StoreResult<Self> {
        let store = Store::new().map_err(|e| StoreError::Unavailable {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self::from_store(store))
    }

    /// Open or create a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Unavailable {
            message: format!("failed to create store directory {}: {e}", path.display()),
        })?;
        let store = Store::open(path).map_err(|e| StoreError::Unavailable {
            message: format!("failed to open oxigraph store at {}: {e}", path.display()),
        })?;
        Ok(Self::from_store(store))
    }

    fn from_store(store: Store) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Number of facts in the store.
    pub fn len(&self) -> StoreResult<usize> {
        self.store.len().map_err(|e| StoreError::Query {
            message: format!("failed to count facts: {e}"),
        })
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|n| n == 0)
    }

    fn to_quad(fact: &Fact) -> Quad {
        Quad::new(
            fact.subject.clone(),
            fact.predicate.clone(),
            fact.object.clone(),
            GraphName::DefaultGraph,
        )
    }
}

impl FactStore for EmbeddedStore {
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>> {
        let sparql = query.with_inline_bindings()?;
        let results = self.store.query(sparql.as_str()).map_err(|e| StoreError::Query {
            message: format!("SPARQL query failed: {e}"),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| StoreError::Query {
                        message: format!("solution error: {e}"),
                    })?;
                    let mut row = Row::new();
                    for (var, term) in solution.iter() {
                        row.insert(var.as_str(), term_to_value(term));
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
            _ => Err(StoreError::Malformed {
                message: "only SELECT queries are supported".into(),
            }),
        }
    }

    fn insert(&self, batch: &FactBatch) -> StoreResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable {
                message: "store write lock poisoned".into(),
            })?;

        if let Some(guard) = batch.guard() {
            let present = self
                .store
                .contains(&Self::to_quad(guard))
                .map_err(|e| StoreError::Query {
                    message: format!("guard check failed: {e}"),
                })?;
            if present {
                tracing::debug!(guard = %guard, "guard present, batch skipped");
                return Ok(());
            }
        }

        let quads: Vec<Quad> = batch.facts().iter().map(Self::to_quad).collect();
        self.store.extend(quads).map_err(|e| StoreError::MutationRejected {
            status: 500,
            message: format!("insert failed: {e}"),
        })?;
        Ok(())
    }
}

fn term_to_value(term: &Term) -> Value {
    match term {
        Term::NamedNode(node) => Value::Iri(node.as_str().to_string()),
        Term::Literal(literal) => {
            let datatype = literal.datatype();
            if datatype == xsd::INTEGER || datatype == xsd::LONG || datatype == xsd::INT {
                literal
                    .value()
                    .parse()
                    .map(Value::Integer)
                    .unwrap_or_else(|_| Value::Text(literal.value().to_string()))
            } else if datatype == xsd::DECIMAL || datatype == xsd::DOUBLE || datatype == xsd::FLOAT
            {
                literal
                    .value()
                    .parse()
                    .map(Value::Decimal)
                    .unwrap_or_else(|_| Value::Text(literal.value().to_string()))
            } else {
                Value::Text(literal.value().to_string())
            }
        }
        other => Value::Text(other.to_string()),
    }
}

impl std::fmt::Debug for EmbeddedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{Literal, NamedNode};

    fn iri(s: &str) -> NamedNode {
        NamedNode::new(format!("http://ns#{s}")).unwrap()
    }

    #[test]
    fn insert_and_select_with_binding() {
        let store = EmbeddedStore::in_memory().unwrap();
        let mut batch = FactBatch::new();
        batch.push(iri("User1"), iri("runs"), iri("Workflow_a"));
        batch.push(iri("User2"), iri("runs"), iri("Workflow_b"));
        store.insert(&batch).unwrap();

        let query = ParameterizedQuery::new("SELECT ?wf WHERE { ?user <http://ns#runs> ?wf }")
            .bind("user", iri("User1"));
        let rows = store.select(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("wf"),
            Some(&Value::Iri("http://ns#Workflow_a".into()))
        );
    }

    #[test]
    fn bindings_apply_to_compact_where_groups() {
        let store = EmbeddedStore::in_memory().unwrap();
        let mut batch = FactBatch::new();
        batch.push(iri("a"), iri("p"), iri("x"));
        batch.push(iri("b"), iri("p"), iri("y"));
        store.insert(&batch).unwrap();

        let query = ParameterizedQuery::new("SELECT ?o WHERE{ ?s <http://ns#p> ?o }")
            .bind("s", iri("a"));
        let rows = store.select(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("o"), Some(&Value::Iri("http://ns#x".into())));

        let no_group = ParameterizedQuery::new("SELECT ?o { ?s <http://ns#p> ?o }")
            .bind("s", iri("a"));
        assert!(matches!(
            store.select(&no_group),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn counts_come_back_as_integers() {
        let store = EmbeddedStore::in_memory().unwrap();
        let mut batch = FactBatch::new();
        batch.push(iri("a"), iri("p"), iri("b"));
        batch.push(iri("a"), iri("p"), iri("c"));
        store.insert(&batch).unwrap();

        let rows = store
            .select(&ParameterizedQuery::new(
                "SELECT (COUNT(?o) AS ?count) WHERE { ?s ?p ?o }",
            ))
            .unwrap();
        assert_eq!(rows[0].get("count").and_then(Value::as_count), Some(2));
    }

    #[test]
    fn guarded_insert_skips_when_guard_present() {
        let store = EmbeddedStore::in_memory().unwrap();
        let guard = Fact::new(iri("User0"), iri("type"), iri("User"));

        let mut first = FactBatch::new();
        first.push(iri("User0"), iri("type"), iri("User"));
        first.push(iri("User0"), iri("email"), Literal::new_simple_literal("a@x.org"));
        store.insert(&first.unless_present(guard.clone())).unwrap();

        let mut second = FactBatch::new();
        second.push(iri("User0"), iri("type"), iri("User"));
        second.push(iri("User0"), iri("email"), Literal::new_simple_literal("b@x.org"));
        store.insert(&second.unless_present(guard)).unwrap();

        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = EmbeddedStore::open(dir.path()).unwrap();
            let mut batch = FactBatch::new();
            batch.push(iri("d"), iri("type"), iri("DataSet"));
            store.insert(&batch).unwrap();
        }
        let store = EmbeddedStore::open(dir.path()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
