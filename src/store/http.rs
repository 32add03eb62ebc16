//! Remote fact store: a GraphDB / RDF4J repository over its REST protocol.
//!
//! - `GET  {url}/repositories/{repo}?query=…&$var=<term>` for SELECT, with
//!   bindings passed as RDF4J protocol parameters
//! - `POST {url}/repositories/{repo}/statements` with a SPARQL update body,
//!   answered by `204 No Content` on success
//!
//! All calls are blocking and bounded by the configured timeout. A timeout or
//! connection failure surfaces as [`StoreError::Unavailable`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::StoreError;

use super::{FactBatch, FactStore, ParameterizedQuery, Row, StoreResult, Value};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Server base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Repository id.
    pub repository: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            repository: "test-repo".into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`FactStore`] speaking the RDF4J REST protocol.
pub struct HttpStore {
    config: HttpStoreConfig,
    http: ureq::Agent,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Self {
        let http = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, http }
    }

    fn repository_url(&self) -> String {
        format!(
            "{}/repositories/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.repository
        )
    }

    fn statements_url(&self) -> String {
        format!("{}/statements", self.repository_url())
    }
}

impl FactStore for HttpStore {
    fn select(&self, query: &ParameterizedQuery) -> StoreResult<Vec<Row>> {
        let mut request = self
            .http
            .get(&self.repository_url())
            .set("Accept", "application/sparql-results+json")
            .query("query", query.text());
        for (var, term) in query.bindings() {
            request = request.query(&format!("${var}"), &term.to_string());
        }

        match request.call() {
            Ok(resp) => {
                let body: SparqlResults = resp.into_json().map_err(|e| StoreError::Malformed {
                    message: format!("invalid SPARQL JSON results: {e}"),
                })?;
                Ok(body.into_rows())
            }
            Err(ureq::Error::Status(status, resp)) => {
                let message = resp.into_string().unwrap_or_default();
                if status >= 500 {
                    Err(StoreError::Unavailable {
                        message: format!("status {status}: {message}"),
                    })
                } else {
                    Err(StoreError::Query {
                        message: format!("status {status}: {message}"),
                    })
                }
            }
            Err(ureq::Error::Transport(t)) => Err(StoreError::Unavailable {
                message: t.to_string(),
            }),
        }
    }

    fn insert(&self, batch: &FactBatch) -> StoreResult<()> {
        let update = batch.to_update();
        let response = self
            .http
            .post(&self.statements_url())
            .set("Content-Type", "application/sparql-update")
            .send_string(&update);

        match response {
            Ok(resp) if resp.status() == 204 => Ok(()),
            Ok(resp) => {
                let status = resp.status();
                Err(StoreError::MutationRejected {
                    status,
                    message: resp.into_string().unwrap_or_default(),
                })
            }
            Err(ureq::Error::Status(status, resp)) => Err(StoreError::MutationRejected {
                status,
                message: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => Err(StoreError::Unavailable {
                message: t.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore")
            .field("repository_url", &self.repository_url())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SPARQL 1.1 JSON results
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<BTreeMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(default)]
    datatype: Option<String>,
}

impl SparqlResults {
    fn into_rows(self) -> Vec<Row> {
        self.results
            .bindings
            .into_iter()
            .map(|solution| {
                let mut row = Row::new();
                for (var, term) in solution {
                    row.insert(&var, term.into_value());
                }
                row
            })
            .collect()
    }
}

impl SparqlTerm {
    fn into_value(self) -> Value {
        if self.kind == "uri" {
            return Value::Iri(self.value);
        }
        let Some(local) = self.datatype.as_deref().and_then(|dt| dt.strip_prefix(XSD)) else {
            return Value::Text(self.value);
        };
        match local {
            "integer" | "long" | "int" => match self.value.parse() {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::Text(self.value),
            },
            "decimal" | "double" | "float" => match self.value.parse() {
                Ok(f) => Value::Decimal(f),
                Err(_) => Value::Text(self.value),
            },
            _ => Value::Text(self.value),
        }
    }
}
