//! # intent-advisor
//!
//! Recommends analytics configurations (intent, metric, algorithm,
//! preprocessing) from the recorded workflow history held in an RDF graph.
//!
//! ## Architecture
//!
//! - **Fact store** (`store`): SELECT and guarded INSERT over a GraphDB/RDF4J
//!   repository (`ureq`) or an embedded oxigraph store, with an optional
//!   query cache
//! - **Queries** (`query`): SPARQL builders for each dimension and tier
//! - **Resolver** (`resolve`): walks the tiers from the most specific filter
//!   to the global one and takes the plurality answer
//! - **Registrar** (`registrar`): allocates user ids and records datasets and
//!   workflows
//! - **Vocabulary** (`vocab`): the ontology namespaces and local names
//!
//! ## Library usage
//!
//! ```no_run
//! use intent_advisor::resolve::Resolver;
//! use intent_advisor::store::{HttpStore, HttpStoreConfig};
//! use intent_advisor::vocab::Vocabulary;
//!
//! let store = HttpStore::new(HttpStoreConfig::default());
//! let resolver = Resolver::new(store, Vocabulary::default());
//! let rec = resolver.recommend("User1", "iris").unwrap();
//! println!("{} via {:?}", rec.intent, rec.algorithm);
//! ```

pub mod config;
pub mod error;
pub mod paths;
pub mod query;
pub mod registrar;
pub mod resolve;
pub mod store;
pub mod vocab;
