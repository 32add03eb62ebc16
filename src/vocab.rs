//! Workflow ontology vocabulary.
//!
//! Every entity in the fact store is an IRI `<namespace><localName>`. Callers
//! work with local names (`User3`, `iris`, `Classification`); this module turns
//! them into validated oxigraph terms on the way in and strips the namespace
//! from resolved values on the way out.

use std::sync::LazyLock;

use oxigraph::model::NamedNode;
use regex::Regex;

use crate::error::VocabError;

/// Default namespace of the workflow ontology.
pub const DEFAULT_NAMESPACE: &str = "http://localhost/8080/intentOntology#";

/// Namespace of the DMOP ontology, which owns the `DataSet` class.
pub const DMOP_NAMESPACE: &str = "http://www.e-lico.eu/ontologies/dmo/DMOP/DMOP.owl#";

/// The `rdf:` namespace.
pub const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// Local names used by the workflow ontology.
pub mod names {
    pub const RUNS: &str = "runs";
    pub const HAS_INPUT: &str = "hasInput";
    pub const ACHIEVES: &str = "achieves";
    pub const HAS_INTENT: &str = "hasIntent";
    pub const HAS_CONSTRAINT: &str = "hasConstraint";
    pub const HAS_REQUIREMENT: &str = "hasRequirement";
    pub const ON_METRIC: &str = "onMetric";
    pub const ON: &str = "on";
    pub const WITH_VALUE: &str = "withValue";
    pub const EMAIL: &str = "email";

    pub const USER: &str = "User";
    pub const WORKFLOW: &str = "Workflow";
    pub const TASK: &str = "Task";
    pub const REQUIREMENT: &str = "Requirement";
    pub const CONSTRAINT_ALGORITHM: &str = "ConstraintAlgorithm";
    pub const CONSTRAINT_PREPROCESSING_ALGORITHM: &str = "ConstraintPreprocessingAlgorithm";
    pub const CONSTRAINT_NO_PREPROCESSING: &str = "ConstraintNoPreprocessing";

    /// Class of datasets, in the DMOP namespace.
    pub const DATA_SET: &str = "DataSet";
}

static LOCAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").unwrap());

/// Namespace pair used to build and read entity IRIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    namespace: String,
    dataset_namespace: String,
}

impl Vocabulary {
    /// Build a vocabulary from two namespaces, validating both.
    pub fn new(namespace: &str, dataset_namespace: &str) -> Result<Self, VocabError> {
        validate_namespace(namespace)?;
        validate_namespace(dataset_namespace)?;
        Ok(Self {
            namespace: namespace.to_string(),
            dataset_namespace: dataset_namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dataset_namespace(&self) -> &str {
        &self.dataset_namespace
    }

    /// IRI for a caller-supplied local name (user, dataset, intent, ...).
    pub fn entity(&self, local: &str) -> Result<NamedNode, VocabError> {
        if !LOCAL_NAME.is_match(local) {
            return Err(VocabError::InvalidIdentifier {
                name: local.to_string(),
                message: "not a valid local name".into(),
            });
        }
        NamedNode::new(format!("{}{local}", self.namespace)).map_err(|e| {
            VocabError::InvalidIdentifier {
                name: local.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// IRI for one of the fixed ontology terms in [`names`].
    pub(crate) fn term(&self, local: &'static str) -> NamedNode {
        NamedNode::new_unchecked(format!("{}{local}", self.namespace))
    }

    pub(crate) fn dataset_class(&self) -> NamedNode {
        NamedNode::new_unchecked(format!("{}{}", self.dataset_namespace, names::DATA_SET))
    }

    pub(crate) fn rdf_type(&self) -> NamedNode {
        NamedNode::new_unchecked(format!("{RDF_NAMESPACE}type"))
    }

    /// SPARQL prologue declaring `rdf:`, `ml:` and `dmop:`.
    pub fn prologue(&self) -> String {
        format!(
            "PREFIX rdf: <{RDF_NAMESPACE}>\nPREFIX ml: <{}>\nPREFIX dmop: <{}>\n",
            self.namespace, self.dataset_namespace
        )
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            dataset_namespace: DMOP_NAMESPACE.to_string(),
        }
    }
}

fn validate_namespace(namespace: &str) -> Result<(), VocabError> {
    if !(namespace.ends_with('#') || namespace.ends_with('/')) {
        return Err(VocabError::InvalidNamespace {
            namespace: namespace.to_string(),
            message: "must end with `#` or `/`".into(),
        });
    }
    NamedNode::new(namespace).map_err(|e| VocabError::InvalidNamespace {
        namespace: namespace.to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// Strip the namespace from a fully qualified name.
///
/// Takes the part after the last `#`, or after the last `/` for slash
/// namespaces. Plain local names come back unchanged.
pub fn local_name(iri: &str) -> &str {
    match iri.rfind('#').or_else(|| iri.rfind('/')) {
        Some(idx) => &iri[idx + 1..],
        None => iri,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_name_strips_hash_namespace() {
        assert_eq!(local_name("http://ns#Classification"), "Classification");
        assert_eq!(
            local_name("http://localhost/8080/intentOntology#User12"),
            "User12"
        );
    }

    #[test]
    fn local_name_falls_back_to_slash() {
        assert_eq!(local_name("http://example.org/algo/RandomForest"), "RandomForest");
        assert_eq!(local_name("Accuracy"), "Accuracy");
    }

    #[test]
    fn entity_builds_namespaced_iri() {
        let vocab = Vocabulary::default();
        let node = vocab.entity("User3").unwrap();
        assert_eq!(node.as_str(), "http://localhost/8080/intentOntology#User3");
    }

    #[test]
    fn entity_rejects_injection_attempts() {
        let vocab = Vocabulary::default();
        for bad in ["User1> . ?s ?p ?o", "", "a b", "x}", "-lead", "<iri>"] {
            assert!(
                matches!(vocab.entity(bad), Err(VocabError::InvalidIdentifier { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn namespace_must_end_with_separator() {
        assert!(Vocabulary::new("http://example.org/ns", DMOP_NAMESPACE).is_err());
        assert!(Vocabulary::new("http://example.org/ns#", DMOP_NAMESPACE).is_ok());
        assert!(Vocabulary::new("not an iri#", DMOP_NAMESPACE).is_err());
    }
}
