//! Query templates for recommendation dimensions and entity lookups.
//!
//! Each recommendable [`Dimension`] has four filter tiers, from most to least
//! specific. A tier is a [`Filter`] saying which context values (user,
//! dataset, intent) constrain the history. Generalisation drops context, it
//! never drops the correctness filters of already-resolved ancestors, with
//! one exception: the algorithm tiers that keep the dataset do not filter by
//! intent.
//!
//! | Dimension              | T1    | T2  | T3  | T4     |
//! |------------------------|-------|-----|-----|--------|
//! | Intent                 | U D   | D   | U   | global |
//! | Metric                 | U D I | D I | U I | I      |
//! | Algorithm              | U D   | D   | U I | I      |
//! | PreprocessingAlgorithm | U D I | D I | U I | I      |
//! | PreprocessingFlag      | U D I | D I | U I | I      |
//!
//! Templates only mention `?user`, `?dataset`, `?intent` and `?email`; the
//! concrete values are attached as bindings.

use std::fmt;

use oxigraph::model::{Literal, NamedNode};
use serde::{Deserialize, Serialize};

use crate::store::ParameterizedQuery;
use crate::vocab::Vocabulary;

/// Number of filter tiers per dimension.
pub const TIER_COUNT: usize = 4;

/// Variable holding the resolved value in plurality queries.
pub const VALUE_VAR: &str = "value";

/// Variable holding aggregate counts.
pub const COUNT_VAR: &str = "count";

/// A recommendable configuration dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    Intent,
    Metric,
    Algorithm,
    PreprocessingAlgorithm,
    PreprocessingFlag,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Intent,
        Dimension::Metric,
        Dimension::Algorithm,
        Dimension::PreprocessingAlgorithm,
        Dimension::PreprocessingFlag,
    ];

    /// Filter tiers in strictly decreasing specificity.
    pub const fn tiers(self) -> [Filter; TIER_COUNT] {
        match self {
            Dimension::Intent => [Filter::UD, Filter::D, Filter::U, Filter::GLOBAL],
            Dimension::Algorithm => [Filter::UD, Filter::D, Filter::UI, Filter::I],
            Dimension::Metric
            | Dimension::PreprocessingAlgorithm
            | Dimension::PreprocessingFlag => [Filter::UDI, Filter::DI, Filter::UI, Filter::I],
        }
    }

    /// Whether some tier of this dimension filters by an already-resolved intent.
    pub fn depends_on_intent(self) -> bool {
        self.tiers().iter().any(|f| f.intent)
    }

    /// Patterns linking `?task` to `?value` for plurality dimensions.
    fn value_patterns(self) -> &'static [&'static str] {
        match self {
            Dimension::Intent => &["?task ml:hasIntent ?value ."],
            Dimension::Metric => &[
                "?task ml:hasRequirement ?requirement .",
                "?requirement ml:onMetric ?value .",
            ],
            Dimension::Algorithm => &[
                "?task ml:hasConstraint ?constraint .",
                "?constraint rdf:type ml:ConstraintAlgorithm .",
                "?constraint ml:on ?value .",
            ],
            Dimension::PreprocessingAlgorithm => &[
                "?task ml:hasConstraint ?constraint .",
                "?constraint rdf:type ml:ConstraintPreprocessingAlgorithm .",
                "?constraint ml:on ?value .",
            ],
            // Decided by a ratio, not a plurality pick.
            Dimension::PreprocessingFlag => &[],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Intent => "intent",
            Dimension::Metric => "metric",
            Dimension::Algorithm => "algorithm",
            Dimension::PreprocessingAlgorithm => "preprocessing algorithm",
            Dimension::PreprocessingFlag => "preprocessing flag",
        };
        f.write_str(name)
    }
}

/// Which context values constrain one tier's query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Filter {
    pub user: bool,
    pub dataset: bool,
    pub intent: bool,
}

impl Filter {
    pub const UDI: Filter = Filter::new(true, true, true);
    pub const UD: Filter = Filter::new(true, true, false);
    pub const DI: Filter = Filter::new(false, true, true);
    pub const D: Filter = Filter::new(false, true, false);
    pub const UI: Filter = Filter::new(true, false, true);
    pub const U: Filter = Filter::new(true, false, false);
    pub const I: Filter = Filter::new(false, false, true);
    pub const GLOBAL: Filter = Filter::new(false, false, false);

    pub const fn new(user: bool, dataset: bool, intent: bool) -> Self {
        Self {
            user,
            dataset,
            intent,
        }
    }

    /// Graph patterns tying `?task` to the bound context.
    fn patterns(self) -> Vec<&'static str> {
        let mut patterns = Vec::with_capacity(4);
        if self.user {
            patterns.push("?user ml:runs ?workflow .");
        }
        if self.dataset {
            patterns.push("?workflow ml:hasInput ?dataset .");
        }
        if self.user || self.dataset {
            patterns.push("?workflow ml:achieves ?task .");
        }
        if self.intent {
            patterns.push("?task ml:hasIntent ?intent .");
        }
        patterns
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            (self.user, "user"),
            (self.dataset, "dataset"),
            (self.intent, "intent"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if parts.is_empty() {
            f.write_str("global")
        } else {
            f.write_str(&parts.join("+"))
        }
    }
}

/// The context a resolution runs in, as validated IRIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub user: NamedNode,
    pub dataset: NamedNode,
    pub intent: Option<NamedNode>,
}

impl Context {
    fn bind(&self, mut query: ParameterizedQuery, filter: Filter) -> ParameterizedQuery {
        if filter.user {
            query = query.bind("user", self.user.clone());
        }
        if filter.dataset {
            query = query.bind("dataset", self.dataset.clone());
        }
        if filter.intent {
            debug_assert!(self.intent.is_some(), "intent filter without a resolved intent");
            if let Some(intent) = &self.intent {
                query = query.bind("intent", intent.clone());
            }
        }
        query
    }
}

fn render(vocab: &Vocabulary, select: &str, patterns: &[&str], modifiers: &str) -> String {
    let mut text = vocab.prologue();
    text.push_str("SELECT ");
    text.push_str(select);
    text.push_str("\nWHERE {\n");
    for pattern in patterns {
        text.push_str("    ");
        text.push_str(pattern);
        text.push('\n');
    }
    text.push('}');
    if !modifiers.is_empty() {
        text.push('\n');
        text.push_str(modifiers);
    }
    text
}

// ---------------------------------------------------------------------------
// Recommendation queries
// ---------------------------------------------------------------------------

/// Most frequent value of `dimension` in the history selected by `filter`.
///
/// Ties on the count fall back to the value's IRI order.
pub fn plurality(
    vocab: &Vocabulary,
    dimension: Dimension,
    filter: Filter,
    ctx: &Context,
) -> ParameterizedQuery {
    let mut patterns = filter.patterns();
    patterns.extend_from_slice(dimension.value_patterns());
    let text = render(
        vocab,
        "?value (COUNT(?value) AS ?count)",
        &patterns,
        "GROUP BY ?value\nORDER BY DESC(?count) ?value\nLIMIT 1",
    );
    ctx.bind(ParameterizedQuery::new(text), filter)
}

/// Distinct tasks under the tier's context.
///
/// Grouped by the bound intent so an empty context yields no row at all.
pub fn task_count(vocab: &Vocabulary, filter: Filter, ctx: &Context) -> ParameterizedQuery {
    let text = render(
        vocab,
        "?intent (COUNT(DISTINCT ?task) AS ?count)",
        &filter.patterns(),
        "GROUP BY ?intent",
    );
    ctx.bind(ParameterizedQuery::new(text), filter)
}

/// Distinct tasks under the tier's context that opted out of preprocessing.
pub fn no_preprocessing_count(
    vocab: &Vocabulary,
    filter: Filter,
    ctx: &Context,
) -> ParameterizedQuery {
    let mut patterns = filter.patterns();
    patterns.push("?task ml:hasConstraint ml:ConstraintNoPreprocessing .");
    let text = render(vocab, "(COUNT(DISTINCT ?task) AS ?count)", &patterns, "");
    ctx.bind(ParameterizedQuery::new(text), filter)
}

// ---------------------------------------------------------------------------
// Entity queries
// ---------------------------------------------------------------------------

/// All users.
pub fn users(vocab: &Vocabulary) -> ParameterizedQuery {
    ParameterizedQuery::new(render(
        vocab,
        "DISTINCT ?user",
        &["?user rdf:type ml:User ."],
        "",
    ))
}

/// Users that run at least one workflow.
pub fn users_with_workflows(vocab: &Vocabulary) -> ParameterizedQuery {
    ParameterizedQuery::new(render(
        vocab,
        "DISTINCT ?user",
        &["?user ml:runs ?workflow ."],
        "",
    ))
}

/// Users registered with exactly this email.
pub fn user_by_email(vocab: &Vocabulary, email: &str) -> ParameterizedQuery {
    ParameterizedQuery::new(render(
        vocab,
        "DISTINCT ?user",
        &["?user rdf:type ml:User .", "?user ml:email ?email ."],
        "ORDER BY ?user",
    ))
    .bind("email", Literal::new_simple_literal(email))
}

/// Emails recorded for one user.
pub fn user_emails(vocab: &Vocabulary, user: &NamedNode) -> ParameterizedQuery {
    ParameterizedQuery::new(render(
        vocab,
        "?email",
        &["?user ml:email ?email ."],
        "",
    ))
    .bind("user", user.clone())
}
