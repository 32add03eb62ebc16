//! Tiered resolution of recommended configuration values.
//!
//! For each [`Dimension`] the resolver walks its four filter tiers in order
//! and stops at the first tier whose query returns a row:
//!
//! ```text
//! NOT_FOUND → TRYING(1) → TRYING(2) → TRYING(3) → TRYING(4) → EXHAUSTED
//!                 │            │            │            │
//!                 └────────────┴─── FOUND ──┴────────────┘
//! ```
//!
//! Plurality dimensions take the most frequent value at that tier. The
//! preprocessing flag instead compares how many of the tier's tasks opted out
//! of preprocessing against all of them and only turns preprocessing off when
//! at least half did.
//!
//! The resolver never writes and keeps no state between calls, so one instance
//! can serve any number of concurrent resolutions.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{AdvisorError, AdvisorResult, ResolveError, StoreError};
use crate::query::{self, COUNT_VAR, Context, Dimension, Filter, VALUE_VAR};
use crate::store::{FactStore, Row, StoreResult, Value};
use crate::vocab::Vocabulary;

/// Flag value when no tier has any matching task.
pub const DEFAULT_PREPROCESSING: bool = true;

/// Opt-out share at or above which preprocessing is skipped.
pub const NO_PREPROCESSING_THRESHOLD: f64 = 0.5;

/// Terminal state of one dimension's tier walk.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Tier `tier` (1-based) returned a non-empty result.
    Found { tier: usize, filter: Filter, value: T },
    /// Every tier came back empty.
    Exhausted,
}

impl<T> Outcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Found { value, .. } => Some(value),
            Outcome::Exhausted => None,
        }
    }

    pub fn tier(&self) -> Option<usize> {
        match self {
            Outcome::Found { tier, .. } => Some(*tier),
            Outcome::Exhausted => None,
        }
    }
}

/// A resolved value: a local name for plurality dimensions, a boolean for
/// the preprocessing flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    Name(String),
    Flag(bool),
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Answer::Name(name) => f.write_str(name),
            Answer::Flag(flag) => write!(f, "{flag}"),
        }
    }
}

/// A complete recommended configuration for one (user, dataset) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub user: String,
    pub dataset: String,
    pub intent: String,
    pub metric: String,
    pub algorithm: Option<String>,
    pub preprocessing: bool,
    /// Only resolved when preprocessing is on.
    pub preprocessing_algorithm: Option<String>,
}

/// Decide the preprocessing flag from one tier's counts.
///
/// `None` when the tier has no tasks at all, in which case the caller keeps
/// its default rather than dividing by zero.
pub fn preprocessing_decision(total: u64, opted_out: u64) -> Option<bool> {
    if total == 0 {
        return None;
    }
    let ratio = opted_out as f64 / total as f64;
    Some(ratio < NO_PREPROCESSING_THRESHOLD)
}

/// Read-only tiered resolver over a [`FactStore`].
pub struct Resolver<S> {
    store: S,
    vocab: Vocabulary,
}

impl<S: FactStore> Resolver<S> {
    pub fn new(store: S, vocab: Vocabulary) -> Self {
        Self { store, vocab }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    // -----------------------------------------------------------------------
    // Recommendation API
    // -----------------------------------------------------------------------

    /// Most used intent for this user and dataset.
    pub fn resolve_intent(&self, user: &str, dataset: &str) -> AdvisorResult<String> {
        self.required_name(Dimension::Intent, user, dataset, None)
    }

    /// Most used metric for the intent.
    pub fn resolve_metric(&self, user: &str, dataset: &str, intent: &str) -> AdvisorResult<String> {
        self.required_name(Dimension::Metric, user, dataset, Some(intent))
    }

    /// Most used learning algorithm, or `None` when nothing in the history
    /// constrains one.
    pub fn resolve_algorithm(
        &self,
        user: &str,
        dataset: &str,
        intent: &str,
    ) -> AdvisorResult<Option<String>> {
        let ctx = self.context(user, dataset, Some(intent))?;
        Ok(self.resolve_name(Dimension::Algorithm, &ctx)?.value())
    }

    /// Most used preprocessing algorithm for the intent.
    pub fn resolve_preprocessing_algorithm(
        &self,
        user: &str,
        dataset: &str,
        intent: &str,
    ) -> AdvisorResult<String> {
        self.required_name(Dimension::PreprocessingAlgorithm, user, dataset, Some(intent))
    }

    /// Whether to apply preprocessing. Always resolves: an empty history
    /// yields [`DEFAULT_PREPROCESSING`].
    pub fn resolve_preprocessing_flag(
        &self,
        user: &str,
        dataset: &str,
        intent: &str,
    ) -> AdvisorResult<bool> {
        let ctx = self.context(user, dataset, Some(intent))?;
        let outcome = self.resolve_flag(&ctx)?;
        Ok(outcome.value().unwrap_or(DEFAULT_PREPROCESSING))
    }

    /// Resolve any dimension and report which tier answered.
    ///
    /// `intent` is required for every dimension except [`Dimension::Intent`].
    pub fn resolve(
        &self,
        dimension: Dimension,
        user: &str,
        dataset: &str,
        intent: Option<&str>,
    ) -> AdvisorResult<Outcome<Answer>> {
        if dimension.depends_on_intent() && intent.is_none() {
            return Err(ResolveError::MissingIntent { dimension }.into());
        }
        let ctx = self.context(user, dataset, intent)?;
        let outcome = match dimension {
            Dimension::PreprocessingFlag => match self.resolve_flag(&ctx)? {
                Outcome::Found { tier, filter, value } => Outcome::Found {
                    tier,
                    filter,
                    value: Answer::Flag(value),
                },
                Outcome::Exhausted => Outcome::Exhausted,
            },
            _ => match self.resolve_name(dimension, &ctx)? {
                Outcome::Found { tier, filter, value } => Outcome::Found {
                    tier,
                    filter,
                    value: Answer::Name(value),
                },
                Outcome::Exhausted => Outcome::Exhausted,
            },
        };
        Ok(outcome)
    }

    /// Resolve every dimension for one (user, dataset) pair.
    ///
    /// The intent is resolved first and keys all other dimensions. A missing
    /// preprocessing algorithm does not fail the whole recommendation.
    pub fn recommend(&self, user: &str, dataset: &str) -> AdvisorResult<Recommendation> {
        let intent = self.resolve_intent(user, dataset)?;
        let metric = self.resolve_metric(user, dataset, &intent)?;
        let algorithm = self.resolve_algorithm(user, dataset, &intent)?;
        let preprocessing = self.resolve_preprocessing_flag(user, dataset, &intent)?;

        let preprocessing_algorithm = if preprocessing {
            match self.resolve_preprocessing_algorithm(user, dataset, &intent) {
                Ok(name) => Some(name),
                Err(AdvisorError::Resolve(ResolveError::Unresolvable { .. })) => {
                    tracing::warn!(user, dataset, "no preprocessing algorithm in history");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(Recommendation {
            user: user.to_string(),
            dataset: dataset.to_string(),
            intent,
            metric,
            algorithm,
            preprocessing,
            preprocessing_algorithm,
        })
    }

    /// Recommend for many (user, dataset) pairs in parallel.
    pub fn recommend_batch(
        &self,
        requests: &[(String, String)],
    ) -> Vec<AdvisorResult<Recommendation>> {
        requests
            .par_iter()
            .map(|(user, dataset)| self.recommend(user, dataset))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Tier walk
    // -----------------------------------------------------------------------

    fn context(&self, user: &str, dataset: &str, intent: Option<&str>) -> AdvisorResult<Context> {
        Ok(Context {
            user: self.vocab.entity(user)?,
            dataset: self.vocab.entity(dataset)?,
            intent: intent.map(|i| self.vocab.entity(i)).transpose()?,
        })
    }

    fn required_name(
        &self,
        dimension: Dimension,
        user: &str,
        dataset: &str,
        intent: Option<&str>,
    ) -> AdvisorResult<String> {
        let ctx = self.context(user, dataset, intent)?;
        self.resolve_name(dimension, &ctx)?.value().ok_or_else(|| {
            ResolveError::Unresolvable {
                dimension,
                user: user.to_string(),
                dataset: dataset.to_string(),
            }
            .into()
        })
    }

    /// Walk the tiers of `dimension`, asking `probe` at each one. The first
    /// `Some` wins; store errors stop the walk unchanged.
    fn walk<T>(
        &self,
        dimension: Dimension,
        mut probe: impl FnMut(Filter) -> StoreResult<Option<T>>,
    ) -> StoreResult<Outcome<T>> {
        for (idx, filter) in dimension.tiers().into_iter().enumerate() {
            let tier = idx + 1;
            tracing::debug!(%dimension, tier, %filter, "trying tier");
            if let Some(value) = probe(filter)? {
                tracing::debug!(%dimension, tier, %filter, "resolved");
                return Ok(Outcome::Found {
                    tier,
                    filter,
                    value,
                });
            }
        }
        tracing::info!(%dimension, "all tiers exhausted");
        Ok(Outcome::Exhausted)
    }

    fn resolve_name(&self, dimension: Dimension, ctx: &Context) -> StoreResult<Outcome<String>> {
        self.walk(dimension, |filter| {
            let rows = self
                .store
                .select(&query::plurality(&self.vocab, dimension, filter, ctx))?;
            Ok(rows
                .first()
                .and_then(|row| row.get(VALUE_VAR))
                .and_then(Value::local_name)
                .map(str::to_string))
        })
    }

    /// Flag walk. A tier is populated once its task count returns a row; the
    /// value is `DEFAULT_PREPROCESSING` when that count is zero.
    fn resolve_flag(&self, ctx: &Context) -> StoreResult<Outcome<bool>> {
        self.walk(Dimension::PreprocessingFlag, |filter| {
            let rows = self
                .store
                .select(&query::task_count(&self.vocab, filter, ctx))?;
            let Some(row) = rows.first() else {
                return Ok(None);
            };
            let total = count(row)?;

            let opted_out = self
                .store
                .select(&query::no_preprocessing_count(&self.vocab, filter, ctx))?
                .first()
                .map(count)
                .transpose()?
                .unwrap_or(0);

            let decision = preprocessing_decision(total, opted_out);
            tracing::debug!(%filter, total, opted_out, ?decision, "preprocessing counts");
            Ok(Some(decision.unwrap_or(DEFAULT_PREPROCESSING)))
        })
    }
}

fn count(row: &Row) -> StoreResult<u64> {
    match row.get(COUNT_VAR) {
        None => Ok(0),
        Some(value) => value.as_count().ok_or_else(|| StoreError::Malformed {
            message: format!("count is not a non-negative integer: {value:?}"),
        }),
    }
}

impl<S> std::fmt::Debug for Resolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("namespace", &self.vocab.namespace())
            .finish()
    }
}
