//! End-to-end resolution tests against an embedded store.
//!
//! History is recorded through the registrar, then every dimension is
//! resolved with the real SPARQL templates, so these tests exercise the
//! tier tables, the aggregate queries and the binding mechanism together.

use std::sync::Arc;

use intent_advisor::error::{AdvisorError, ResolveError};
use intent_advisor::query::{Dimension, Filter};
use intent_advisor::registrar::{Registrar, WorkflowRecord};
use intent_advisor::resolve::{Answer, Outcome, Resolver};
use intent_advisor::store::{CachedStore, EmbeddedStore};
use intent_advisor::vocab::Vocabulary;

fn shared_store() -> Arc<EmbeddedStore> {
    Arc::new(EmbeddedStore::in_memory().unwrap())
}

fn workflow(user: &str, dataset: &str, intent: &str, metric: &str) -> WorkflowRecord {
    WorkflowRecord {
        user: user.into(),
        dataset: dataset.into(),
        intent: intent.into(),
        algorithm: None,
        preprocessing_algorithm: None,
        no_preprocessing: false,
        metric: metric.into(),
        metric_value: 0.9,
    }
}

fn record_all(store: &Arc<EmbeddedStore>, records: &[WorkflowRecord]) {
    let registrar = Registrar::new(Arc::clone(store), Vocabulary::default());
    for record in records {
        assert!(registrar.register_workflow(record).unwrap().is_some());
    }
}

fn resolver(store: &Arc<EmbeddedStore>) -> Resolver<Arc<EmbeddedStore>> {
    Resolver::new(Arc::clone(store), Vocabulary::default())
}

fn found(outcome: Outcome<Answer>) -> (usize, Filter, Answer) {
    match outcome {
        Outcome::Found {
            tier,
            filter,
            value,
        } => (tier, filter, value),
        Outcome::Exhausted => panic!("expected a resolved value"),
    }
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

#[test]
fn intent_generalises_to_other_users_of_the_dataset() {
    let store = shared_store();
    record_all(&store, &[workflow("User1", "D1", "Classification", "Accuracy")]);
    let resolver = resolver(&store);

    let (tier, filter, value) = found(
        resolver
            .resolve(Dimension::Intent, "User2", "D1", None)
            .unwrap(),
    );
    assert_eq!(tier, 2);
    assert_eq!(filter, Filter::D);
    assert_eq!(value, Answer::Name("Classification".into()));

    assert_eq!(resolver.resolve_intent("User2", "D1").unwrap(), "Classification");
}

#[test]
fn intent_prefers_own_history_over_majority() {
    let store = shared_store();
    record_all(
        &store,
        &[
            workflow("User1", "D1", "Clustering", "Silhouette"),
            workflow("User2", "D1", "Classification", "Accuracy"),
            workflow("User2", "D1", "Classification", "Accuracy"),
        ],
    );
    let resolver = resolver(&store);

    assert_eq!(resolver.resolve_intent("User1", "D1").unwrap(), "Clustering");
    assert_eq!(resolver.resolve_intent("User3", "D1").unwrap(), "Classification");
}

#[test]
fn intent_uses_user_then_global_history() {
    let store = shared_store();
    record_all(&store, &[workflow("User1", "D1", "Regression", "RMSE")]);
    let resolver = resolver(&store);

    let (tier, filter, _) = found(
        resolver
            .resolve(Dimension::Intent, "User1", "D9", None)
            .unwrap(),
    );
    assert_eq!((tier, filter), (3, Filter::U));

    let (tier, filter, value) = found(
        resolver
            .resolve(Dimension::Intent, "User9", "D9", None)
            .unwrap(),
    );
    assert_eq!((tier, filter), (4, Filter::GLOBAL));
    assert_eq!(value, Answer::Name("Regression".into()));
}

#[test]
fn empty_history_is_unresolvable() {
    let store = shared_store();
    let resolver = resolver(&store);

    let outcome = resolver
        .resolve(Dimension::Intent, "User1", "D1", None)
        .unwrap();
    assert_eq!(outcome, Outcome::Exhausted);

    let err = resolver.resolve_intent("User1", "D1").unwrap_err();
    assert!(matches!(
        err,
        AdvisorError::Resolve(ResolveError::Unresolvable {
            dimension: Dimension::Intent,
            ..
        })
    ));
}

// ---------------------------------------------------------------------------
// Metric and algorithms
// ---------------------------------------------------------------------------

#[test]
fn metric_is_conditioned_on_intent() {
    let store = shared_store();
    record_all(
        &store,
        &[
            workflow("User1", "D1", "Classification", "Accuracy"),
            workflow("User2", "D1", "Classification", "F1"),
            workflow("User2", "D1", "Classification", "F1"),
            workflow("User2", "D1", "Clustering", "Silhouette"),
            workflow("User2", "D1", "Clustering", "Silhouette"),
            workflow("User2", "D1", "Clustering", "Silhouette"),
        ],
    );
    let resolver = resolver(&store);

    assert_eq!(
        resolver.resolve_metric("User1", "D1", "Classification").unwrap(),
        "Accuracy"
    );
    // Silhouette is the dataset-wide favourite but belongs to another intent.
    assert_eq!(
        resolver.resolve_metric("User3", "D1", "Classification").unwrap(),
        "F1"
    );
}

#[test]
fn algorithm_tiers_with_dataset_ignore_intent() {
    let store = shared_store();
    let mut kmeans = workflow("User1", "D1", "Clustering", "Silhouette");
    kmeans.algorithm = Some("KMeans".into());
    record_all(&store, &[kmeans]);
    let resolver = resolver(&store);

    let (tier, filter, value) = found(
        resolver
            .resolve(Dimension::Algorithm, "User1", "D1", Some("Classification"))
            .unwrap(),
    );
    assert_eq!((tier, filter), (1, Filter::UD));
    assert_eq!(value, Answer::Name("KMeans".into()));

    // Off the dataset the intent filter applies, and nothing matches.
    assert_eq!(
        resolver
            .resolve_algorithm("User1", "D2", "Classification")
            .unwrap(),
        None
    );
    assert_eq!(
        resolver.resolve_algorithm("User1", "D2", "Clustering").unwrap(),
        Some("KMeans".into())
    );
}

#[test]
fn preprocessing_algorithm_falls_back_to_intent_tier() {
    let store = shared_store();
    let mut scaled = workflow("User1", "D1", "Classification", "Accuracy");
    scaled.preprocessing_algorithm = Some("Normalization".into());
    record_all(&store, &[scaled]);
    let resolver = resolver(&store);

    let (tier, filter, value) = found(
        resolver
            .resolve(
                Dimension::PreprocessingAlgorithm,
                "User2",
                "D2",
                Some("Classification"),
            )
            .unwrap(),
    );
    assert_eq!((tier, filter), (4, Filter::I));
    assert_eq!(value, Answer::Name("Normalization".into()));
}

#[test]
fn dimensions_after_intent_require_one() {
    let store = shared_store();
    let resolver = resolver(&store);
    let err = resolver
        .resolve(Dimension::Metric, "User1", "D1", None)
        .unwrap_err();
    assert!(matches!(
        err,
        AdvisorError::Resolve(ResolveError::MissingIntent {
            dimension: Dimension::Metric
        })
    ));
}

#[test]
fn invalid_identifier_is_rejected_before_querying() {
    let store = shared_store();
    let resolver = resolver(&store);
    let err = resolver.resolve_intent("User1> . }", "D1").unwrap_err();
    assert!(matches!(err, AdvisorError::Vocab(_)));
}

// ---------------------------------------------------------------------------
// Preprocessing flag
// ---------------------------------------------------------------------------

fn flagged(user: &str, dataset: &str, total: usize, opted_out: usize) -> Vec<WorkflowRecord> {
    (0..total)
        .map(|i| {
            let mut record = workflow(user, dataset, "Classification", "Accuracy");
            record.no_preprocessing = i < opted_out;
            record
        })
        .collect()
}

#[test]
fn preprocessing_defaults_on_without_opt_outs() {
    let store = shared_store();
    record_all(&store, &[workflow("User1", "D1", "Clustering", "Silhouette")]);
    let resolver = resolver(&store);

    assert!(
        resolver
            .resolve_preprocessing_flag("User1", "D1", "Clustering")
            .unwrap()
    );
}

#[test]
fn preprocessing_flag_follows_opt_out_ratio() {
    let cases = [(10, 3, true), (10, 6, false), (10, 5, false), (4, 1, true)];
    for (total, opted_out, expected) in cases {
        let store = shared_store();
        record_all(&store, &flagged("User1", "D1", total, opted_out));
        let resolver = resolver(&store);
        assert_eq!(
            resolver
                .resolve_preprocessing_flag("User1", "D1", "Classification")
                .unwrap(),
            expected,
            "{opted_out} of {total} opted out"
        );
    }
}

#[test]
fn preprocessing_flag_stops_at_first_populated_tier() {
    let store = shared_store();
    // The user's own history on D1 says "skip"; everyone else preprocesses.
    let mut records = flagged("User1", "D1", 2, 2);
    records.extend(flagged("User2", "D1", 6, 0));
    record_all(&store, &records);
    let resolver = resolver(&store);

    let (tier, _, value) = found(
        resolver
            .resolve(
                Dimension::PreprocessingFlag,
                "User1",
                "D1",
                Some("Classification"),
            )
            .unwrap(),
    );
    assert_eq!(tier, 1);
    assert_eq!(value, Answer::Flag(false));

    // A newcomer on D1 inherits the dataset-wide ratio (2 of 8).
    let (tier, filter, value) = found(
        resolver
            .resolve(
                Dimension::PreprocessingFlag,
                "User3",
                "D1",
                Some("Classification"),
            )
            .unwrap(),
    );
    assert_eq!((tier, filter), (2, Filter::DI));
    assert_eq!(value, Answer::Flag(true));
}

#[test]
fn preprocessing_flag_without_history_is_default() {
    let store = shared_store();
    let resolver = resolver(&store);

    assert_eq!(
        resolver
            .resolve(
                Dimension::PreprocessingFlag,
                "User1",
                "D1",
                Some("Classification"),
            )
            .unwrap(),
        Outcome::Exhausted
    );
    assert!(
        resolver
            .resolve_preprocessing_flag("User1", "D1", "Classification")
            .unwrap()
    );
}

// ---------------------------------------------------------------------------
// Full recommendations
// ---------------------------------------------------------------------------

#[test]
fn recommend_fills_every_dimension() {
    let store = shared_store();
    let mut record = workflow("User1", "D1", "Classification", "Accuracy");
    record.algorithm = Some("SVM".into());
    record.preprocessing_algorithm = Some("Normalization".into());
    record_all(&store, &[record]);
    let resolver = resolver(&store);

    let rec = resolver.recommend("User1", "D1").unwrap();
    assert_eq!(rec.intent, "Classification");
    assert_eq!(rec.metric, "Accuracy");
    assert_eq!(rec.algorithm.as_deref(), Some("SVM"));
    assert!(rec.preprocessing);
    assert_eq!(rec.preprocessing_algorithm.as_deref(), Some("Normalization"));
}

#[test]
fn recommend_skips_preprocessing_algorithm_when_opted_out() {
    let store = shared_store();
    let mut record = workflow("User1", "D1", "Classification", "Accuracy");
    record.preprocessing_algorithm = Some("Normalization".into());
    record.no_preprocessing = true;
    record_all(&store, &[record]);
    let resolver = resolver(&store);

    let rec = resolver.recommend("User1", "D1").unwrap();
    assert!(!rec.preprocessing);
    assert_eq!(rec.preprocessing_algorithm, None);
    assert_eq!(rec.algorithm, None);
}

#[test]
fn recommend_tolerates_missing_preprocessing_algorithm() {
    let store = shared_store();
    record_all(&store, &[workflow("User1", "D1", "Classification", "Accuracy")]);
    let resolver = resolver(&store);

    let rec = resolver.recommend("User1", "D1").unwrap();
    assert!(rec.preprocessing);
    assert_eq!(rec.preprocessing_algorithm, None);
}

#[test]
fn recommend_batch_keeps_request_order() {
    let store = shared_store();
    record_all(
        &store,
        &[
            workflow("User1", "D1", "Classification", "Accuracy"),
            workflow("User1", "D2", "Regression", "RMSE"),
        ],
    );
    let resolver = resolver(&store);

    let requests = vec![
        ("User1".to_string(), "D2".to_string()),
        ("User1".to_string(), "D1".to_string()),
        ("not valid".to_string(), "D1".to_string()),
    ];
    let results = resolver.recommend_batch(&requests);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().intent, "Regression");
    assert_eq!(results[1].as_ref().unwrap().intent, "Classification");
    assert!(results[2].is_err());
}

#[test]
fn cached_store_sees_new_history_after_writes() {
    let store = Arc::new(CachedStore::new(EmbeddedStore::in_memory().unwrap()));
    let resolver = Resolver::new(Arc::clone(&store), Vocabulary::default());
    let registrar = Registrar::new(Arc::clone(&store), Vocabulary::default());

    registrar
        .register_workflow(&workflow("User1", "D1", "Classification", "Accuracy"))
        .unwrap();
    assert_eq!(resolver.resolve_intent("User1", "D1").unwrap(), "Classification");
    assert!(!store.is_empty());

    registrar
        .register_workflow(&workflow("User1", "D1", "Clustering", "Silhouette"))
        .unwrap();
    registrar
        .register_workflow(&workflow("User1", "D1", "Clustering", "Silhouette"))
        .unwrap();
    assert_eq!(resolver.resolve_intent("User1", "D1").unwrap(), "Clustering");
}
