//! Entity registration: users, datasets, and completed workflows.
//!
//! The registrar is the only writer of the fact store. Everything it writes is
//! appended; nothing is updated or deleted.
//!
//! User ids are `User{N}`. Allocation reads the current maximum, proposes
//! `max + 1`, and writes the new user only if that id is still free. The write
//! is then confirmed by reading the email back, so two registrars racing for
//! the same id (in this process or another) end up with different ids.

use std::fmt;
use std::sync::Mutex;

use oxigraph::model::{Literal, NamedNode};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{AdvisorResult, RegistryError, StoreError};
use crate::query;
use crate::store::{Fact, FactBatch, FactStore, ParameterizedQuery, Value};
use crate::vocab::{Vocabulary, names};

/// Default number of allocation attempts before giving up.
pub const DEFAULT_MAX_ALLOCATION_ATTEMPTS: u32 = 8;

/// Numeric user identifier, rendered as `User{N}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub u64);

impl UserId {
    /// Parse a `User{N}` local name.
    pub fn parse(local: &str) -> Option<Self> {
        let digits = local.strip_prefix(names::USER)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(UserId)
    }

    pub fn next(self) -> Self {
        UserId(self.0 + 1)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", names::USER, self.0)
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The next id after the highest `User{N}` in `users`, or `User0` when there
/// is none. Names that are not `User{N}` are ignored.
pub fn next_user_id<'a>(users: impl IntoIterator<Item = &'a str>) -> UserId {
    users
        .into_iter()
        .filter_map(UserId::parse)
        .max()
        .map(UserId::next)
        .unwrap_or(UserId(0))
}

/// Known users and the id the next registration will try.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserListing {
    pub users: Vec<String>,
    pub next_id: UserId,
}

/// One completed analytics run, as handed over by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub user: String,
    pub dataset: String,
    pub intent: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub preprocessing_algorithm: Option<String>,
    #[serde(default)]
    pub no_preprocessing: bool,
    pub metric: String,
    pub metric_value: f64,
}

/// Appends users, datasets, and workflows to a [`FactStore`].
pub struct Registrar<S> {
    store: S,
    vocab: Vocabulary,
    max_attempts: u32,
    /// Single-writer discipline for id allocation within this registrar.
    allocation: Mutex<()>,
}

impl<S: FactStore> Registrar<S> {
    pub fn new(store: S, vocab: Vocabulary) -> Self {
        Self {
            store,
            vocab,
            max_attempts: DEFAULT_MAX_ALLOCATION_ATTEMPTS,
            allocation: Mutex::new(()),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// All users and the next id to allocate.
    pub fn list_users(&self) -> AdvisorResult<UserListing> {
        let users = self.user_names(&query::users(&self.vocab))?;
        let next_id = next_user_id(users.iter().map(String::as_str));
        Ok(UserListing { users, next_id })
    }

    /// Users that have run at least one workflow.
    pub fn users_with_workflows(&self) -> AdvisorResult<Vec<String>> {
        self.user_names(&query::users_with_workflows(&self.vocab))
    }

    /// First user registered with exactly this email.
    pub fn find_user_by_email(&self, email: &str) -> AdvisorResult<Option<String>> {
        Ok(self
            .user_names(&query::user_by_email(&self.vocab, email))?
            .into_iter()
            .next())
    }

    /// Register a new user and return its freshly allocated id.
    ///
    /// An id is owned by whoever's email it carries. When the candidate id
    /// already exists with this same email, that id is returned: two writers
    /// racing to register one email converge on a single user instead of
    /// one of them failing. Distinct emails never share an id.
    ///
    /// A store that declines the write surfaces as
    /// [`StoreError::MutationRejected`].
    pub fn register_user(&self, email: &str) -> AdvisorResult<UserId> {
        let _allocating = self
            .allocation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut candidate = self.list_users()?.next_id;
        for attempt in 1..=self.max_attempts {
            let user = self.vocab.entity(&candidate.to_string())?;
            let user_class = self.vocab.term(names::USER);

            let mut batch = FactBatch::new();
            batch.push(user.clone(), self.vocab.rdf_type(), user_class.clone());
            batch.push(
                user.clone(),
                self.vocab.term(names::EMAIL),
                Literal::new_simple_literal(email),
            );
            let batch =
                batch.unless_present(Fact::new(user.clone(), self.vocab.rdf_type(), user_class));
            self.store.insert(&batch)?;

            if self.has_email(&user, email)? {
                tracing::info!(user = %candidate, "registered user");
                return Ok(candidate);
            }

            tracing::warn!(user = %candidate, attempt, "user id already taken, retrying");
            candidate = self.list_users()?.next_id.max(candidate.next());
        }

        Err(RegistryError::AllocationConflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Register a dataset. Returns `None` when the store declines the write.
    pub fn register_dataset(&self, name: &str) -> AdvisorResult<Option<String>> {
        let dataset = self.vocab.entity(name)?;
        let mut batch = FactBatch::new();
        batch.push(dataset, self.vocab.rdf_type(), self.vocab.dataset_class());

        if self.insert_or_warn(&batch, "dataset", name)? {
            tracing::info!(dataset = name, "registered dataset");
            Ok(Some(name.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Record a completed workflow as one batch and return its generated name.
    /// Returns `None` when the store declines the write.
    pub fn register_workflow(&self, record: &WorkflowRecord) -> AdvisorResult<Option<String>> {
        let (workflow_name, batch) = self.workflow_batch(record)?;

        if self.insert_or_warn(&batch, "workflow", &workflow_name)? {
            tracing::info!(
                workflow = %workflow_name,
                user = %record.user,
                facts = batch.len(),
                "registered workflow"
            );
            Ok(Some(workflow_name))
        } else {
            Ok(None)
        }
    }

    fn workflow_batch(&self, record: &WorkflowRecord) -> AdvisorResult<(String, FactBatch)> {
        let v = &self.vocab;
        let user = v.entity(&record.user)?;
        let dataset = v.entity(&record.dataset)?;
        let intent = v.entity(&record.intent)?;
        let metric = v.entity(&record.metric)?;
        let algorithm = record.algorithm.as_deref().map(|a| v.entity(a)).transpose()?;
        let preprocessing_algorithm = record
            .preprocessing_algorithm
            .as_deref()
            .map(|a| v.entity(a))
            .transpose()?;

        let suffix = format!("{:016x}", rand::random::<u64>());
        let workflow_name = format!("{}_{suffix}", names::WORKFLOW);
        let node = |kind: &str| -> AdvisorResult<NamedNode> {
            Ok(v.entity(&format!("{kind}_{suffix}"))?)
        };
        let workflow = v.entity(&workflow_name)?;
        let task = node(names::TASK)?;
        let requirement = node(names::REQUIREMENT)?;

        let rdf_type = v.rdf_type();
        let mut batch = FactBatch::new();

        batch.push(user, v.term(names::RUNS), workflow.clone());
        batch.push(workflow.clone(), rdf_type.clone(), v.term(names::WORKFLOW));
        batch.push(workflow.clone(), v.term(names::HAS_INPUT), dataset.clone());
        batch.push(dataset, rdf_type.clone(), v.dataset_class());
        batch.push(workflow, v.term(names::ACHIEVES), task.clone());

        batch.push(task.clone(), rdf_type.clone(), v.term(names::TASK));
        batch.push(task.clone(), v.term(names::HAS_INTENT), intent);

        if let Some(algorithm) = algorithm {
            let constraint = node(names::CONSTRAINT_ALGORITHM)?;
            batch.push(task.clone(), v.term(names::HAS_CONSTRAINT), constraint.clone());
            batch.push(constraint.clone(), rdf_type.clone(), v.term(names::CONSTRAINT_ALGORITHM));
            batch.push(constraint, v.term(names::ON), algorithm);
        }
        if let Some(algorithm) = preprocessing_algorithm {
            let constraint = node(names::CONSTRAINT_PREPROCESSING_ALGORITHM)?;
            batch.push(task.clone(), v.term(names::HAS_CONSTRAINT), constraint.clone());
            batch.push(
                constraint.clone(),
                rdf_type.clone(),
                v.term(names::CONSTRAINT_PREPROCESSING_ALGORITHM),
            );
            batch.push(constraint, v.term(names::ON), algorithm);
        }
        if record.no_preprocessing {
            batch.push(
                task.clone(),
                v.term(names::HAS_CONSTRAINT),
                v.term(names::CONSTRAINT_NO_PREPROCESSING),
            );
        }

        batch.push(task, v.term(names::HAS_REQUIREMENT), requirement.clone());
        batch.push(requirement.clone(), rdf_type, v.term(names::REQUIREMENT));
        batch.push(requirement.clone(), v.term(names::ON_METRIC), metric);
        batch.push(
            requirement,
            v.term(names::WITH_VALUE),
            Literal::from(record.metric_value),
        );

        Ok((workflow_name, batch))
    }

    /// Insert, turning a rejection into a logged `false`. Transport failures
    /// still propagate.
    fn insert_or_warn(&self, batch: &FactBatch, kind: &str, name: &str) -> AdvisorResult<bool> {
        match self.store.insert(batch) {
            Ok(()) => Ok(true),
            Err(StoreError::MutationRejected { status, message }) => {
                tracing::warn!(kind, name, status, %message, "store rejected registration");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn has_email(&self, user: &NamedNode, email: &str) -> AdvisorResult<bool> {
        let rows = self.store.select(&query::user_emails(&self.vocab, user))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("email").and_then(Value::as_str))
            .any(|e| e == email))
    }

    fn user_names(&self, users: &ParameterizedQuery) -> AdvisorResult<Vec<String>> {
        let rows = self.store.select(users)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("user").and_then(Value::local_name))
            .map(str::to_string)
            .collect())
    }
}

impl<S> std::fmt::Debug for Registrar<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("namespace", &self.vocab.namespace())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
