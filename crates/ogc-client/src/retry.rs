//! Batched feature retrieval with reconciliation and retry of missing
//! identifiers.
//!
//! One retrieval call moves through these states:
//!
//! ```text
//! Collecting -> Batching -> Fetching -> Reconciling -> Done
//!                  ^                        |
//!                  +-------- Retrying <-----+
//! ```
//!
//! Every pass fetches all pending batches (up to `max_workers` at a time) and
//! only then reconciles. Identifiers still missing after the last permitted
//! pass are returned in the report and, unless suppressed, written to a
//! failure file. Missing identifiers never fail the call.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ogc_common::{IdentifierBatch, ObjectId, OgcError, OgcResult};

use crate::config::ClientConfig;
use crate::ledger::FailureLedger;
use crate::partition::partition_ids;

/// Features returned for one batch and the identifiers they carry.
#[derive(Debug, Clone, Default)]
pub struct BatchResponse {
    pub features: Vec<Value>,
    pub fetched: BTreeSet<ObjectId>,
}

/// Something that can fetch the features of an identifier batch.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn fetch_batch(&self, batch: &IdentifierBatch) -> OgcResult<BatchResponse>;
}

/// Stage of a retrieval call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    Collecting,
    Batching,
    Fetching,
    Reconciling,
    Retrying,
    Done,
}

/// How a retrieval call batches, fans out and retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_batch_size: usize,
    pub max_workers: usize,
    pub disable_retry: bool,
    /// Passes over missing identifiers after the first fetch.
    pub retry_passes: u32,
    pub persist_failures: bool,
    pub failure_dir: PathBuf,
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig, max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            max_workers: config.max_workers,
            disable_retry: config.disable_retry,
            retry_passes: config.retry_passes,
            persist_failures: true,
            failure_dir: config.failure_dir.clone(),
        }
    }

    /// Retry passes actually allowed.
    pub fn retry_budget(&self) -> u32 {
        if self.disable_retry {
            0
        } else {
            self.retry_passes
        }
    }

    fn validate(&self) -> OgcResult<()> {
        if self.max_batch_size == 0 {
            return Err(OgcError::input_value(
                "max_batch_size",
                ["a positive number of records"],
            ));
        }
        if self.max_workers == 0 {
            return Err(OgcError::input_value(
                "max_workers",
                ["a positive number of workers"],
            ));
        }
        Ok(())
    }
}

/// Result of fetching one batch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub batch: IdentifierBatch,
    pub fetched: BTreeSet<ObjectId>,
    /// `batch - fetched`; the whole batch when the request failed.
    pub missing: BTreeSet<ObjectId>,
    pub payload: Vec<Value>,
    pub error: Option<String>,
    /// 1 for the first fetch, 2 for the first retry pass, ...
    pub pass: u32,
}

impl FetchOutcome {
    fn from_result(batch: IdentifierBatch, result: OgcResult<BatchResponse>, pass: u32) -> Self {
        let requested = batch.id_set();
        match result {
            Ok(response) => {
                let fetched: BTreeSet<ObjectId> =
                    requested.intersection(&response.fetched).cloned().collect();
                let missing: BTreeSet<ObjectId> =
                    requested.difference(&fetched).cloned().collect();
                if !missing.is_empty() {
                    debug!(pass, requested = batch.len(), missing = missing.len(), "Batch incomplete");
                }
                Self {
                    batch,
                    fetched,
                    missing,
                    payload: response.features,
                    error: None,
                    pass,
                }
            }
            Err(e) => {
                warn!(pass, batch_size = batch.len(), error = %e, "Batch fetch failed");
                Self {
                    batch,
                    fetched: BTreeSet::new(),
                    missing: requested,
                    payload: Vec::new(),
                    error: Some(e.to_string()),
                    pass,
                }
            }
        }
    }
}

/// Everything a retrieval call produced.
#[derive(Debug)]
pub struct RetrievalReport {
    pub request_id: Uuid,
    /// Features of all completed batches, by pass then batch order.
    pub features: Vec<Value>,
    pub outcomes: Vec<FetchOutcome>,
    /// Identifiers not fetched by any pass.
    pub missing: BTreeSet<ObjectId>,
    /// Failure file, when one was written.
    pub failed_path: Option<PathBuf>,
    pub cancelled: bool,
    pub passes: u32,
    pub transitions: Vec<RetrievalState>,
}

impl RetrievalReport {
    /// True when every identifier was fetched and the call ran to the end.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.missing.is_empty()
    }
}

struct PassResult {
    completed: Vec<FetchOutcome>,
    unfinished: Vec<IdentifierBatch>,
    cancelled: bool,
}

/// Drives one or more retrieval calls against a [`FeatureSource`].
pub struct RetryController<S: FeatureSource> {
    source: S,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: FeatureSource> RetryController<S> {
    pub fn new(source: S, policy: RetryPolicy) -> OgcResult<Self> {
        policy.validate()?;
        Ok(Self {
            source,
            policy,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort in-flight fetches and skip further passes once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Partition raw identifiers and retrieve them.
    pub async fn retrieve_ids<I>(&self, ids: I) -> OgcResult<RetrievalReport>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let batches = partition_ids(ids, self.policy.max_batch_size)?;
        self.retrieve(batches).await
    }

    /// Retrieve pre-partitioned batches.
    pub async fn retrieve(&self, batches: Vec<IdentifierBatch>) -> OgcResult<RetrievalReport> {
        let request_id = Uuid::new_v4();
        let retry_budget = self.policy.retry_budget();

        let mut transitions = vec![RetrievalState::Collecting];
        let mut ledger = FailureLedger::new();
        let mut outcomes = Vec::new();
        let mut passes = 0;
        let mut cancelled = false;

        transitions.push(RetrievalState::Batching);
        let mut pending: Vec<IdentifierBatch> =
            batches.into_iter().filter(|b| !b.is_empty()).collect();

        loop {
            passes += 1;
            transitions.push(RetrievalState::Fetching);
            info!(
                request_id = %request_id,
                pass = passes,
                batches = pending.len(),
                "Fetching batches"
            );

            let pass = self.fetch_pass(pending, passes).await;

            transitions.push(RetrievalState::Reconciling);
            for outcome in &pass.completed {
                for id in &outcome.fetched {
                    ledger.resolve(id);
                }
                for id in &outcome.missing {
                    ledger.record_missing(id.clone(), outcome.error.as_deref());
                }
            }
            outcomes.extend(pass.completed);

            if pass.cancelled {
                cancelled = true;
                for batch in &pass.unfinished {
                    for id in batch.ids() {
                        ledger.record_unattempted(id.clone(), "cancelled before completion");
                    }
                }
                warn!(
                    request_id = %request_id,
                    pass = passes,
                    unfinished_batches = pass.unfinished.len(),
                    "Retrieval cancelled"
                );
                break;
            }

            if ledger.is_empty() || passes > retry_budget {
                break;
            }

            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            transitions.push(RetrievalState::Retrying);
            let missing = ledger.unresolved();
            info!(
                request_id = %request_id,
                pass = passes,
                missing = missing.len(),
                "Retrying missing identifiers"
            );

            transitions.push(RetrievalState::Batching);
            pending = partition_ids(missing, self.policy.max_batch_size)?;
        }

        transitions.push(RetrievalState::Done);

        let missing = ledger.unresolved();
        if !missing.is_empty() {
            counter!("ogc_oid_missing_total").increment(missing.len() as u64);
        }

        let failed_path = if !cancelled && !missing.is_empty() && self.policy.persist_failures {
            match ledger.persist(&self.policy.failure_dir, request_id).await {
                Ok(path) => {
                    warn!(
                        request_id = %request_id,
                        missing = missing.len(),
                        exhausted = ledger.exhausted(retry_budget).len(),
                        path = %path.display(),
                        "Some identifiers could not be fetched"
                    );
                    Some(path)
                }
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Failed to write failure file");
                    None
                }
            }
        } else {
            None
        };

        let features = outcomes
            .iter()
            .flat_map(|outcome| outcome.payload.iter().cloned())
            .collect();

        info!(
            request_id = %request_id,
            passes,
            batches = outcomes.len(),
            missing = missing.len(),
            cancelled,
            "Retrieval finished"
        );

        Ok(RetrievalReport {
            request_id,
            features,
            outcomes,
            missing,
            failed_path,
            cancelled,
            passes,
            transitions,
        })
    }

    /// Fetch all `batches`, keeping outcomes in batch order.
    async fn fetch_pass(&self, batches: Vec<IdentifierBatch>, pass: u32) -> PassResult {
        let mut slots: Vec<Option<FetchOutcome>> = (0..batches.len()).map(|_| None).collect();
        let mut cancelled = false;

        {
            let source = &self.source;
            let mut results = stream::iter(batches.iter().cloned().enumerate())
                .map(|(index, batch)| async move {
                    let result = source.fetch_batch(&batch).await;
                    (index, FetchOutcome::from_result(batch, result, pass))
                })
                .buffer_unordered(self.policy.max_workers);

            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = results.next() => match next {
                        Some((index, outcome)) => slots[index] = Some(outcome),
                        None => break,
                    },
                }
            }
        }

        let mut completed = Vec::new();
        let mut unfinished = Vec::new();
        for (slot, batch) in slots.into_iter().zip(batches) {
            match slot {
                Some(outcome) => completed.push(outcome),
                None => unfinished.push(batch),
            }
        }

        PassResult {
            completed,
            unfinished,
            cancelled,
        }
    }
}
