use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ogc_client::{
    BatchResponse, FeatureSource, RetrievalState, RetryController, RetryPolicy,
};
use ogc_common::{IdentifierBatch, ObjectId, OgcError, OgcResult};

/// Feature source with scripted gaps.
#[derive(Default)]
struct MockSource {
    calls: Mutex<Vec<Vec<ObjectId>>>,
    /// Dropped from the first response that would contain them.
    drop_once: Mutex<BTreeSet<ObjectId>>,
    /// Never returned.
    always_missing: BTreeSet<ObjectId>,
    /// The first call fails outright.
    fail_first_call: AtomicBool,
    /// Calls with this index or later never complete.
    hang_from_call: Option<usize>,
    /// Earlier batches answer later, to shuffle completion order.
    reverse_delay: bool,
}

impl MockSource {
    fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl FeatureSource for MockSource {
    async fn fetch_batch(&self, batch: &IdentifierBatch) -> OgcResult<BatchResponse> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(batch.ids().to_vec());
            calls.len() - 1
        };

        if self.hang_from_call.is_some_and(|n| call_index >= n) {
            futures::future::pending::<()>().await;
        }
        if self.reverse_delay {
            let first = match batch.ids().first() {
                Some(ObjectId::Int(id)) => *id as u64,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(first / 2))).await;
        }
        if self.fail_first_call.swap(false, Ordering::SeqCst) {
            return Err(OgcError::Transport("connection reset".to_string()));
        }

        let fetched: BTreeSet<ObjectId> = {
            let mut drop_once = self.drop_once.lock().unwrap();
            batch
                .ids()
                .iter()
                .filter(|id| !self.always_missing.contains(*id) && !drop_once.remove(*id))
                .cloned()
                .collect()
        };
        let features = fetched.iter().map(|id| json!({ "id": id })).collect();
        Ok(BatchResponse { features, fetched })
    }
}

fn int_ids(range: std::ops::Range<i64>) -> Vec<ObjectId> {
    range.map(ObjectId::Int).collect()
}

fn id_set(ids: &[i64]) -> BTreeSet<ObjectId> {
    ids.iter().copied().map(ObjectId::Int).collect()
}

fn policy(dir: &Path) -> RetryPolicy {
    RetryPolicy {
        max_batch_size: 1000,
        max_workers: 1,
        disable_retry: false,
        retry_passes: 1,
        persist_failures: true,
        failure_dir: dir.to_path_buf(),
    }
}

#[tokio::test]
async fn test_missing_ids_retried_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        drop_once: Mutex::new(id_set(&[1500, 1501, 1502])),
        ..Default::default()
    };
    let controller = RetryController::new(source, policy(dir.path())).unwrap();

    let report = controller.retrieve_ids(int_ids(0..2500)).await.unwrap();

    assert_eq!(controller.source().call_sizes(), vec![1000, 1000, 500, 3]);
    assert_eq!(report.passes, 2);
    assert!(report.is_complete());
    assert_eq!(report.features.len(), 2500);
    assert!(report.failed_path.is_none());
    assert_eq!(
        report.transitions,
        vec![
            RetrievalState::Collecting,
            RetrievalState::Batching,
            RetrievalState::Fetching,
            RetrievalState::Reconciling,
            RetrievalState::Retrying,
            RetrievalState::Batching,
            RetrievalState::Fetching,
            RetrievalState::Reconciling,
            RetrievalState::Done,
        ]
    );

    let calls = controller.source().calls.lock().unwrap();
    assert_eq!(calls[3], int_ids(1500..1503));
    assert_eq!(report.outcomes[1].missing, id_set(&[1500, 1501, 1502]));
    assert_eq!(report.outcomes[3].pass, 2);
}

#[tokio::test]
async fn test_no_retry_when_complete() {
    let dir = tempfile::tempdir().unwrap();
    let controller = RetryController::new(MockSource::default(), policy(dir.path())).unwrap();

    let report = controller.retrieve_ids(int_ids(0..2500)).await.unwrap();

    assert_eq!(controller.source().call_sizes(), vec![1000, 1000, 500]);
    assert_eq!(report.passes, 1);
    assert!(!report.transitions.contains(&RetrievalState::Retrying));
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_permanently_missing_ids_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        always_missing: id_set(&[1999, 7, 3]),
        ..Default::default()
    };
    let controller = RetryController::new(source, policy(dir.path())).unwrap();

    let report = controller.retrieve_ids(int_ids(0..2500)).await.unwrap();

    assert_eq!(controller.source().call_sizes(), vec![1000, 1000, 500, 3]);
    assert_eq!(report.passes, 2);
    assert_eq!(report.missing, id_set(&[3, 7, 1999]));
    assert!(!report.is_complete());
    assert_eq!(report.features.len(), 2497);

    let path = report.failed_path.expect("failure file");
    assert_eq!(path.parent().unwrap(), dir.path());
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        format!("failed_ids_{}.txt", report.request_id)
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "3\n7\n1999\n");
}

#[tokio::test]
async fn test_disable_retry_skips_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        always_missing: id_set(&[42]),
        ..Default::default()
    };
    let policy = RetryPolicy {
        disable_retry: true,
        ..policy(dir.path())
    };
    let controller = RetryController::new(source, policy).unwrap();

    let report = controller.retrieve_ids(int_ids(0..2500)).await.unwrap();

    assert_eq!(controller.source().call_sizes(), vec![1000, 1000, 500]);
    assert_eq!(report.passes, 1);
    assert_eq!(report.missing, id_set(&[42]));
    let path = report.failed_path.expect("failure file");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "42\n");
}

#[tokio::test]
async fn test_extra_retry_passes() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        always_missing: id_set(&[5]),
        ..Default::default()
    };
    let policy = RetryPolicy {
        max_batch_size: 10,
        retry_passes: 3,
        ..policy(dir.path())
    };
    let controller = RetryController::new(source, policy).unwrap();

    let report = controller.retrieve_ids(int_ids(0..10)).await.unwrap();

    assert_eq!(controller.source().call_sizes(), vec![10, 1, 1, 1]);
    assert_eq!(report.passes, 4);
    assert_eq!(report.missing, id_set(&[5]));
}

#[tokio::test]
async fn test_persistence_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        always_missing: id_set(&[1]),
        ..Default::default()
    };
    let policy = RetryPolicy {
        persist_failures: false,
        ..policy(dir.path())
    };
    let controller = RetryController::new(source, policy).unwrap();

    let report = controller.retrieve_ids(int_ids(0..10)).await.unwrap();

    assert_eq!(report.missing, id_set(&[1]));
    assert!(report.failed_path.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_failed_batch_retried_whole() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        fail_first_call: AtomicBool::new(true),
        ..Default::default()
    };
    let controller = RetryController::new(source, policy(dir.path())).unwrap();

    let report = controller.retrieve_ids(int_ids(0..2500)).await.unwrap();

    assert_eq!(controller.source().call_sizes(), vec![1000, 1000, 500, 1000]);
    assert!(report.is_complete());
    assert!(report.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("connection reset"));
    assert_eq!(report.outcomes[0].missing.len(), 1000);
    assert_eq!(report.features.len(), 2500);
}

#[tokio::test]
async fn test_cancellation_returns_partial_report() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        hang_from_call: Some(1),
        ..Default::default()
    };
    let controller = RetryController::new(source, policy(dir.path())).unwrap();

    let token = controller.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let report = controller.retrieve_ids(int_ids(0..2500)).await.unwrap();

    assert!(report.cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.features.len(), 1000);
    assert_eq!(
        report.missing,
        int_ids(1000..2500).into_iter().collect::<BTreeSet<_>>()
    );
    assert!(report.failed_path.is_none());
    assert_eq!(report.transitions.last(), Some(&RetrievalState::Done));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_concurrent_fetch_keeps_batch_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource {
        reverse_delay: true,
        ..Default::default()
    };
    let policy = RetryPolicy {
        max_batch_size: 10,
        max_workers: 4,
        ..policy(dir.path())
    };
    let controller = RetryController::new(source, policy).unwrap();

    let report = controller.retrieve_ids(int_ids(0..100)).await.unwrap();

    assert!(report.is_complete());
    let firsts: Vec<ObjectId> = report
        .outcomes
        .iter()
        .map(|o| o.batch.ids()[0].clone())
        .collect();
    assert_eq!(firsts, (0..10).map(|i| ObjectId::Int(i * 10)).collect::<Vec<_>>());
    assert_eq!(report.features[0], json!({ "id": 0 }));
}

#[test]
fn test_invalid_policy_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let policy = RetryPolicy {
        max_workers: 0,
        ..policy(dir.path())
    };
    let err = RetryController::new(MockSource::default(), policy).err().unwrap();
    assert!(err.is_invalid_input());
}
