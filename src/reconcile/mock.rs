//! Scripted stand-ins for the remote services, shared by the reconcile tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};

use crate::error::SourceError;
use crate::records::{ContainerRecord, SourceRecord};
use crate::source::SourceService;
use crate::target::{CompareResponse, StartSyncResponse, StatusResponse, TargetError, TargetService};

/// One scripted reply. `TargetError` is not `Clone`, so failures are
/// described here and built on demand.
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Ok(T),
    Unreachable,
    Malformed(String),
}

impl<T: Clone> Scripted<T> {
    fn realize(&self) -> Result<T, TargetError> {
        match self {
            Scripted::Ok(v) => Ok(v.clone()),
            Scripted::Unreachable => Err(TargetError::Api {
                status: 503,
                message: "Service Unavailable".into(),
            }),
            Scripted::Malformed(m) => Err(TargetError::Malformed(m.clone())),
        }
    }
}

/// Replays each script in order; the final entry repeats forever.
struct Script<T> {
    queue: Mutex<VecDeque<Scripted<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(default: Scripted<T>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::from([default])),
            calls: AtomicUsize::new(0),
        }
    }

    fn replace(&mut self, items: Vec<Scripted<T>>) {
        *self.queue.get_mut().unwrap() = items.into();
    }

    fn next(&self) -> Result<T, TargetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock().unwrap();
        let item = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("script must not be empty")
        };
        item.realize()
    }
}

pub struct MockTarget {
    compare: Script<CompareResponse>,
    start: Script<StartSyncResponse>,
    status: Script<StatusResponse>,
}

impl MockTarget {
    /// Accepts every job, reports it complete, and compares to nothing outstanding.
    pub fn new() -> Self {
        Self {
            compare: Script::new(Scripted::Ok(comparison(0))),
            start: Script::new(Scripted::Ok(StartSyncResponse {
                success: Some(true),
                error: None,
                job_id: Some("job-1".into()),
            })),
            status: Script::new(Scripted::Ok(status("complete"))),
        }
    }

    pub fn with_compare(mut self, items: Vec<Scripted<CompareResponse>>) -> Self {
        self.compare.replace(items);
        self
    }

    pub fn with_start(mut self, item: Scripted<StartSyncResponse>) -> Self {
        self.start.replace(vec![item]);
        self
    }

    pub fn with_status(mut self, items: Vec<Scripted<StatusResponse>>) -> Self {
        self.status.replace(items);
        self
    }

    pub fn compare_calls(&self) -> usize {
        self.compare.calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start.calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status.calls.load(Ordering::SeqCst)
    }
}

impl TargetService for MockTarget {
    async fn compare(&self, _token: &str, _target_id: &str) -> Result<CompareResponse, TargetError> {
        self.compare.next()
    }

    async fn start_sync(
        &self,
        _token: &str,
        _target_id: &str,
    ) -> Result<StartSyncResponse, TargetError> {
        self.start.next()
    }

    async fn sync_status(
        &self,
        _token: &str,
        _target_id: &str,
        _job_id: Option<&str>,
    ) -> Result<StatusResponse, TargetError> {
        self.status.next()
    }
}

/// A comparison with `outstanding` records spread over one container.
pub fn comparison(outstanding: usize) -> CompareResponse {
    let records: Vec<Value> = (0..outstanding)
        .map(|i| json!({"id": format!("r{i}"), "title": format!("Lab {i}"), "containerId": "1"}))
        .collect();
    CompareResponse {
        comparison: Some(json!({"Biology": {"onlyInSource": records}})),
    }
}

pub fn status(s: &str) -> StatusResponse {
    StatusResponse {
        status: s.to_string(),
        success: None,
        message: None,
    }
}

pub struct MockSource {
    pub containers: Option<Vec<ContainerRecord>>,
    pub records: Vec<SourceRecord>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            containers: Some(vec![ContainerRecord {
                id: "1".into(),
                name: "Biology".into(),
            }]),
            records: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            containers: None,
            ..Self::new()
        }
    }

    pub fn container_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceService for MockSource {
    async fn list_containers(&self, _token: &str) -> Result<Vec<ContainerRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.containers.clone().ok_or_else(|| SourceError::Api {
            status: 500,
            message: "upstream down".into(),
        })
    }

    async fn list_records(
        &self,
        _token: &str,
        _containers: &[ContainerRecord],
    ) -> Result<Vec<SourceRecord>, SourceError> {
        Ok(self.records.clone())
    }
}
