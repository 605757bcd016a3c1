// Progress channel - bounded, single-producer event queue the worker
// publishes to and the caller polls.

use crate::sectors::BadSectorRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// Soft queue bound. Lossy events respect it; must-deliver events may push
/// past it since the producer is never allowed to block.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Unresolvable device, permission denial, zero-size target.
    Setup,
    /// Allocation failure or another engine-side fault.
    Internal,
}

/// Events published by a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    Log {
        text: String,
        level: LogLevel,
    },
    Progress {
        percent: f64,
    },
    Speed {
        mbps: f64,
        elapsed_secs: f64,
    },
    BadSector {
        record: BadSectorRecord,
    },
    Completed {
        summary: String,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
    /// Post-run formatting is delegated to an external collaborator; the
    /// engine only announces that it was requested.
    FormatRequested {
        path: PathBuf,
        filesystem: String,
    },
}

impl ProgressEvent {
    /// Speed/Progress samples may be coalesced or dropped under
    /// backpressure; everything else must reach the consumer.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Progress { .. } | ProgressEvent::Speed { .. }
        )
    }
}

/// Bounded event queue with a non-blocking producer and a polling consumer.
///
/// Delivery is in production order. When the queue is at capacity an
/// incoming lossy event replaces the oldest queued lossy event; if none is
/// queued, the incoming sample is dropped. Must-deliver events are always
/// enqueued.
pub struct EventChannel {
    queue: Mutex<VecDeque<ProgressEvent>>,
    capacity: usize,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Producer side. Never blocks.
    pub fn publish(&self, event: ProgressEvent) {
        let mut queue = self.queue.lock().unwrap();

        if event.is_lossy() && queue.len() >= self.capacity {
            match queue.iter().position(|e| e.is_lossy()) {
                Some(stale) => {
                    queue.remove(stale);
                }
                None => return, // nothing evictable, drop the sample
            }
        }

        queue.push_back(event);
    }

    /// Consumer side. Non-blocking; `None` means the queue is momentarily
    /// empty, not that the session ended.
    pub fn poll(&self) -> Option<ProgressEvent> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
