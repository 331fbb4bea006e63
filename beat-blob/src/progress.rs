use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::{UploadEvent, UploadId, UploadJob, UploadProgress};

pub(crate) type JobTable = Arc<RwLock<HashMap<UploadId, UploadJob>>>;

/// Hands byte counts from an object store back to the upload job.
///
/// Reported values only ever move forward and never exceed the total. Once
/// the job reaches a terminal state the reporter goes silent.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<ReporterInner>,
}

struct ReporterInner {
    id: UploadId,
    total: u64,
    state: Mutex<ReporterState>,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
    jobs: Option<JobTable>,
}

#[derive(Default)]
struct ReporterState {
    sent: u64,
    closed: bool,
}

impl ProgressReporter {
    pub(crate) fn new(
        id: UploadId,
        total: u64,
        events: mpsc::UnboundedSender<UploadEvent>,
        jobs: JobTable,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                id,
                total,
                state: Mutex::new(ReporterState::default()),
                events: Some(events),
                jobs: Some(jobs),
            }),
        }
    }

    /// Reporter not attached to any job, for driving a store directly
    pub fn detached(total: u64) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                id: UploadId::new(),
                total,
                state: Mutex::new(ReporterState::default()),
                events: None,
                jobs: None,
            }),
        }
    }

    pub fn total(&self) -> u64 {
        self.inner.total
    }

    pub fn sent(&self) -> u64 {
        self.inner.state.lock().sent
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Record that `bytes_sent` bytes have been transferred
    pub fn report(&self, bytes_sent: u64) {
        let bytes_sent = bytes_sent.min(self.inner.total);
        let mut state = self.inner.state.lock();
        if state.closed || bytes_sent <= state.sent {
            return;
        }
        state.sent = bytes_sent;

        let progress = UploadProgress::new(bytes_sent, self.inner.total);
        if let Some(jobs) = &self.inner.jobs {
            if let Some(job) = jobs.write().get_mut(&self.inner.id) {
                job.progress = progress;
                job.updated_at = Utc::now();
            }
        }
        self.send(UploadEvent::Progress(progress));
    }

    /// Publish the terminal event; nothing is reported afterwards
    pub(crate) fn close_with(&self, event: UploadEvent) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.send(event);
    }

    fn send(&self, event: UploadEvent) {
        if let Some(events) = &self.inner.events {
            // Receiver may have been dropped by an uninterested caller
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_never_moves_backwards_or_past_total() {
        let reporter = ProgressReporter::detached(100);
        reporter.report(40);
        reporter.report(10);
        assert_eq!(reporter.sent(), 40);
        reporter.report(500);
        assert_eq!(reporter.sent(), 100);
    }

    #[test]
    fn test_closed_reporter_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(UploadId::new(), 10, tx, JobTable::default());
        reporter.report(5);
        reporter.close_with(UploadEvent::Canceled);
        reporter.report(10);
        reporter.close_with(UploadEvent::Canceled);

        assert!(matches!(rx.try_recv(), Ok(UploadEvent::Progress(p)) if p.bytes_sent == 5));
        assert!(matches!(rx.try_recv(), Ok(UploadEvent::Canceled)));
        assert!(rx.try_recv().is_err());
    }
}
