use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{UploadError, UploadEvent, UploadId, UploadOutcome};

/// Handle to a running upload.
///
/// Dropping the task does not stop the transfer; call [`UploadTask::cancel`]
/// for that.
#[derive(Debug)]
pub struct UploadTask {
    id: UploadId,
    key: String,
    path: String,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedReceiver<UploadEvent>>,
    outcome: JoinHandle<UploadOutcome>,
}

impl UploadTask {
    pub(crate) fn new(
        id: UploadId,
        key: String,
        path: String,
        cancel: CancellationToken,
        events: mpsc::UnboundedReceiver<UploadEvent>,
        outcome: JoinHandle<UploadOutcome>,
    ) -> Self {
        Self {
            id,
            key,
            path,
            cancel,
            events: Some(events),
            outcome,
        }
    }

    pub fn id(&self) -> &UploadId {
        &self.id
    }

    /// Sanitized destination file name
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request cancellation; idempotent and a no-op once the job is terminal
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this upload, for callers that hand the task off
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Progress and terminal events. The stream can be taken once; later
    /// calls get an empty stream.
    pub fn events(&mut self) -> BoxStream<'static, UploadEvent> {
        match self.events.take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => stream::empty().boxed(),
        }
    }

    /// Wait for the upload to finish
    pub async fn wait(self) -> UploadOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(error) => UploadOutcome::Failed(UploadError::Unknown {
                detail: error.to_string(),
            }),
        }
    }
}
