use std::path::PathBuf;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{EncodeError, Result},
    pipeline::{PipelineController, RunSummary},
    source::FrameSource,
};

/// Runs a whole pipeline on a blocking thread so async callers can await it and stop it.
pub struct EncodeTask {
    cancel: CancellationToken,
}

impl Default for EncodeTask {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeTask {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    pub fn get_cancel(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ends the run after the frame in flight; the stream is still drained and terminated.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Starts the run. `open_source` is called on the blocking thread, so sources that wrap
    /// thread-bound codec handles never cross threads.
    pub fn start<S, F>(
        &self,
        controller: PipelineController,
        open_source: F,
        output: PathBuf,
    ) -> JoinHandle<Result<RunSummary>>
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let controller = controller.with_cancel(self.cancel.clone());
        log::info!(
            "encode task started: {} frames to {}",
            controller.frame_count(),
            output.display()
        );
        tokio::task::spawn_blocking(move || {
            let mut source = open_source()?;
            let summary = controller.run_to_file(&mut source, &output);
            log::info!("encode task finished");
            summary
        })
    }

    /// Awaits a started run, mapping a panicked worker to a capture failure.
    pub async fn join(handle: JoinHandle<Result<RunSummary>>) -> Result<RunSummary> {
        handle
            .await
            .map_err(|e| EncodeError::capture(format!("encode worker: {}", e)))?
    }
}
