use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::export_error;

/// Registry of background tasks an export run must await before completion.
///
/// Event listeners and sinks spawn work they want finished before the run is declared
/// done, for example uploading table metadata after discovery or flushing buffered
/// rows after a table export. They register the [`JoinHandle`]s here and the export
/// joins them at the appropriate barrier.
///
/// The registry is a cheap to clone handle, so it can travel inside events.
#[derive(Debug, Clone, Default)]
pub struct SideWorkRegistry {
    inner: Arc<Mutex<Vec<JoinHandle<ExportResult<()>>>>>,
}

impl SideWorkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a background task to be awaited at the next join barrier.
    pub fn register(&self, handle: JoinHandle<ExportResult<()>>) {
        lock_handles(&self.inner).push(handle);
    }

    /// Returns whether any unjoined task is registered.
    pub fn is_empty(&self) -> bool {
        lock_handles(&self.inner).is_empty()
    }

    /// Awaits every registered task, draining the registry.
    ///
    /// All tasks are driven to completion even when some fail, and their failures are
    /// collected into a single aggregate error.
    pub async fn join_all(&self) -> ExportResult<()> {
        let handles = {
            let mut handles = lock_handles(&self.inner);
            std::mem::take(&mut *handles)
        };

        let mut errors = Vec::new();
        for result in join_all(handles).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(err) => errors.push(export_error!(
                    ErrorKind::Unknown,
                    "Background task failed to complete",
                    err
                )),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

fn lock_handles(
    inner: &Mutex<Vec<JoinHandle<ExportResult<()>>>>,
) -> std::sync::MutexGuard<'_, Vec<JoinHandle<ExportResult<()>>>> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
