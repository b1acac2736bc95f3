use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Reference counted flow control shared between a source driver and row consumers.
///
/// Row handlers and sinks call [`FlowHandle::pause`] when they are temporarily unable
/// to accept more rows and [`FlowHandle::resume`] once they can. Requests are counted,
/// so overlapping pause requests from independent stages keep delivery suspended until
/// every one of them has been matched by a resume. The driver side awaits
/// [`FlowHandle::wait_until_resumed`] between rows.
#[derive(Debug, Clone)]
pub struct FlowHandle {
    inner: Arc<FlowInner>,
}

#[derive(Debug)]
struct FlowInner {
    pause_requests: Mutex<u32>,
    paused: watch::Sender<bool>,
}

impl FlowHandle {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);

        Self {
            inner: Arc::new(FlowInner {
                pause_requests: Mutex::new(0),
                paused,
            }),
        }
    }

    /// Requests that row delivery be suspended.
    ///
    /// Only the first outstanding request actually suspends the driver, every further
    /// request just increments the count.
    pub fn pause(&self) {
        let mut pause_requests = lock_pause_requests(&self.inner);

        if *pause_requests == 0 {
            let _ = self.inner.paused.send(true);
        }
        *pause_requests += 1;
    }

    /// Releases one previously issued pause request.
    ///
    /// Delivery resumes once the last outstanding request is released. Calling this
    /// without a matching [`FlowHandle::pause`] is a no-op.
    pub fn resume(&self) {
        let mut pause_requests = lock_pause_requests(&self.inner);

        if *pause_requests > 0 {
            *pause_requests -= 1;
            if *pause_requests == 0 {
                let _ = self.inner.paused.send(false);
            }
        }
    }

    /// Returns whether at least one pause request is outstanding.
    pub fn is_paused(&self) -> bool {
        *lock_pause_requests(&self.inner) > 0
    }

    /// Returns the number of outstanding pause requests.
    pub fn pause_requests(&self) -> u32 {
        *lock_pause_requests(&self.inner)
    }

    /// Waits until no pause request is outstanding.
    ///
    /// Source drivers call this between rows so that backpressure from the consumers
    /// propagates into the delivery loop.
    pub async fn wait_until_resumed(&self) {
        let mut paused = self.inner.paused.subscribe();

        while *paused.borrow_and_update() {
            if paused.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for FlowHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_pause_requests(inner: &FlowInner) -> std::sync::MutexGuard<'_, u32> {
    match inner.pause_requests.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
