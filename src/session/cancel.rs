//! Generation-based cancellation for producer tasks.
//!
//! Every (re)connect starts a producer with the generation current at spawn
//! time. Bumping the generation, or closing the session, cancels every
//! producer holding an older token.

use tokio::sync::watch;

/// Shared lifecycle the controller publishes to its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerControl {
    pub generation: u64,
    pub closed: bool,
}

/// Cancellation token for one producer generation
#[derive(Debug, Clone)]
pub struct CancelToken {
    control: watch::Receiver<ProducerControl>,
    generation: u64,
}

impl CancelToken {
    /// Token for the generation currently published on `control`
    pub fn current(control: watch::Receiver<ProducerControl>) -> Self {
        let generation = control.borrow().generation;
        Self::for_generation(control, generation)
    }

    /// Token for a generation fixed by the caller
    ///
    /// Already cancelled if `control` has moved past `generation`.
    pub fn for_generation(control: watch::Receiver<ProducerControl>, generation: u64) -> Self {
        Self {
            control,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Superseded by a newer generation, or the session closed
    pub fn is_cancelled(&self) -> bool {
        let control = self.control.borrow();
        control.closed || control.generation != self.generation
    }

    /// Resolve once the token is cancelled
    ///
    /// Cancel-safe, so it can sit in a `select!` next to a blocking read.
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            if self.control.changed().await.is_err() {
                // Controller dropped
                return;
            }
        }
    }
}
