//! # Session Controller
//!
//! Owns the transport and the shared [`SessionState`] across the session's
//! whole life.
//!
//! One producer task per connection generation reads lines and applies the
//! pipeline under the state lock; renderers call [`SessionController::snapshot`]
//! from any thread and only hold the lock while the copy is made.
//!
//! ## Lifecycle
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | Active | line received | Active (pipeline applied, reset first on reboot) |
//! | Active | `reset()` / `send_reset_command()` | Active (state cleared) |
//! | Active | transport error or end of stream | Active, reconnecting after a fixed backoff |
//! | Active | `close()` | Closed (terminal, idempotent) |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::cancel::{CancelToken, ProducerControl};
use crate::config::Config;
use crate::error::{Result, TelemetryError};
use crate::protocol::keys::SOFT_RESET_COMMAND;
use crate::serial::{Connector, LineTransport};
use crate::state::{LinkStatus, SessionSnapshot, SessionState};

/// Requests routed to the producer that owns the transport
#[derive(Debug)]
enum Command {
    Write(Vec<u8>),
}

/// Lock a mutex, recovering the data if a holder panicked
///
/// Every critical section leaves the state consistent, so a poisoned lock
/// still guards valid data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    state: Mutex<SessionState>,
    status: Mutex<LinkStatus>,
    control: watch::Sender<ProducerControl>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    reconnect_pending: AtomicBool,
    backoff: Duration,
    print_raw: bool,
}

/// Handle to a running telemetry session
///
/// Cheap to clone; every clone controls the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("status", &self.status())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Open the transport and start the producer task
    ///
    /// Must be called from within a tokio runtime; the session keeps spawning
    /// on that runtime, so the other methods may be called from any thread.
    ///
    /// # Arguments
    ///
    /// * `config` - Buffer sizes, tracked names and reconnect backoff
    /// * `connector` - Opens the transport now and on every reconnect
    ///
    /// # Errors
    ///
    /// Returns `Runtime` outside a tokio runtime, or the connector's error if
    /// the first open fails. Later failures are retried internally and never
    /// surface here.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flight_telemetry::config::Config;
    /// use flight_telemetry::serial::SerialConnector;
    /// use flight_telemetry::session::SessionController;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = Config::default();
    ///     let connector = Arc::new(SerialConnector::from_config(&config.serial));
    ///     let session = SessionController::start(&config, connector)?;
    ///
    ///     let snapshot = session.snapshot();
    ///     println!("{} samples, link {}", snapshot.sample_count(), snapshot.status);
    ///
    ///     session.close();
    ///     Ok(())
    /// }
    /// ```
    pub fn start(config: &Config, connector: Arc<dyn Connector>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| TelemetryError::Runtime(e.to_string()))?;
        let transport = connector.connect()?;
        info!("Session started on {}", transport.describe());

        let (control, _) = watch::channel(ProducerControl::default());
        let inner = Arc::new(Inner {
            state: Mutex::new(SessionState::new(config)),
            status: Mutex::new(LinkStatus::Connected),
            control,
            commands: Mutex::new(None),
            connector,
            runtime,
            reconnect_pending: AtomicBool::new(false),
            backoff: Duration::from_millis(config.serial.reconnect_interval_ms),
            print_raw: config.display.print_raw,
        });
        inner.spawn_producer(transport, 0);

        Ok(Self { inner })
    }

    /// Point-in-time copy of the whole session for rendering
    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        lock(&self.inner.state).snapshot(status)
    }

    /// Current link status
    pub fn status(&self) -> LinkStatus {
        *lock(&self.inner.status)
    }

    /// Connection generation, incremented on every reconnect
    pub fn generation(&self) -> u64 {
        self.inner.control.borrow().generation
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Clear all local state without touching the transport
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` after [`SessionController::close`]
    pub fn reset(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TelemetryError::SessionClosed);
        }
        lock(&self.inner.state).reset();
        info!("Session state cleared");
        Ok(())
    }

    /// Ask the device to soft-reset, then clear all local state
    ///
    /// The command is fire-and-forget: if the link is down it is dropped with
    /// a warning and only the local reset happens.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` after [`SessionController::close`]
    pub fn send_reset_command(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TelemetryError::SessionClosed);
        }

        let queued = lock(&self.inner.commands)
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Write(SOFT_RESET_COMMAND.to_vec())).is_ok());
        if queued {
            debug!("Soft reset command queued");
        } else {
            warn!("Link is down, soft reset command not sent");
        }

        self.reset()
    }

    /// Drop the current connection and reopen it after the backoff
    ///
    /// History is preserved.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` after [`SessionController::close`]
    pub fn reconnect(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TelemetryError::SessionClosed);
        }
        info!("Reconnect requested");
        self.inner.schedule_reconnect();
        Ok(())
    }

    /// Stop the producer, release the transport and stop reconnecting
    ///
    /// Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.control.borrow().closed
    }

    /// Update the status unless the session is already closed
    fn set_status(&self, status: LinkStatus) {
        let mut current = lock(&self.status);
        if *current != LinkStatus::Closed {
            *current = status;
        }
    }

    fn ingest(&self, line: &str) {
        if self.print_raw {
            println!("{}", line);
        }
        let outcome = lock(&self.state).ingest(line);
        if outcome.events > 0 {
            debug!("{} event(s) at {:.3}s", outcome.events, outcome.elapsed);
        }
    }

    /// Start a producer for `generation`
    ///
    /// If the generation has already been superseded the producer exits
    /// without reading.
    fn spawn_producer(self: &Arc<Self>, transport: Box<dyn LineTransport>, generation: u64) {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.commands) = Some(tx);
        let token = CancelToken::for_generation(self.control.subscribe(), generation);
        self.runtime.spawn(run_producer(Arc::clone(self), transport, rx, token));
    }

    /// Supersede the current producer and start a single reopen attempt loop
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        if self.reconnect_pending.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already pending");
            return;
        }

        let mut generation = 0;
        self.control.send_modify(|c| {
            c.generation += 1;
            generation = c.generation;
        });
        *lock(&self.commands) = None;
        self.set_status(LinkStatus::Reconnecting);
        warn!("Link lost, reconnecting every {:?}", self.backoff);

        let inner = Arc::clone(self);
        self.runtime.spawn(inner.reconnect_loop(generation));
    }

    /// Reopen the transport for `generation`
    ///
    /// `reconnect_pending` stays set until the new producer exists, so no
    /// other reconnect can start in between.
    async fn reconnect_loop(self: Arc<Self>, generation: u64) {
        let mut control = self.control.subscribe();
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = wait_closed(&mut control) => break,
            }

            attempt += 1;
            match self.connector.connect() {
                Ok(transport) => {
                    if self.is_closed() {
                        break;
                    }
                    info!(
                        "Reconnected to {} after {} attempt(s)",
                        transport.describe(),
                        attempt
                    );
                    self.set_status(LinkStatus::Connected);
                    self.spawn_producer(transport, generation);
                    self.reconnect_pending.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
        }

        self.reconnect_pending.store(false, Ordering::SeqCst);
        debug!("Reconnect abandoned, session closed");
    }

    fn close(&self) {
        let mut already_closed = false;
        self.control.send_modify(|c| {
            already_closed = c.closed;
            c.closed = true;
        });
        if already_closed {
            return;
        }

        *lock(&self.commands) = None;
        *lock(&self.status) = LinkStatus::Closed;
        info!("Session closed");
    }
}

/// Resolve once the session is closed
async fn wait_closed(control: &mut watch::Receiver<ProducerControl>) {
    loop {
        if control.borrow().closed {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}

/// Read lines from one transport until cancelled or the link fails
async fn run_producer(
    inner: Arc<Inner>,
    mut transport: Box<dyn LineTransport>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut cancel: CancelToken,
) {
    let generation = cancel.generation();
    debug!("Producer generation {} reading {}", generation, transport.describe());

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            Some(command) = commands.recv() => match command {
                Command::Write(bytes) => {
                    if let Err(e) = transport.write_all(&bytes).await {
                        warn!("Failed to send command: {}", e);
                    }
                }
            },

            result = transport.read_line() => match result {
                Ok(Some(line)) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    inner.ingest(&line);
                }
                Ok(None) => {
                    warn!("Link {} closed by device", transport.describe());
                    if !cancel.is_cancelled() {
                        inner.schedule_reconnect();
                    }
                    break;
                }
                Err(e) => {
                    warn!("{}", e);
                    if !cancel.is_cancelled() {
                        inner.schedule_reconnect();
                    }
                    break;
                }
            },
        }
    }

    debug!("Producer generation {} exiting", generation);
}
