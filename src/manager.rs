use crate::backend::{PrinterBackend, SessionEvents};
use crate::commands::{
    CommandAction, CommandTicket, PrinterService, Readiness, ReplySink, RequestId,
};
use crate::config::{BackendIdentity, IdentityTable};
use crate::errors::{BindError, TransportError};
use crate::status::{self, PrinterStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Connection state for UI tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

pub type ConnectionListener = Arc<dyn Fn(bool) + Send + Sync>;

struct PendingCommand {
    request_id: RequestId,
    description: Arc<str>,
    action: CommandAction,
    reply: ReplySink,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    attempts: usize,
    /// Set when a sequence runs out of candidates; blocks automatic
    /// attempts until the next explicit `connect()`.
    exhausted: bool,
    generation: u64,
    current_identity: Option<BackendIdentity>,
    bound_identity: Option<BackendIdentity>,
    service: Option<Arc<dyn PrinterService>>,
    queue: VecDeque<PendingCommand>,
    draining: bool,
    last_connected_at: Option<DateTime<Utc>>,
    last_disconnected_at: Option<DateTime<Utc>>,
}

impl Shared {
    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.service.is_some()
    }

    fn live_service(&self) -> Option<Arc<dyn PrinterService>> {
        if self.state == ConnectionState::Connected {
            self.service.clone()
        } else {
            None
        }
    }

    /// No session, no attempt in flight and budget not exhausted.
    fn may_auto_connect(&self) -> bool {
        !self.is_connected() && self.state != ConnectionState::Connecting && !self.exhausted
    }

    /// Marks a drain as owned by the caller if there is work and nobody else drains.
    fn begin_drain(&mut self) -> bool {
        if self.draining || self.queue.is_empty() || !self.is_connected() {
            return false;
        }
        self.draining = true;
        true
    }
}

pub(crate) struct Inner {
    backend: Arc<dyn PrinterBackend>,
    identities: IdentityTable,
    shared: Mutex<Shared>,
    listener: Mutex<Option<ConnectionListener>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // A panicking listener or command never holds this lock, so the
        // state behind a poisoned guard is still consistent.
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, shared: &mut Shared, state: ConnectionState) {
        if shared.state != state {
            debug!("Connection state {:?} -> {:?}", shared.state, state);
        }
        shared.state = state;
        self.state_tx.send_replace(state);
    }
}

impl Readiness for Inner {
    fn is_ready(&self) -> bool {
        self.lock().is_connected()
    }
}

/// Keeps a best-effort connection to exactly one of several candidate
/// printer services and replays commands issued while it had none.
///
/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn PrinterBackend>, identities: IdentityTable) -> Self {
        info!(
            "Initializing ConnectionManager ({} candidate services)",
            identities.max_attempts()
        );
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                backend,
                identities,
                shared: Mutex::new(Shared::default()),
                listener: Mutex::new(None),
                state_tx,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn identities(&self) -> &IdentityTable {
        &self.inner.identities
    }

    pub fn max_attempts(&self) -> usize {
        self.inner.identities.max_attempts()
    }

    /// Replaces the single listener. Called with `true`/`false` on each
    /// confirmed move into or out of `Connected`.
    pub fn set_connection_listener<F>(&self, listener: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(listener));
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// True only while connected *and* holding a service handle.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }

    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }

    pub fn pending_commands(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Starts a connection sequence unless one is running or a session is live.
    pub fn connect(&self) {
        let mut shared = self.inner.lock();
        if shared.is_connected() {
            let drain = shared.begin_drain();
            drop(shared);
            debug!("Printer service already connected");
            self.notify(true);
            if drain {
                self.run_drain();
            }
            return;
        }
        if shared.state == ConnectionState::Connecting {
            debug!("Connection attempt already in progress");
            return;
        }

        shared.attempts = 0;
        shared.exhausted = false;
        shared.service = None;
        // Binding left over from an unsolicited disconnect
        let stale = shared.bound_identity.take();
        self.inner.set_state(&mut shared, ConnectionState::Connecting);
        drop(shared);

        if let Some(identity) = stale {
            self.inner.backend.unbind(&identity);
            debug!("Released previous binding {}", identity);
        }
        info!("Connecting to printer service...");
        self.advance();
    }

    /// Releases the binding and resets to `Disconnected`. Pending commands stay
    /// queued for the next session.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        let bound = shared.bound_identity.take();
        let was_connected = shared.state == ConnectionState::Connected;
        shared.generation += 1;
        shared.service = None;
        if was_connected {
            shared.last_disconnected_at = Some(Utc::now());
        }
        self.inner.set_state(&mut shared, ConnectionState::Disconnected);
        let pending = shared.queue.len();
        drop(shared);

        if let Some(identity) = bound {
            self.inner.backend.unbind(&identity);
            debug!("Printer service {} unbound by manager", identity);
        }
        info!("Disconnected from printer service ({} pending command(s) kept)", pending);
    }

    /// Runs `action` now if connected, otherwise queues it and starts
    /// connecting when no attempt is in flight.
    pub fn submit_command<F>(&self, description: impl Into<String>, action: F) -> CommandTicket
    where
        F: Fn(&dyn PrinterService, &ReplySink) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        let description: Arc<str> = Arc::from(description.into());
        let request_id = RequestId::new();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let readiness: Weak<dyn Readiness> = weak;
        let (reply, events) = ReplySink::new(request_id, description.clone(), readiness);

        self.dispatch(PendingCommand {
            request_id,
            description: description.clone(),
            action: Arc::new(action),
            reply,
        });

        CommandTicket::new(request_id, description, events)
    }

    /// Queries the printer status now. Never deferred: while disconnected the
    /// callback gets [`PrinterStatus::NotConnected`] and a connection attempt
    /// starts, as for [`submit_command`](Self::submit_command).
    pub fn query_status<F>(&self, callback: F)
    where
        F: FnOnce(PrinterStatus) + Send + 'static,
    {
        let (service, should_connect) = {
            let shared = self.inner.lock();
            (shared.live_service(), shared.may_auto_connect())
        };
        let Some(service) = service else {
            warn!("getPrinterStatus: service not connected");
            callback(PrinterStatus::from_code(status::NOT_CONNECTED));
            if should_connect {
                self.connect();
            }
            return;
        };

        debug!("Executing: getPrinterStatus");
        match service.printer_status() {
            Ok(code) => {
                let status = PrinterStatus::from_code(code);
                debug!("Printer status reported: {}", status);
                callback(status);
            }
            Err(e) if e.indicates_session_dead() => {
                error!("Transport failure during getPrinterStatus: {}", e);
                callback(PrinterStatus::from_code(status::TRANSPORT_FAILURE));
                self.drop_session(&service, None);
            }
            Err(e) => {
                error!("getPrinterStatus failed: {}", e);
                callback(PrinterStatus::from_code(status::QUERY_FAILED));
            }
        }
    }

    pub async fn status(&self) -> PrinterStatus {
        let (tx, rx) = oneshot::channel();
        self.query_status(move |status| {
            let _ = tx.send(status);
        });
        rx.await
            .unwrap_or_else(|_| PrinterStatus::from_code(status::QUERY_FAILED))
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let shared = self.inner.lock();
        ConnectionInfo {
            state: shared.state,
            service_available: shared.service.is_some(),
            current_identity: shared.current_identity.clone(),
            attempts: shared.attempts,
            max_attempts: self.max_attempts(),
            exhausted: shared.exhausted,
            pending_commands: shared.queue.len(),
            last_connected_at: shared.last_connected_at,
            last_disconnected_at: shared.last_disconnected_at,
        }
    }

    // ========================================================================
    // Fallback sequence
    // ========================================================================

    fn advance(&self) {
        let max_attempts = self.max_attempts();
        loop {
            let (identity, generation, attempt) = {
                let mut shared = self.inner.lock();
                if shared.state != ConnectionState::Connecting {
                    return;
                }

                let candidate = if shared.attempts < max_attempts {
                    self.inner.identities.get(shared.attempts).cloned()
                } else {
                    None
                };
                let Some(identity) = candidate else {
                    shared.exhausted = true;
                    shared.generation += 1;
                    shared.service = None;
                    self.inner.set_state(&mut shared, ConnectionState::Disconnected);
                    let discarded: Vec<PendingCommand> = shared.queue.drain(..).collect();
                    let attempts = shared.attempts;
                    drop(shared);

                    error!(
                        "Max connection attempts ({}/{}) reached. Failed to connect to any printer service",
                        attempts, max_attempts
                    );
                    self.discard(discarded, "Max connection attempts reached");
                    self.notify(false);
                    return;
                };

                shared.attempts += 1;
                shared.generation += 1;
                shared.current_identity = Some(identity.clone());
                (identity, shared.generation, shared.attempts)
            };

            info!(
                "Attempt #{}/{}: binding printer service {}",
                attempt, max_attempts, identity
            );
            let events = SessionEvents::new(Arc::downgrade(&self.inner), generation, identity.clone());
            match self.inner.backend.bind(&identity, events) {
                Ok(()) => {
                    let mut shared = self.inner.lock();
                    if shared.generation == generation {
                        shared.bound_identity = Some(identity.clone());
                        drop(shared);
                        debug!("Binding initiated for {}", identity);
                        return;
                    }
                    // Outcome already delivered inside bind() and the manager moved on
                    let rebound = shared.bound_identity.as_ref() == Some(&identity);
                    drop(shared);
                    if !rebound {
                        self.inner.backend.unbind(&identity);
                        debug!("Released binding {} superseded during bind", identity);
                    }
                    return;
                }
                Err(reason) => {
                    warn!("Bind attempt for {} failed: {}. Trying next...", identity, reason);
                    let mut shared = self.inner.lock();
                    if shared.generation != generation || shared.state != ConnectionState::Connecting {
                        return;
                    }
                    shared.service = None;
                }
            }
        }
    }

    pub(crate) fn handle_connected(
        &self,
        generation: u64,
        identity: &BackendIdentity,
        service: Arc<dyn PrinterService>,
    ) {
        let mut shared = self.inner.lock();
        if shared.generation != generation || shared.state == ConnectionState::Connected {
            drop(shared);
            debug!("Ignoring stale connection callback for {} (generation {})", identity, generation);
            return;
        }

        shared.service = Some(service);
        shared.exhausted = false;
        shared.bound_identity = Some(identity.clone());
        shared.last_connected_at = Some(Utc::now());
        self.inner.set_state(&mut shared, ConnectionState::Connected);
        let drain = shared.begin_drain();
        drop(shared);

        info!("Printer service connected: {}", identity);
        self.notify(true);
        if drain {
            self.run_drain();
        }
    }

    pub(crate) fn handle_failed(&self, generation: u64, identity: &BackendIdentity, reason: BindError) {
        let mut shared = self.inner.lock();
        if shared.generation != generation || shared.state != ConnectionState::Connecting {
            drop(shared);
            debug!("Ignoring stale failure for {}: {}", identity, reason);
            return;
        }
        shared.service = None;
        let bound = shared.bound_identity.take();
        let attempts = shared.attempts;
        drop(shared);

        warn!(
            "Connection attempt #{} to {} failed: {}",
            attempts, identity, reason
        );
        if let Some(bound) = bound {
            self.inner.backend.unbind(&bound);
        }
        self.advance();
    }

    pub(crate) fn handle_disconnected(&self, generation: u64, identity: &BackendIdentity) {
        let mut shared = self.inner.lock();
        if shared.generation != generation {
            drop(shared);
            debug!("Ignoring stale disconnect for {}", identity);
            return;
        }
        match shared.state {
            ConnectionState::Connecting => {
                drop(shared);
                self.handle_failed(generation, identity, BindError::Disconnected);
            }
            ConnectionState::Connected => {
                shared.service = None;
                shared.last_disconnected_at = Some(Utc::now());
                self.inner.set_state(&mut shared, ConnectionState::Disconnected);
                drop(shared);
                warn!("Printer service disconnected: {}", identity);
                self.notify(false);
            }
            ConnectionState::Disconnected => {}
        }
    }

    pub(crate) fn handle_binding_died(&self, generation: u64, identity: &BackendIdentity) {
        let mut shared = self.inner.lock();
        if shared.generation != generation {
            drop(shared);
            debug!("Ignoring stale binding death for {}", identity);
            return;
        }
        if shared.state == ConnectionState::Connecting {
            drop(shared);
            self.handle_failed(generation, identity, BindError::BindingDied);
            return;
        }

        let was_connected = shared.state == ConnectionState::Connected;
        let bound = shared.bound_identity.take();
        shared.service = None;
        shared.generation += 1;
        if was_connected {
            shared.last_disconnected_at = Some(Utc::now());
        }
        self.inner.set_state(&mut shared, ConnectionState::Disconnected);
        drop(shared);

        error!("Binding died for printer service {}. Attempting to reconnect", identity);
        if let Some(bound) = bound {
            self.inner.backend.unbind(&bound);
        }
        if was_connected {
            self.notify(false);
        }
        self.connect();
    }

    // ========================================================================
    // Command queue
    // ========================================================================

    fn dispatch(&self, command: PendingCommand) {
        let mut shared = self.inner.lock();
        if !shared.draining {
            if let Some(service) = shared.live_service() {
                drop(shared);
                self.execute(service, command);
                return;
            }
        }

        debug!(request_id = %command.request_id, "Queuing command: {}", command.description);
        shared.queue.push_back(command);
        let should_connect = shared.may_auto_connect();
        let exhausted = shared.exhausted;
        drop(shared);

        if should_connect {
            self.connect();
        } else if exhausted {
            debug!("Connection attempts exhausted, command waits for an explicit connect()");
        }
    }

    fn run_drain(&self) {
        loop {
            let next = {
                let mut shared = self.inner.lock();
                let service = shared.live_service();
                let command = if service.is_some() {
                    shared.queue.pop_front()
                } else {
                    None
                };
                match (service, command) {
                    (Some(service), Some(command)) => Some((service, command)),
                    _ => {
                        shared.draining = false;
                        None
                    }
                }
            };
            let Some((service, command)) = next else {
                return;
            };
            debug!(request_id = %command.request_id, "Executing queued command: {}", command.description);
            self.execute(service, command);
        }
    }

    fn execute(&self, service: Arc<dyn PrinterService>, command: PendingCommand) {
        debug!(request_id = %command.request_id, "Executing: {}", command.description);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (command.action)(service.as_ref(), &command.reply)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.indicates_session_dead() => {
                error!(request_id = %command.request_id, "Transport failure during {}: {}", command.description, e);
                self.drop_session(&service, Some(command));
            }
            Ok(Err(e)) => {
                error!(request_id = %command.request_id, "Error executing command '{}': {}", command.description, e);
                command.reply.abandon(e.to_string());
            }
            Err(_) => {
                error!(request_id = %command.request_id, "Command '{}' panicked, skipping", command.description);
                command.reply.abandon("command panicked");
            }
        }
    }

    /// Tears down the session `service` belongs to (if still current) and
    /// re-queues `requeue` at the head.
    fn drop_session(&self, service: &Arc<dyn PrinterService>, requeue: Option<PendingCommand>) {
        let mut shared = self.inner.lock();
        let current = shared
            .service
            .as_ref()
            .is_some_and(|live| Arc::ptr_eq(live, service));
        let mut bound = None;
        let mut was_connected = false;
        if current {
            was_connected = shared.state == ConnectionState::Connected;
            bound = shared.bound_identity.take();
            shared.service = None;
            shared.generation += 1;
            shared.last_disconnected_at = Some(Utc::now());
            self.inner.set_state(&mut shared, ConnectionState::Disconnected);
        }
        if let Some(command) = requeue {
            debug!(request_id = %command.request_id, "Re-queuing command: {}", command.description);
            shared.queue.push_front(command);
        }
        drop(shared);

        if let Some(identity) = bound {
            self.inner.backend.unbind(&identity);
        }
        if was_connected {
            self.notify(false);
        }
        self.resume_queue();
    }

    /// Drains if a session is live, otherwise starts connecting when allowed.
    fn resume_queue(&self) {
        let mut shared = self.inner.lock();
        if shared.is_connected() {
            let drain = shared.begin_drain();
            drop(shared);
            if drain {
                self.run_drain();
            }
        } else if shared.may_auto_connect() {
            drop(shared);
            self.connect();
        }
    }

    fn discard(&self, commands: Vec<PendingCommand>, reason: &str) {
        if commands.is_empty() {
            return;
        }
        warn!("Clearing {} pending command(s) due to: {}", commands.len(), reason);
        for command in commands {
            debug!(request_id = %command.request_id, "Dropped command: {}", command.description);
            command.reply.dropped(reason);
        }
    }

    fn notify(&self, connected: bool) {
        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(listener) = listener {
            listener(connected);
        }
    }
}

/// Diagnostics snapshot of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub service_available: bool,
    pub current_identity: Option<BackendIdentity>,
    pub attempts: usize,
    pub max_attempts: usize,
    pub exhausted: bool,
    pub pending_commands: usize,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== PRINTER CONNECTION INFO ===")?;
        writeln!(f, "State: {:?}", self.state)?;
        writeln!(
            f,
            "Service handle: {}",
            if self.service_available { "Available" } else { "Null" }
        )?;
        match &self.current_identity {
            Some(identity) => writeln!(f, "Current service tried: {}", identity)?,
            None => writeln!(f, "Current service tried: N/A")?,
        }
        writeln!(f, "Connection attempts made: {} / {}", self.attempts, self.max_attempts)?;
        writeln!(f, "Attempts exhausted: {}", self.exhausted)?;
        writeln!(f, "Pending commands in queue: {}", self.pending_commands)?;
        if let Some(at) = self.last_connected_at {
            writeln!(f, "Last connected: {}", at.to_rfc3339())?;
        }
        if let Some(at) = self.last_disconnected_at {
            writeln!(f, "Last disconnected: {}", at.to_rfc3339())?;
        }
        write!(f, "===============================")
    }
}
