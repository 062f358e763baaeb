// Common test utilities and fixtures

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use sunmi_printer::{
    BackendIdentity, BindError, ConnectionManager, IdentityTable, PrinterBackend, PrinterOperation,
    PrinterService, ReplySink, SessionEvents, TransportError,
};

pub const PRIMARY: &str = "svc.primary";
pub const ALT1: &str = "svc.alt1";
pub const ALT2: &str = "svc.alt2";

/// Primary plus two fallbacks: three attempts per sequence.
#[allow(dead_code)]
pub fn test_identities() -> IdentityTable {
    IdentityTable::new(
        BackendIdentity::new(PRIMARY, "svc.primary.IPrinter"),
        vec![
            BackendIdentity::new(ALT1, "svc.alt1.IPrinter"),
            BackendIdentity::new(ALT2, "svc.alt2.IPrinter"),
        ],
    )
}

/// Backend that records every bind and lets the test deliver lifecycle
/// events by hand.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedBackend {
    binds: Mutex<Vec<BackendIdentity>>,
    sessions: Mutex<Vec<SessionEvents>>,
    unbinds: Mutex<Vec<BackendIdentity>>,
    rejected: Mutex<HashMap<String, BindError>>,
    auto_connect: Mutex<HashMap<String, Arc<dyn PrinterService>>>,
    fail_inside_bind: Mutex<HashMap<String, BindError>>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `bind` for `name` fails immediately with `error`.
    pub fn reject(&self, name: &str, error: BindError) {
        self.rejected.lock().unwrap().insert(name.to_string(), error);
    }

    pub fn reject_all(&self) {
        for name in [PRIMARY, ALT1, ALT2] {
            self.reject(name, BindError::NotResolvable(name.to_string()));
        }
    }

    pub fn accept(&self, name: &str) {
        self.rejected.lock().unwrap().remove(name);
    }

    /// `bind` for `name` connects `service` before returning.
    pub fn auto_connect(&self, name: &str, service: Arc<dyn PrinterService>) {
        self.accept(name);
        self.auto_connect.lock().unwrap().insert(name.to_string(), service);
    }

    /// `bind` for `name` reports `error` through its events, then returns `Ok`.
    pub fn fail_inside_bind(&self, name: &str, error: BindError) {
        self.fail_inside_bind.lock().unwrap().insert(name.to_string(), error);
    }

    pub fn bind_count(&self) -> usize {
        self.binds.lock().unwrap().len()
    }

    pub fn bound_names(&self) -> Vec<String> {
        self.binds.lock().unwrap().iter().map(|i| i.name.clone()).collect()
    }

    pub fn unbound_names(&self) -> Vec<String> {
        self.unbinds.lock().unwrap().iter().map(|i| i.name.clone()).collect()
    }

    /// Events handle of the n-th accepted bind.
    pub fn session(&self, index: usize) -> SessionEvents {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn last_session(&self) -> SessionEvents {
        self.sessions.lock().unwrap().last().cloned().expect("no accepted bind yet")
    }
}

impl PrinterBackend for ScriptedBackend {
    fn bind(&self, identity: &BackendIdentity, events: SessionEvents) -> Result<(), BindError> {
        self.binds.lock().unwrap().push(identity.clone());
        if let Some(error) = self.rejected.lock().unwrap().get(&identity.name).cloned() {
            return Err(error);
        }
        self.sessions.lock().unwrap().push(events.clone());
        let failure = self.fail_inside_bind.lock().unwrap().get(&identity.name).cloned();
        if let Some(error) = failure {
            events.failed(error);
            return Ok(());
        }
        let service = self.auto_connect.lock().unwrap().get(&identity.name).cloned();
        if let Some(service) = service {
            events.connected(service);
        }
        Ok(())
    }

    fn unbind(&self, identity: &BackendIdentity) {
        self.unbinds.lock().unwrap().push(identity.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum FailMode {
    Healthy,
    Dead,
    Unsupported,
}

/// Service handle that journals what it was asked to do.
#[allow(dead_code)]
pub struct RecordingService {
    pub operations: Mutex<Vec<PrinterOperation>>,
    pub status_code: AtomicI32,
    pub mode: Mutex<FailMode>,
}

#[allow(dead_code)]
impl RecordingService {
    pub fn new() -> Arc<Self> {
        Self::with_mode(FailMode::Healthy)
    }

    pub fn with_mode(mode: FailMode) -> Arc<Self> {
        Arc::new(Self {
            operations: Mutex::new(Vec::new()),
            status_code: AtomicI32::new(0),
            mode: Mutex::new(mode),
        })
    }

    pub fn set_mode(&self, mode: FailMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn operations(&self) -> Vec<PrinterOperation> {
        self.operations.lock().unwrap().clone()
    }
}

impl PrinterService for RecordingService {
    fn invoke(&self, operation: &PrinterOperation, reply: &ReplySink) -> Result<(), TransportError> {
        match *self.mode.lock().unwrap() {
            FailMode::Dead => Err(TransportError::DeadObject("process died".to_string())),
            FailMode::Unsupported => Err(TransportError::Unsupported(operation.name().to_string())),
            FailMode::Healthy => {
                self.operations.lock().unwrap().push(operation.clone());
                reply.on_run_result(true);
                Ok(())
            }
        }
    }

    fn printer_status(&self) -> Result<i32, TransportError> {
        match *self.mode.lock().unwrap() {
            FailMode::Dead => Err(TransportError::DeadObject("process died".to_string())),
            _ => Ok(self.status_code.load(Ordering::SeqCst)),
        }
    }
}

/// Shared, ordered log of what happened, for sequencing assertions.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Manager over `backend` with a listener that logs `listener:<bool>`.
#[allow(dead_code)]
pub fn manager_with_log(backend: &Arc<ScriptedBackend>) -> (ConnectionManager, EventLog) {
    let manager = ConnectionManager::new(backend.clone(), test_identities());
    let log = EventLog::default();
    let listener_log = log.clone();
    manager.set_connection_listener(move |connected| {
        listener_log.push(format!("listener:{}", connected));
    });
    (manager, log)
}
