//! In-process stand-in for the vendor printer services, used by the demo
//! binary on hosts without a Sunmi device.

use crate::backend::{PrinterBackend, SessionEvents};
use crate::commands::{PrinterOperation, PrinterService, ReplySink};
use crate::config::BackendIdentity;
use crate::errors::{BindError, TransportError};
use crate::probe::CapabilityProbe;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SimulatedService {
    alive: AtomicBool,
    status_code: Arc<AtomicI32>,
    journal: Arc<Mutex<Vec<PrinterOperation>>>,
}

impl SimulatedService {
    fn render(operation: &PrinterOperation) -> String {
        match operation {
            PrinterOperation::SetAlignment(align) => format!("<align {:?}>", align),
            PrinterOperation::PrintText(text) => text.trim_end().to_string(),
            PrinterOperation::PrintTextWithFont { text, typeface, size } => {
                format!("<{} {}pt> {}", typeface, size, text.trim_end())
            }
            PrinterOperation::SetFontSize(size) => format!("<font {}pt>", size),
            PrinterOperation::LineWrap(count) => format!("<feed {}>", count),
            PrinterOperation::PrintQrCode { data, module_size, error_level } => {
                format!("<qr {:?} x{}> {}", error_level, module_size, data)
            }
        }
    }
}

impl PrinterService for SimulatedService {
    fn invoke(&self, operation: &PrinterOperation, reply: &ReplySink) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::DeadObject("simulated service is gone".to_string()));
        }
        info!(target: "sunmi_printer::paper", "{}", Self::render(operation));
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(operation.clone());
        reply.on_run_result(true);
        Ok(())
    }

    fn printer_status(&self) -> Result<i32, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::DeadObject("simulated service is gone".to_string()));
        }
        Ok(self.status_code.load(Ordering::SeqCst))
    }
}

/// Backend whose "installed" packages are configured up front.
pub struct SimulatedBackend {
    installed: HashSet<String>,
    latency: Duration,
    status_code: Arc<AtomicI32>,
    journal: Arc<Mutex<Vec<PrinterOperation>>>,
    session: Mutex<Option<(SessionEvents, Arc<SimulatedService>)>>,
}

impl SimulatedBackend {
    pub fn new<I, S>(installed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            installed: installed.into_iter().map(Into::into).collect(),
            latency: Duration::from_millis(50),
            status_code: Arc::new(AtomicI32::new(0)),
            journal: Arc::new(Mutex::new(Vec::new())),
            session: Mutex::new(None),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_status(&self, code: i32) {
        self.status_code.store(code, Ordering::SeqCst);
    }

    /// Every operation printed so far, across sessions.
    pub fn journal(&self) -> Vec<PrinterOperation> {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Simulates the service process dying. Returns false if nothing was bound.
    pub fn kill(&self) -> bool {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match session {
            Some((events, service)) => {
                warn!("Simulating death of {}", events.identity());
                service.alive.store(false, Ordering::SeqCst);
                events.binding_died();
                true
            }
            None => false,
        }
    }
}

impl PrinterBackend for SimulatedBackend {
    fn bind(&self, identity: &BackendIdentity, events: SessionEvents) -> Result<(), BindError> {
        if !self.installed.contains(&identity.name) {
            return Err(BindError::NotResolvable(identity.name.clone()));
        }

        let service = Arc::new(SimulatedService {
            alive: AtomicBool::new(true),
            status_code: self.status_code.clone(),
            journal: self.journal.clone(),
        });
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((events.clone(), service.clone()));

        let latency = self.latency;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(latency).await;
                    events.connected(service);
                });
            }
            Err(_) => events.connected(service),
        }
        Ok(())
    }

    fn unbind(&self, identity: &BackendIdentity) {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let matches = session
            .as_ref()
            .is_some_and(|(events, _)| events.identity() == identity);
        if matches {
            if let Some((_, service)) = session.take() {
                service.alive.store(false, Ordering::SeqCst);
            }
            debug!("Simulated service {} unbound", identity);
        }
    }
}

impl CapabilityProbe for SimulatedBackend {
    fn is_package_installed(&self, package: &str) -> anyhow::Result<bool> {
        Ok(self.installed.contains(package))
    }

    fn resolves(&self, identity: &BackendIdentity) -> anyhow::Result<bool> {
        Ok(self.installed.contains(&identity.name))
    }
}
