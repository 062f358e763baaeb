use crate::errors::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Text alignment as understood by the vendor service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn code(&self) -> i32 {
        match self {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        }
    }
}

/// QR error-correction level (L=0, M=1, Q=2, H=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QrErrorLevel {
    L,
    M,
    Q,
    H,
}

impl QrErrorLevel {
    pub fn code(&self) -> i32 {
        match self {
            QrErrorLevel::L => 0,
            QrErrorLevel::M => 1,
            QrErrorLevel::Q => 2,
            QrErrorLevel::H => 3,
        }
    }
}

/// Every vendor operation the manager issues.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterOperation {
    SetAlignment(Alignment),
    PrintText(String),
    PrintTextWithFont {
        text: String,
        typeface: String,
        size: f32,
    },
    SetFontSize(f32),
    LineWrap(u32),
    PrintQrCode {
        data: String,
        module_size: u32,
        error_level: QrErrorLevel,
    },
}

impl PrinterOperation {
    /// Vendor method name, used in logs and `Unsupported` errors.
    pub fn name(&self) -> &'static str {
        match self {
            PrinterOperation::SetAlignment(_) => "setAlignment",
            PrinterOperation::PrintText(_) => "printText",
            PrinterOperation::PrintTextWithFont { .. } => "printTextWithFont",
            PrinterOperation::SetFontSize(_) => "setFontSize",
            PrinterOperation::LineWrap(_) => "lineWrap",
            PrinterOperation::PrintQrCode { .. } => "printQRCode",
        }
    }
}

/// A bound vendor printer handle.
///
/// `invoke` is a synchronous call into the remote process; the service
/// answers later through `reply`. An `Err` means the call itself never
/// reached the printer.
pub trait PrinterService: Send + Sync {
    fn invoke(&self, operation: &PrinterOperation, reply: &ReplySink) -> Result<(), TransportError>;

    /// Raw status code, see [`crate::status::PrinterStatus`].
    fn printer_status(&self) -> Result<i32, TransportError>;
}

/// Deferred body of a command. Runs once per dispatch; a command re-queued
/// after a transport failure runs again on the next session.
pub type CommandAction =
    Arc<dyn Fn(&dyn PrinterService, &ReplySink) -> Result<(), TransportError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a submitter hears back about its command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    RunResult(bool),
    ReturnString(String),
    Raised { code: i32, message: String },
    Progress(i32),
    /// The command failed locally and will not run again.
    Abandoned(String),
    /// The command was discarded from the pending queue without running.
    Dropped(String),
}

impl CommandEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandEvent::Progress(_))
    }
}

pub(crate) trait Readiness: Send + Sync {
    fn is_ready(&self) -> bool;
}

/// Per-call result callback handed to the service.
///
/// Each command owns its sink, so replies are correlated by request id
/// instead of a shared "current command" slot.
#[derive(Clone)]
pub struct ReplySink {
    request_id: RequestId,
    description: Arc<str>,
    tx: mpsc::UnboundedSender<CommandEvent>,
    readiness: Weak<dyn Readiness>,
}

impl ReplySink {
    pub(crate) fn new(
        request_id: RequestId,
        description: Arc<str>,
        readiness: Weak<dyn Readiness>,
    ) -> (Self, mpsc::UnboundedReceiver<CommandEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            request_id,
            description,
            tx,
            readiness,
        };
        (sink, rx)
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn on_run_result(&self, is_success: bool) {
        info!(request_id = %self.request_id, "Run result for [{}]: success={}", self.description, is_success);
        self.send(CommandEvent::RunResult(is_success));
    }

    pub fn on_return_string(&self, result: &str) {
        info!(request_id = %self.request_id, "Returned string for [{}]: '{}'", self.description, result);
        self.send(CommandEvent::ReturnString(result.to_string()));
    }

    pub fn on_raise_exception(&self, code: i32, message: &str) {
        error!(request_id = %self.request_id, "Service raised for [{}]: code={} message='{}'", self.description, code, message);
        self.send(CommandEvent::Raised {
            code,
            message: message.to_string(),
        });
    }

    pub fn on_progress_update(&self, progress: i32) {
        debug!(request_id = %self.request_id, "Progress for [{}]: {}", self.description, progress);
        self.send(CommandEvent::Progress(progress));
    }

    /// Readiness probe: true while the manager holds a live session.
    pub fn is_ready(&self) -> bool {
        self.readiness
            .upgrade()
            .map(|r| r.is_ready())
            .unwrap_or(false)
    }

    pub(crate) fn abandon(&self, reason: impl Into<String>) {
        self.send(CommandEvent::Abandoned(reason.into()));
    }

    pub(crate) fn dropped(&self, reason: impl Into<String>) {
        self.send(CommandEvent::Dropped(reason.into()));
    }

    fn send(&self, event: CommandEvent) {
        // Submitter may have dropped its ticket
        let _ = self.tx.send(event);
    }
}

impl fmt::Debug for ReplySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySink")
            .field("request_id", &self.request_id)
            .field("description", &self.description)
            .finish()
    }
}

/// Receiving end of one submitted command.
#[derive(Debug)]
pub struct CommandTicket {
    request_id: RequestId,
    description: Arc<str>,
    events: mpsc::UnboundedReceiver<CommandEvent>,
}

impl CommandTicket {
    pub(crate) fn new(
        request_id: RequestId,
        description: Arc<str>,
        events: mpsc::UnboundedReceiver<CommandEvent>,
    ) -> Self {
        Self {
            request_id,
            description,
            events,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Next event, or `None` once the command can no longer report anything.
    pub async fn recv(&mut self) -> Option<CommandEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CommandEvent> {
        self.events.try_recv().ok()
    }

    /// First terminal event, skipping progress updates.
    pub async fn outcome(mut self) -> Option<CommandEvent> {
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }
}
