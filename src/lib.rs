//! Connection manager for the vendor printer service on Sunmi V1s terminals.
//!
//! [`ConnectionManager`] binds to one of several candidate printer services
//! (primary first, then fallbacks), queues commands issued while no session
//! exists and replays them in order once one is established.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sunmi_printer::{Alignment, ConnectionManager, IdentityTable, SimulatedBackend};
//!
//! let backend = Arc::new(SimulatedBackend::new(["woyou.aidlservice.jiuiv5"]));
//! let manager = ConnectionManager::new(backend, IdentityTable::sunmi());
//! manager.set_connection_listener(|connected| println!("printer connected: {connected}"));
//! manager.print_text("Hello\n", Alignment::Center);
//! ```

pub mod backend;
pub mod commands;
pub mod config;
pub mod errors;
pub mod manager;
mod printer;
pub mod probe;
mod reconnect;
pub mod sim;
pub mod status;

pub use backend::{PrinterBackend, SessionEvents};
pub use commands::{
    Alignment, CommandAction, CommandEvent, CommandTicket, PrinterOperation, PrinterService,
    QrErrorLevel, ReplySink, RequestId,
};
pub use config::{BackendIdentity, IdentityTable, ManagerConfig, ReconnectConfig};
pub use errors::{BindError, PrinterError, Result, TransportError};
pub use manager::{ConnectionInfo, ConnectionListener, ConnectionManager, ConnectionState};
pub use probe::{CapabilityProbe, ProbeReport};
pub use sim::SimulatedBackend;
pub use status::PrinterStatus;
