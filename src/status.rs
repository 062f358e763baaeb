//! Printer status codes reported by the vendor service, single source of truth.
//!
//! Codes 0..=9 and -1 come from the service and must stay bit-for-bit.
//! Negative codes below -999 are produced locally while querying.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOT_CONNECTED: i32 = -1000;
pub const TRANSPORT_FAILURE: i32 = -1001;
pub const QUERY_FAILED: i32 = -1002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    Normal,
    Preparing,
    CommunicationError,
    OutOfPaper,
    Overheated,
    CoverOpen,
    CutterError,
    CutterOutOfStock,
    BlackMarkNotDetected,
    FirmwareUpgrading,
    CheckFailed,
    /// Queried while no session existed; the query was not deferred.
    NotConnected,
    /// The service died while answering.
    TransportFailure,
    /// Any other failure while answering.
    QueryFailed,
    Unknown(i32),
}

impl PrinterStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PrinterStatus::Normal,
            1 => PrinterStatus::Preparing,
            2 => PrinterStatus::CommunicationError,
            3 => PrinterStatus::OutOfPaper,
            4 => PrinterStatus::Overheated,
            5 => PrinterStatus::CoverOpen,
            6 => PrinterStatus::CutterError,
            7 => PrinterStatus::CutterOutOfStock,
            8 => PrinterStatus::BlackMarkNotDetected,
            9 => PrinterStatus::FirmwareUpgrading,
            -1 => PrinterStatus::CheckFailed,
            NOT_CONNECTED => PrinterStatus::NotConnected,
            TRANSPORT_FAILURE => PrinterStatus::TransportFailure,
            QUERY_FAILED => PrinterStatus::QueryFailed,
            other => PrinterStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            PrinterStatus::Normal => 0,
            PrinterStatus::Preparing => 1,
            PrinterStatus::CommunicationError => 2,
            PrinterStatus::OutOfPaper => 3,
            PrinterStatus::Overheated => 4,
            PrinterStatus::CoverOpen => 5,
            PrinterStatus::CutterError => 6,
            PrinterStatus::CutterOutOfStock => 7,
            PrinterStatus::BlackMarkNotDetected => 8,
            PrinterStatus::FirmwareUpgrading => 9,
            PrinterStatus::CheckFailed => -1,
            PrinterStatus::NotConnected => NOT_CONNECTED,
            PrinterStatus::TransportFailure => TRANSPORT_FAILURE,
            PrinterStatus::QueryFailed => QUERY_FAILED,
            PrinterStatus::Unknown(code) => *code,
        }
    }

    /// True only when the printer reports it can take a job right now.
    pub fn is_ready(&self) -> bool {
        matches!(self, PrinterStatus::Normal)
    }

    /// Whether the code was produced locally rather than by the service.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            PrinterStatus::NotConnected | PrinterStatus::TransportFailure | PrinterStatus::QueryFailed
        )
    }

    pub fn description(&self) -> String {
        match self {
            PrinterStatus::Normal => "Printer normal".to_string(),
            PrinterStatus::Preparing => "Printer is preparing".to_string(),
            PrinterStatus::CommunicationError => "Printer communication error".to_string(),
            PrinterStatus::OutOfPaper => "Out of paper".to_string(),
            PrinterStatus::Overheated => "Print head overheated".to_string(),
            PrinterStatus::CoverOpen => "Printer cover open".to_string(),
            PrinterStatus::CutterError => "Cutter error".to_string(),
            PrinterStatus::CutterOutOfStock => "Cutter out of stock".to_string(),
            PrinterStatus::BlackMarkNotDetected => "Black mark not detected".to_string(),
            PrinterStatus::FirmwareUpgrading => "Firmware upgrade in progress".to_string(),
            PrinterStatus::CheckFailed => "Printer status check failed".to_string(),
            PrinterStatus::NotConnected => "Printer service not connected".to_string(),
            PrinterStatus::TransportFailure => "Printer service died during status query".to_string(),
            PrinterStatus::QueryFailed => "Printer status query failed".to_string(),
            PrinterStatus::Unknown(code) => format!("Unknown status: {}", code),
        }
    }
}

impl fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
