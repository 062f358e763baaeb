use crate::errors::{PrinterError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// One candidate printer service: the package hosting it and the interface
/// action it is bound through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendIdentity {
    pub name: String,
    pub endpoint_address: String,
}

impl BackendIdentity {
    pub fn new(name: impl Into<String>, endpoint_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint_address: endpoint_address.into(),
        }
    }
}

impl fmt::Display for BackendIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.endpoint_address)
    }
}

/// Vendor service table shipped on Sunmi V1s firmwares, primary first.
static SUNMI_IDENTITIES: Lazy<IdentityTable> = Lazy::new(|| IdentityTable {
    primary: BackendIdentity::new(
        "woyou.aidlservice.jiuiv5",
        "woyou.aidlservice.jiuiv5.IWoyouService",
    ),
    fallbacks: vec![
        BackendIdentity::new(
            "com.sunmi.printerservice",
            "com.sunmi.printerservice.IWoyouService",
        ),
        BackendIdentity::new(
            "woyou.aidlservice.jiuiv5.main",
            "woyou.aidlservice.jiuiv5.IWoyouService",
        ),
        BackendIdentity::new(
            "com.sunmi.sunmiservice",
            "woyou.aidlservice.jiuiv5.IWoyouService",
        ),
    ],
});

/// Ordered candidate list. Order is trial order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityTable {
    pub primary: BackendIdentity,
    #[serde(default)]
    pub fallbacks: Vec<BackendIdentity>,
}

impl IdentityTable {
    pub fn new(primary: BackendIdentity, fallbacks: Vec<BackendIdentity>) -> Self {
        Self { primary, fallbacks }
    }

    pub fn sunmi() -> Self {
        SUNMI_IDENTITIES.clone()
    }

    /// `1 + fallbacks`, the attempt budget of one connection sequence.
    pub fn max_attempts(&self) -> usize {
        1 + self.fallbacks.len()
    }

    pub fn get(&self, index: usize) -> Option<&BackendIdentity> {
        if index == 0 {
            Some(&self.primary)
        } else {
            self.fallbacks.get(index - 1)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendIdentity> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    pub fn is_primary(&self, identity: &BackendIdentity) -> bool {
        &self.primary == identity
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for identity in self.iter() {
            if identity.name.trim().is_empty() || identity.endpoint_address.trim().is_empty() {
                return Err(PrinterError::Config(format!(
                    "identity with empty name or endpoint: {:?}",
                    identity
                )));
            }
            if !seen.insert(identity) {
                return Err(PrinterError::Config(format!(
                    "duplicate identity in table: {}",
                    identity
                )));
            }
        }
        Ok(())
    }
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self::sunmi()
    }
}

/// Delay policy for reconnects triggered from the UI layer (resume, retry button).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Pause between two `connect()` tries (default: 1.5 seconds)
    pub delay_ms: u64,
    /// Number of retries after the first try (default: 3)
    pub max_retries: usize,
    /// How long one try may take to settle before it counts as failed (default: 10 seconds)
    pub settle_timeout_ms: u64,
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1500,
            max_retries: 3,
            settle_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub identities: IdentityTable,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl ManagerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.identities.validate()?;
        if self.reconnect.delay_ms == 0 {
            return Err(PrinterError::Config(
                "reconnect.delay_ms must be positive".to_string(),
            ));
        }
        if self.reconnect.settle_timeout_ms == 0 {
            return Err(PrinterError::Config(
                "reconnect.settle_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
