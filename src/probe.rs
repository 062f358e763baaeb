use crate::config::{BackendIdentity, IdentityTable};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Answers what is installed on the device. Backed by the platform package
/// manager in production.
pub trait CapabilityProbe {
    fn is_package_installed(&self, package: &str) -> anyhow::Result<bool>;

    /// Whether the identity's interface action resolves to a service.
    fn resolves(&self, identity: &BackendIdentity) -> anyhow::Result<bool>;
}

/// Which candidate services a device actually offers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub has_primary: bool,
    pub has_alternative: bool,
    pub available: Vec<BackendIdentity>,
    pub errors: Vec<String>,
}

impl ProbeReport {
    pub fn collect(probe: &dyn CapabilityProbe, table: &IdentityTable) -> Self {
        let mut report = ProbeReport::default();

        for identity in table.iter() {
            let installed = match probe.is_package_installed(&identity.name) {
                Ok(installed) => installed,
                Err(e) => {
                    warn!("Package check failed for {}: {}", identity.name, e);
                    report.errors.push(format!("Package check failed for {}: {}", identity.name, e));
                    false
                }
            };
            let resolves = match probe.resolves(identity) {
                Ok(resolves) => resolves,
                Err(e) => {
                    warn!("Service query failed for {}: {}", identity, e);
                    report.errors.push(format!("Service query failed for {}: {}", identity, e));
                    false
                }
            };

            if installed || resolves {
                debug!("Found printer service candidate {}", identity);
                if table.is_primary(identity) {
                    report.has_primary = true;
                } else {
                    report.has_alternative = true;
                }
                report.available.push(identity.clone());
            }
        }

        report
    }

    pub fn has_any(&self) -> bool {
        self.has_primary || self.has_alternative
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== PRINTER SERVICE CHECK ===")?;
        writeln!(f, "Primary service available: {}", self.has_primary)?;
        writeln!(f, "Alternative service available: {}", self.has_alternative)?;
        writeln!(f, "Available services: {}", self.available.len())?;
        for identity in &self.available {
            writeln!(f, "  - {}", identity)?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "Errors:")?;
            for error in &self.errors {
                writeln!(f, "  - {}", error)?;
            }
        }
        write!(f, "=============================")
    }
}
