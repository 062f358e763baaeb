use crate::config::ReconnectConfig;
use crate::errors::{PrinterError, Result};
use crate::manager::{ConnectionManager, ConnectionState};
use backon::{ConstantBuilder, Retryable};
use std::time::Duration;
use tracing::{info, warn};

impl ConnectionManager {
    /// Reconnect helper for the UI layer (app resumed, retry button).
    ///
    /// Each try calls `connect()` and waits for the sequence to settle.
    /// Tries are spaced by `config.delay_ms` so a device without any printer
    /// service is not hammered.
    pub async fn reconnect_with_backoff(&self, config: &ReconnectConfig) -> Result<()> {
        let settle_timeout = config.settle_timeout();
        let try_connect = || self.connect_and_settle(settle_timeout);

        // Constant spacing: 1.5s → 1.5s → 1.5s
        let backoff = ConstantBuilder::default()
            .with_delay(config.delay())
            .with_max_times(config.max_retries);

        try_connect
            .retry(backoff)
            .notify(|err: &PrinterError, dur: Duration| {
                warn!("Printer service still unavailable ({}), retrying in {:?}", err, dur);
            })
            .await
            .map_err(|_| PrinterError::ReconnectFailed(config.max_retries + 1))?;

        info!("Printer service reconnected");
        Ok(())
    }

    async fn connect_and_settle(&self, settle_timeout: Duration) -> Result<()> {
        let mut state = self.subscribe_state();
        self.connect();

        let settled = tokio::time::timeout(
            settle_timeout,
            state.wait_for(|s| *s != ConnectionState::Connecting),
        )
        .await;

        // Copy the value out before touching the manager lock
        let connected = match settled {
            Ok(Ok(current)) => *current == ConnectionState::Connected,
            _ => false,
        };
        if connected && self.is_connected() {
            Ok(())
        } else {
            Err(PrinterError::NotConnected)
        }
    }
}
