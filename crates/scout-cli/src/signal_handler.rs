//! Shutdown signal handling

use futures::stream::StreamExt;
use scout_core::error::{ScoutError, ScoutResult};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};

/// Which signal ended the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            SIGINT => Some(Self::Interrupt),
            SIGTERM => Some(Self::Terminate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// Listens for SIGINT and SIGTERM
pub struct SignalHandler {
    signals: Signals,
    handle: Handle,
}

impl SignalHandler {
    /// Register for shutdown signals
    pub fn new() -> ScoutResult<Self> {
        let signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
            ScoutError::initialization_with_context(e.to_string(), "registering signal handlers")
        })?;
        let handle = signals.handle();
        Ok(Self { signals, handle })
    }

    /// Wait for the first shutdown signal
    pub async fn wait(&mut self) -> Option<ShutdownSignal> {
        while let Some(signal) = self.signals.next().await {
            if let Some(signal) = ShutdownSignal::from_raw(signal) {
                return Some(signal);
            }
        }
        None
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.handle.close();
    }
}
