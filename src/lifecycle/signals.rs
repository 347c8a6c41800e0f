//! OS signal handling.
//!
//! # Responsibilities
//! - Name the termination signals a deployment may observe
//! - Register one listener task per configured signal
//! - Forward every delivery to the shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Repeated deliveries are forwarded too; the coordinator makes them no-ops
//! - Handler registration happens synchronously so failures surface at setup

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::LifecycleError;

/// A termination signal that can trigger shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Signal {
    Terminate,
    Interrupt,
    Hangup,
    Quit,
    User1,
    User2,
}

impl Signal {
    /// Conventional signal name, e.g. `SIGTERM`.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Terminate => "SIGTERM",
            Signal::Interrupt => "SIGINT",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            Signal::Terminate => SignalKind::terminate(),
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = LifecycleError;

    /// Case-insensitive; the `SIG` prefix is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        match bare {
            "TERM" => Ok(Signal::Terminate),
            "INT" => Ok(Signal::Interrupt),
            "HUP" => Ok(Signal::Hangup),
            "QUIT" => Ok(Signal::Quit),
            "USR1" => Ok(Signal::User1),
            "USR2" => Ok(Signal::User2),
            _ => Err(LifecycleError::UnknownSignal(s.to_string())),
        }
    }
}

impl TryFrom<String> for Signal {
    type Error = LifecycleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Signal> for String {
    fn from(signal: Signal) -> Self {
        signal.name().to_string()
    }
}

/// Listen for `signal` and call `on_signal` for every delivery.
///
/// Must be called from within a Tokio runtime.
#[cfg(unix)]
pub fn listen<F>(signal: Signal, on_signal: F) -> Result<JoinHandle<()>, LifecycleError>
where
    F: Fn(Signal) + Send + 'static,
{
    let mut stream = tokio::signal::unix::signal(signal.kind())
        .map_err(|source| LifecycleError::SignalInstall { signal, source })?;

    tracing::debug!(%signal, "Signal handler installed");

    Ok(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            tracing::info!(%signal, "Received signal");
            on_signal(signal);
        }
    }))
}

/// Listen for `signal` and call `on_signal` for every delivery.
///
/// Only `SIGINT` (Ctrl+C) is observable off unix.
#[cfg(not(unix))]
pub fn listen<F>(signal: Signal, on_signal: F) -> Result<JoinHandle<()>, LifecycleError>
where
    F: Fn(Signal) + Send + 'static,
{
    if signal != Signal::Interrupt {
        return Err(LifecycleError::UnsupportedSignal(signal));
    }

    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            tracing::info!(%signal, "Received signal");
            on_signal(signal);
        }
    }))
}
