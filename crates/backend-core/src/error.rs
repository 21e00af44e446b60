//! Error types for the backend.
//!
//! Mirrors a single top-level enum wrapping narrower per-subsystem
//! errors via `From`, so `main` matches once at the outer boundary
//! and everything else propagates with `?`.

use core::fmt;

/// Result type for fallible backend startup/configuration operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Top-level error returned from startup-critical operations.
#[derive(Debug)]
pub enum BackendError {
    Config(ConfigError),
    Vm(VmError),
    Bind(BindError),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Config(e) => write!(f, "configuration error: {e}"),
            BackendError::Vm(e) => write!(f, "script VM error: {e}"),
            BackendError::Bind(e) => write!(f, "bind error: {e}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Config(e) => Some(e),
            BackendError::Vm(e) => Some(e),
            BackendError::Bind(e) => Some(e),
        }
    }
}

impl From<ConfigError> for BackendError {
    fn from(e: ConfigError) -> Self {
        BackendError::Config(e)
    }
}

impl From<VmError> for BackendError {
    fn from(e: VmError) -> Self {
        BackendError::Vm(e)
    }
}

impl From<BindError> for BackendError {
    fn from(e: BindError) -> Self {
        BackendError::Bind(e)
    }
}

/// Errors raised while reading or applying the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be opened or read.
    Unreadable { path: String, source: std::io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Unreadable { path, source } => {
                write!(f, "cannot read config file '{path}': {source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Unreadable { source, .. } => Some(source),
        }
    }
}

/// Errors raised while initializing a script VM.
#[derive(Debug)]
pub enum VmError {
    /// The script file could not be read from disk.
    ScriptUnreadable { path: String, source: std::io::Error },
    /// The script failed to load or parse.
    LoadFailed { path: String, message: String },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::ScriptUnreadable { path, source } => {
                write!(f, "cannot read script '{path}': {source}")
            }
            VmError::LoadFailed { path, message } => {
                write!(f, "failed to load script '{path}': {message}")
            }
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmError::ScriptUnreadable { source, .. } => Some(source),
            VmError::LoadFailed { .. } => None,
        }
    }
}

/// Errors raised while binding the TCP listener or UDP socket.
#[derive(Debug)]
pub enum BindError {
    Tcp { port: u16, source: std::io::Error },
    Udp { port: u16, source: std::io::Error },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::Tcp { port, source } => write!(f, "tcp bind on port {port} failed: {source}"),
            BindError::Udp { port, source } => write!(f, "udp bind on port {port} failed: {source}"),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindError::Tcp { source, .. } => Some(source),
            BindError::Udp { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wraps_inner_message() {
        let e: BackendError = ConfigError::Unreadable {
            path: "x.cfg".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        }
        .into();
        let msg = format!("{e}");
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("x.cfg"));
    }

    #[test]
    fn source_chain_reaches_io_error() {
        use std::error::Error;
        let e: BackendError = BindError::Tcp {
            port: 9000,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        }
        .into();
        assert!(e.source().is_some());
    }
}
