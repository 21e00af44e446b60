//! The data model flowing between reactors, workers, and back-ends.

use crate::protocol::ProtocolType;

/// Inbound: I/O or timer -> worker.
#[derive(Debug, Clone)]
pub struct Event {
    pub protocol: ProtocolType,
    pub session_id: u64,
    pub context: EventContext,
    pub payload: Vec<u8>,
}

impl Event {
    /// Build the synthetic timer tick broadcast to every worker.
    pub fn timer_tick(timestamp_ms: u64) -> Self {
        Event {
            protocol: ProtocolType::Unknown,
            session_id: 0,
            context: EventContext {
                timestamp_ms,
                remote_ip: String::new(),
                remote_port: 0,
            },
            payload: Vec::new(),
        }
    }

    pub fn is_timer_tick(&self) -> bool {
        matches!(self.protocol, ProtocolType::Unknown)
    }
}

#[derive(Debug, Clone)]
pub struct EventContext {
    pub timestamp_ms: u64,
    pub remote_ip: String,
    pub remote_port: u16,
}

/// Which edge of the pipeline a `GenericTask` is traveling along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Tcp,
    Udp,
    Timer,
    Disk,
    Log,
}

/// Outbound: worker -> I/O reactor or disk executor.
#[derive(Debug, Clone)]
pub struct GenericTask {
    pub kind: TaskKind,
    pub protocol: ProtocolType,
    pub session_id: u64,
    pub payload: Vec<u8>,
}

impl GenericTask {
    pub fn tcp_send(session_id: u64, payload: Vec<u8>) -> Self {
        GenericTask { kind: TaskKind::Tcp, protocol: ProtocolType::Tcp, session_id, payload }
    }

    pub fn udp_send(session_id: u64, payload: Vec<u8>) -> Self {
        GenericTask { kind: TaskKind::Udp, protocol: ProtocolType::Udp, session_id, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOp {
    /// Reserved; the executor does not currently act on this variant.
    Read,
    Write,
    Append,
}

/// A structured disk task pushed directly by a reactor (e.g. raw RTP
/// recording), as opposed to a script's free-form description.
#[derive(Debug, Clone)]
pub struct DiskTask {
    pub op: DiskOp,
    pub path: String,
    pub data: Vec<u8>,
}

impl DiskTask {
    pub fn append(path: impl Into<String>, data: Vec<u8>) -> Self {
        DiskTask { op: DiskOp::Append, path: path.into(), data }
    }

    pub fn write(path: impl Into<String>, data: Vec<u8>) -> Self {
        DiskTask { op: DiskOp::Write, path: path.into(), data }
    }
}

/// Normalized job accepted by the disk executor: either a structured
/// task from a reactor, or a free-form description pushed by a script
/// via `post_disk_task`/`call_external_service`. Both shapes share one
/// queue; `Described` jobs carry no path/data to execute and are only
/// logged.
#[derive(Debug, Clone)]
pub enum DiskJob {
    Structured(DiskTask),
    Described(Vec<u8>),
}

impl From<DiskTask> for DiskJob {
    fn from(t: DiskTask) -> Self {
        DiskJob::Structured(t)
    }
}

pub use crate::kprint::LogLevel;

/// Parse a script-supplied level string. Unknown level strings default
/// to `Info`, per the script-facing `log(level, message)` host
/// function contract (distinct from `LogLevel::parse_or`'s caller-given
/// default, since this boundary always wants the same fallback).
pub fn parse_script_log_level(s: &str) -> LogLevel {
    LogLevel::parse_or(s, LogLevel::Info)
}

#[derive(Debug, Clone)]
pub struct LogTask {
    pub level: LogLevel,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_tick_is_unknown_protocol_empty_payload() {
        let e = Event::timer_tick(123);
        assert!(e.is_timer_tick());
        assert!(e.payload.is_empty());
        assert_eq!(e.context.timestamp_ms, 123);
    }

    #[test]
    fn unknown_log_level_defaults_to_info() {
        assert_eq!(parse_script_log_level("bogus"), LogLevel::Info);
        assert_eq!(parse_script_log_level("CRITICAL"), LogLevel::Critical);
    }

    #[test]
    fn severity_ordering_is_filter_threshold_order() {
        // Lower discriminant = stricter filter threshold, not "less severe".
        assert!(LogLevel::Critical < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }
}
