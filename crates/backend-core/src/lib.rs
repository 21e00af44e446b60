//! # backend-core
//!
//! Platform-agnostic types and primitives shared by every thread role
//! in the backend: the bounded MPSC ring queue, the event/task data
//! model, session tables, protocol classification, configuration, and
//! the leveled logging and error types the rest of the workspace
//! builds on.
//!
//! OS-thread orchestration (reactors, worker loop, disk/log/timer
//! back-ends) lives in `backend-runtime`; the embedded scripting VM
//! lives in `backend-script`.
//!
//! ## Modules
//!
//! - `ring` - bounded MPSC ring queue
//! - `event` - Event/GenericTask/DiskTask/LogTask data model
//! - `protocol` - RTP classification
//! - `session` - TCP/UDP/RTP session tables
//! - `config` - key=value configuration file reader
//! - `error` - error types
//! - `spinlock` - internal spinlock primitive
//! - `kprint` - leveled, context-tagged logging macros
//! - `env` - environment variable utilities

#![allow(dead_code)]

pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod kprint;
pub mod protocol;
pub mod ring;
pub mod session;
pub mod spinlock;

pub use config::AppConfig;
pub use error::{BackendError, BackendResult, BindError, ConfigError, VmError};
pub use event::{DiskJob, DiskOp, DiskTask, Event, EventContext, GenericTask, LogLevel, LogTask, TaskKind};
pub use protocol::ProtocolType;
pub use ring::{ring, RingReceiver, RingSender};
pub use session::{Connection, ConnState, RtpTable, TcpTable, UdpTable};
pub use spinlock::SpinLock;
