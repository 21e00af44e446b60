//! Embedded Lua scripting VM adapter.
//!
//! Each worker thread owns exactly one [`ScriptVm`], backed by its own
//! independent `mlua::Lua` state — no VM is ever touched from more
//! than one thread. Host functions registered into the global table
//! give the script a narrow, queue-mediated view of the outside world
//! (`send_tcp`, `send_udp`, `post_disk_task`, `call_external_service`,
//! `log`) plus one synchronous escape hatch, `persist_state`, used for
//! durable per-session bookkeeping a script wants to survive restarts.

mod state;
mod vm;

pub use state::{restore_dir, scan_state_files};
pub use vm::{ScriptVm, VmQueues};
