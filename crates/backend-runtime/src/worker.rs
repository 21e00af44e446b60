//! Worker (component E). One thread per `worker_threads`; exclusive
//! consumer of its `io_to_worker[index]` ring. Owns exactly one
//! [`ScriptVm`] for the thread's lifetime.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use backend_core::kprint::{clear_worker_id, set_worker_id};
use backend_core::kinfo;
use backend_core::ring::{RingReceiver, RingSender};
use backend_core::{DiskJob, Event, GenericTask, LogTask};

use backend_script::{ScriptVm, VmQueues};

const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct WorkerConfig {
    pub id: usize,
    pub script_path: PathBuf,
    pub inbound: RingReceiver<Event>,
    pub to_tcp_io: RingSender<GenericTask>,
    pub to_udp_io: RingSender<GenericTask>,
    pub to_disk: RingSender<DiskJob>,
    pub to_log: RingSender<LogTask>,
    /// `(name, data)` pairs read from `state/` at startup. Handed to
    /// every worker, but only worker 0 actually calls `restore_state`
    /// with them (§4.F item 4, §8 E6).
    pub restore: Arc<Vec<(String, Vec<u8>)>>,
}

/// Run the worker loop on the calling (spawned) thread until `running`
/// clears. Never blocks on a queue: an empty inbound ring is a 1ms
/// cooperative backoff, per §4.E item 1 and §5's suspension-point list.
pub fn run_worker(cfg: WorkerConfig, running: crate::wiring::RunFlag) {
    set_worker_id(cfg.id as u32);
    kinfo!("worker {} starting", cfg.id);

    let queues = VmQueues {
        to_tcp_io: cfg.to_tcp_io,
        to_udp_io: cfg.to_udp_io,
        to_disk: cfg.to_disk,
        to_log: cfg.to_log,
    };
    let vm = ScriptVm::new(cfg.id, queues, &cfg.script_path);

    // Restore state into the first worker's VM only, matching the
    // original's `LoadStateFiles(*lua_vms_[0])` and E6's "invoked
    // exactly once" (§4.F item 4, §8 E6).
    if cfg.id == 0 {
        for (name, data) in cfg.restore.iter() {
            vm.restore_state(name, data);
        }
    }

    while running.load(Ordering::Relaxed) {
        match cfg.inbound.pop() {
            Some(event) => vm.handle_event(&event),
            None => std::thread::sleep(IDLE_SLEEP),
        }
    }

    clear_worker_id();
    kinfo!("worker {} stopped", cfg.id);
}
