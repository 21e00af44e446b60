//! The per-worker `ScriptVm`: one `mlua::Lua` state, host functions
//! registered once at construction, and the fixed event-dispatch table.

use std::path::Path;

use mlua::Lua;

use backend_core::event::parse_script_log_level;
use backend_core::ring::RingSender;
use backend_core::{kerror, kwarn};
use backend_core::{DiskJob, Event, GenericTask, LogTask, ProtocolType, VmError};

use crate::state;

/// The egress handles a VM's host functions close over. One set per
/// worker; never shared across VMs.
pub struct VmQueues {
    pub to_tcp_io: RingSender<GenericTask>,
    pub to_udp_io: RingSender<GenericTask>,
    pub to_disk: RingSender<DiskJob>,
    pub to_log: RingSender<LogTask>,
}

/// A single worker's embedded interpreter. Lives and dies on the
/// worker's OS thread; never touched from anywhere else.
pub struct ScriptVm {
    lua: Lua,
    initialized: bool,
    worker_index: usize,
}

fn handler_name(protocol: ProtocolType) -> &'static str {
    match protocol {
        ProtocolType::Tcp => "on_tcp_message",
        ProtocolType::Udp => "on_udp_signal",
        ProtocolType::Unknown => "on_timer",
        ProtocolType::Rtp => "on_rtp_message",
    }
}

impl ScriptVm {
    /// Syntax-check `script_path` without running it. Called once at
    /// startup, before any worker thread is spawned: a failure here is
    /// the "VM init" error that aborts startup with exit 1 (§7),
    /// distinct from a runtime error inside an already-running worker's
    /// own VM, which is non-fatal (§4.F).
    pub fn precheck(script_path: &Path) -> Result<(), VmError> {
        let source = read_script(script_path)?;
        let lua = Lua::new();
        lua.load(&source).into_function().map_err(|e| VmError::LoadFailed {
            path: script_path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Build a fresh VM for `worker_index`, registering host functions
    /// and loading `script_path`. Never fails: a load or exec error is
    /// logged and leaves the VM not-initialized, at which point
    /// [`ScriptVm::handle_event`] and [`ScriptVm::restore_state`]
    /// become no-ops, per §4.F item 3. Startup-fatal script problems
    /// are caught earlier by [`ScriptVm::precheck`].
    pub fn new(worker_index: usize, queues: VmQueues, script_path: &Path) -> Self {
        let lua = Lua::new();
        let mut vm = ScriptVm { lua, initialized: false, worker_index };
        match vm.load_and_register(queues, script_path) {
            Ok(()) => vm.initialized = true,
            Err(e) => kerror!("worker {} script vm init failed: {}", worker_index, e),
        }
        vm
    }

    fn load_and_register(&mut self, queues: VmQueues, script_path: &Path) -> Result<(), VmError> {
        register_host_functions(&self.lua, queues, self.worker_index).map_err(|e| VmError::LoadFailed {
            path: script_path.display().to_string(),
            message: e.to_string(),
        })?;

        let source = read_script(script_path)?;
        self.lua.load(&source).exec().map_err(|e| VmError::LoadFailed {
            path: script_path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Invoke `restore_state(name, data)` if the script defines it.
    /// Called once per `(name, data)` pair found under `state/` at
    /// startup, before the worker's event loop begins popping its
    /// inbound queue (§4.F item 4, §8 E6).
    pub fn restore_state(&self, name: &str, data: &[u8]) {
        if !self.initialized {
            return;
        }
        let globals = self.lua.globals();
        let func: mlua::Function = match globals.get("restore_state") {
            Ok(f) => f,
            Err(_) => return,
        };
        let data_str = match self.lua.create_string(data) {
            Ok(s) => s,
            Err(e) => {
                kerror!("worker {} failed to stage restore_state payload for '{}': {}", self.worker_index, name, e);
                return;
            }
        };
        if let Err(e) = func.call::<_, ()>((name.to_string(), data_str)) {
            kerror!("worker {} restore_state('{}') failed: {}", self.worker_index, name, e);
        }
    }

    /// Dispatch `event` to its fixed handler (§4.F dispatch table). A
    /// missing or non-callable handler is a silent no-op; a script
    /// error during the call is caught and logged, and never tears
    /// down the VM or the worker.
    pub fn handle_event(&self, event: &Event) {
        if !self.initialized {
            return;
        }

        let globals = self.lua.globals();
        let name = handler_name(event.protocol);
        let func: mlua::Function = match globals.get(name) {
            Ok(f) => f,
            Err(_) => return,
        };

        let table = match self.lua.create_table() {
            Ok(t) => t,
            Err(e) => {
                kerror!("worker {} failed to build event table: {}", self.worker_index, e);
                return;
            }
        };
        let _ = table.set("protocol", protocol_name(event.protocol));
        let _ = table.set("session_id", event.session_id);
        let _ = table.set("timestamp_ms", event.context.timestamp_ms);
        let _ = table.set("remote_ip", event.context.remote_ip.clone());
        let _ = table.set("remote_port", event.context.remote_port);
        if let Ok(payload) = self.lua.create_string(&event.payload) {
            let _ = table.set("payload", payload);
        }

        if let Err(e) = func.call::<_, ()>(table) {
            kerror!("worker {} handler '{}' error: {}", self.worker_index, name, e);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn protocol_name(p: ProtocolType) -> &'static str {
    match p {
        ProtocolType::Unknown => "unknown",
        ProtocolType::Tcp => "tcp",
        ProtocolType::Udp => "udp",
        ProtocolType::Rtp => "rtp",
    }
}

fn read_script(path: &Path) -> Result<String, VmError> {
    std::fs::read_to_string(path).map_err(|source| VmError::ScriptUnreadable {
        path: path.display().to_string(),
        source,
    })
}

/// Register the host functions of §4.F's table. Each closure owns the
/// queue handle(s) it needs, captured at registration time — no raw
/// pointers, no `unsafe`, per the spec's design note on back-pointers.
fn register_host_functions(lua: &Lua, queues: VmQueues, worker_index: usize) -> mlua::Result<()> {
    let VmQueues { to_tcp_io, to_udp_io, to_disk, to_log } = queues;
    let globals = lua.globals();

    globals.set(
        "send_tcp",
        lua.create_function(move |_, (session_id, payload): (u64, mlua::String)| {
            let _ = to_tcp_io.push(GenericTask::tcp_send(session_id, payload.as_bytes().to_vec()));
            Ok(())
        })?,
    )?;

    globals.set(
        "send_udp",
        lua.create_function(move |_, (session_id, payload): (u64, mlua::String)| {
            let _ = to_udp_io.push(GenericTask::udp_send(session_id, payload.as_bytes().to_vec()));
            Ok(())
        })?,
    )?;

    let disk_for_post = to_disk.clone();
    globals.set(
        "post_disk_task",
        lua.create_function(move |_, description: mlua::String| {
            let _ = disk_for_post.push(DiskJob::Described(description.as_bytes().to_vec()));
            Ok(())
        })?,
    )?;

    globals.set(
        "call_external_service",
        lua.create_function(move |_, description: mlua::String| {
            // Collapsed into the disk queue per §4.F: external-call
            // wiring is future work.
            let _ = to_disk.push(DiskJob::Described(description.as_bytes().to_vec()));
            Ok(())
        })?,
    )?;

    globals.set(
        "log",
        lua.create_function(move |_, (level, message): (String, String)| {
            let level = parse_script_log_level(&level);
            let _ = to_log.push(LogTask { level, message });
            Ok(())
        })?,
    )?;

    globals.set(
        "persist_state",
        lua.create_function(move |_, (name, data): (String, mlua::String)| {
            if let Err(e) = state::persist(&name, data.as_bytes()) {
                kwarn!("worker {} persist_state('{}') failed: {}", worker_index, name, e);
            }
            Ok(())
        })?,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_core::ring::ring;
    use backend_core::EventContext;

    fn test_queues() -> (
        VmQueues,
        backend_core::ring::RingReceiver<GenericTask>,
        backend_core::ring::RingReceiver<GenericTask>,
        backend_core::ring::RingReceiver<DiskJob>,
        backend_core::ring::RingReceiver<LogTask>,
    ) {
        let (tcp_tx, tcp_rx) = ring(8);
        let (udp_tx, udp_rx) = ring(8);
        let (disk_tx, disk_rx) = ring(8);
        let (log_tx, log_rx) = ring(8);
        (VmQueues { to_tcp_io: tcp_tx, to_udp_io: udp_tx, to_disk: disk_tx, to_log: log_tx }, tcp_rx, udp_rx, disk_rx, log_rx)
    }

    fn write_script(body: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("backend-script-vm-test-{}-{:?}.lua", std::process::id(), std::thread::current().id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn precheck_rejects_syntax_errors() {
        let path = write_script("function on_tcp_message(e\n  -- missing close paren");
        let err = ScriptVm::precheck(&path);
        assert!(err.is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn precheck_accepts_valid_script() {
        let path = write_script("function on_tcp_message(e) end");
        assert!(ScriptVm::precheck(&path).is_ok());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn on_tcp_message_echo_sends_via_queue() {
        let path = write_script("function on_tcp_message(e) send_tcp(e.session_id, e.payload) end");
        let (queues, tcp_rx, _udp_rx, _disk_rx, _log_rx) = test_queues();
        let vm = ScriptVm::new(0, queues, &path);
        assert!(vm.is_initialized());

        let event = Event {
            protocol: ProtocolType::Tcp,
            session_id: 7,
            context: EventContext { timestamp_ms: 1, remote_ip: "127.0.0.1".into(), remote_port: 1 },
            payload: b"hello".to_vec(),
        };
        vm.handle_event(&event);

        let task = tcp_rx.pop().expect("expected an echoed send_tcp task");
        assert_eq!(task.session_id, 7);
        assert_eq!(task.payload, b"hello");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_handler_is_silent_no_op() {
        let path = write_script("function on_tcp_message(e) end");
        let (queues, tcp_rx, _udp_rx, _disk_rx, _log_rx) = test_queues();
        let vm = ScriptVm::new(0, queues, &path);

        let event = Event {
            protocol: ProtocolType::Udp,
            session_id: 1,
            context: EventContext { timestamp_ms: 0, remote_ip: String::new(), remote_port: 0 },
            payload: Vec::new(),
        };
        vm.handle_event(&event); // on_udp_signal undefined: must not panic
        assert!(tcp_rx.pop().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn uninitialized_vm_drops_events_silently() {
        let path = write_script("this is not ) valid lua (((");
        let (queues, tcp_rx, _udp_rx, _disk_rx, _log_rx) = test_queues();
        let vm = ScriptVm::new(0, queues, &path);
        assert!(!vm.is_initialized());

        let event = Event {
            protocol: ProtocolType::Tcp,
            session_id: 1,
            context: EventContext { timestamp_ms: 0, remote_ip: String::new(), remote_port: 0 },
            payload: b"x".to_vec(),
        };
        vm.handle_event(&event);
        assert!(tcp_rx.pop().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restore_state_invokes_script_hook() {
        let path = write_script(
            "restored = nil\nfunction restore_state(name, data) restored = name .. ':' .. data end",
        );
        let (queues, _tcp_rx, _udp_rx, _disk_rx, _log_rx) = test_queues();
        let vm = ScriptVm::new(0, queues, &path);
        vm.restore_state("counter", b"42");

        let restored: String = vm.lua.globals().get("restored").unwrap();
        assert_eq!(restored, "counter:42");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn log_host_function_defaults_unknown_level_to_info() {
        let path = write_script("function on_timer(e) log('bogus', 'tick') end");
        let (queues, _tcp_rx, _udp_rx, _disk_rx, log_rx) = test_queues();
        let vm = ScriptVm::new(0, queues, &path);

        let event = Event::timer_tick(5);
        vm.handle_event(&event);

        let task = log_rx.pop().expect("expected a log task");
        assert_eq!(task.level, backend_core::LogLevel::Info);
        assert_eq!(task.message, "tick");
        let _ = std::fs::remove_file(&path);
    }
}
