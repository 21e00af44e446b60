//! The orchestrator: wires every queue, spawns every thread role, and
//! owns the handles needed for cooperative shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use backend_core::{kinfo, AppConfig, BackendResult};

use backend_script::{scan_state_files, ScriptVm};

use crate::disk::DiskExecutor;
use crate::log::LogConsumer;
use crate::timer::TimerTicker;
use crate::udp_reactor::{UdpReactor, UdpSessions};
use crate::tcp_reactor::TcpReactor;
use crate::wiring::{new_run_flag, Queues, RunFlag};
use crate::worker::{run_worker, WorkerConfig};

pub struct Runtime {
    running: RunFlag,
    handles: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Bring up the whole pipeline described by `config`. The only
    /// failure that aborts this call is the main script failing its
    /// syntax precheck (§7 "VM init error"); every other subsystem
    /// (listen/bind, per-worker VM load) degrades to a logged, running
    /// thread that simply does nothing useful, per §4.C/§4.F's
    /// non-fatal failure language.
    pub fn start(config: &AppConfig) -> BackendResult<Self> {
        let script_path = PathBuf::from(&config.lua_main_script);
        ScriptVm::precheck(Path::new(&script_path))?;

        let running = new_run_flag();
        let restore = Arc::new(scan_state_files());

        let queues = Queues::new(
            config.worker_threads,
            config.tcp_io_threads,
            config.udp_io_threads,
            config.disk_threads,
            config.queue_size_io_to_worker,
            config.queue_size_worker_to_io,
            config.queue_size_worker_to_disk,
            config.queue_size_worker_to_log,
        );
        let Queues {
            io_to_worker,
            mut io_to_worker_rx,
            worker_to_tcp_io,
            worker_to_udp_io,
            worker_to_disk,
            worker_to_log_tx,
            mut worker_to_log_rx,
        } = queues;

        let sessions = UdpSessions::new();
        let mut handles = Vec::new();

        for (thread_idx, egress) in worker_to_tcp_io.receivers.into_iter().enumerate() {
            let port = config.tcp_port;
            let worker_count = config.worker_threads;
            let io_to_worker = io_to_worker.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("tcp-io-{thread_idx}"))
                    .spawn(move || match TcpReactor::new(thread_idx, port, worker_count, io_to_worker, egress) {
                        Ok(reactor) => reactor.run(running),
                        Err(e) => {
                            backend_core::kerror!("tcp reactor {} failed to start: {}", thread_idx, e);
                        }
                    })
                    .expect("spawn tcp reactor thread"),
            );
        }

        for (thread_idx, egress) in worker_to_udp_io.receivers.into_iter().enumerate() {
            let port = config.tcp_port;
            let worker_count = config.worker_threads;
            let io_to_worker = io_to_worker.clone();
            let worker_to_disk_senders = worker_to_disk.senders.clone();
            let sessions = sessions.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("udp-io-{thread_idx}"))
                    .spawn(move || {
                        match UdpReactor::new(thread_idx, port, worker_count, sessions, io_to_worker, worker_to_disk_senders, egress) {
                            Ok(reactor) => reactor.run(running),
                            Err(e) => {
                                backend_core::kerror!("udp reactor {} failed to start: {}", thread_idx, e);
                            }
                        }
                    })
                    .expect("spawn udp reactor thread"),
            );
        }

        for (thread_idx, egress) in worker_to_disk.receivers.into_iter().enumerate() {
            handles.push(
                std::thread::Builder::new()
                    .name(format!("disk-{thread_idx}"))
                    .spawn(move || DiskExecutor::new(thread_idx, egress).run(running))
                    .expect("spawn disk executor thread"),
            );
        }

        for thread_idx in 0..config.log_threads.max(1) {
            let inbound = if thread_idx == 0 { worker_to_log_rx.take() } else { None };
            handles.push(
                std::thread::Builder::new()
                    .name(format!("log-{thread_idx}"))
                    .spawn(move || LogConsumer::new(thread_idx, inbound).run(running))
                    .expect("spawn log consumer thread"),
            );
        }

        for thread_idx in 0..config.timer_threads.max(1) {
            let io_to_worker = io_to_worker.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("timer-{thread_idx}"))
                    .spawn(move || TimerTicker::new(thread_idx, io_to_worker).run(running))
                    .expect("spawn timer ticker thread"),
            );
        }

        for worker_id in 0..config.worker_threads {
            let inbound = io_to_worker_rx[worker_id].take().expect("one receiver per worker");
            let cfg = WorkerConfig {
                id: worker_id,
                script_path: script_path.clone(),
                inbound,
                to_tcp_io: worker_to_tcp_io.senders[worker_id].clone(),
                to_udp_io: worker_to_udp_io.senders[worker_id].clone(),
                to_disk: worker_to_disk.senders[worker_id].clone(),
                to_log: worker_to_log_tx.clone(),
                restore: restore.clone(),
            };
            handles.push(
                std::thread::Builder::new()
                    .name(format!("worker-{worker_id}"))
                    .spawn(move || run_worker(cfg, running))
                    .expect("spawn worker thread"),
            );
        }

        kinfo!(
            "runtime started: {} tcp, {} udp, {} workers, {} disk, {} log, {} timer threads",
            config.tcp_io_threads,
            config.udp_io_threads,
            config.worker_threads,
            config.disk_threads,
            config.log_threads,
            config.timer_threads,
        );

        Ok(Runtime { running, handles })
    }

    /// Flip the shared flag; every thread observes it within its own
    /// poll interval (epoll timeout or 1/10ms sleep) and exits its loop.
    pub fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::Relaxed);
    }

    /// Block until every spawned thread has returned.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    pub fn run_flag(&self) -> RunFlag {
        self.running
    }
}
