//! Queue construction and the fixed partitioning that keeps every ring
//! in this pipeline single-consumer.
//!
//! The spec describes egress queues as addressable "by worker index",
//! scanned by "any" reactor. Taken literally that would let more than
//! one OS thread pop from the same ring, which breaks the bounded
//! ring's single-consumer contract (`backend_core::ring`). This
//! implementation resolves that by statically partitioning each
//! per-worker queue array across the pool of threads that drains it:
//! worker index `w` is drained by thread `w % pool_size`. Every ring
//! still has exactly one consumer; the pipeline's observable behavior
//! (any worker's egress eventually reaches the transport) is
//! unchanged.

use backend_core::ring::{ring, RingReceiver, RingSender};
use backend_core::{DiskJob, Event, GenericTask, LogTask};

/// Splits `W` per-worker queues into `pools` contiguous-by-modulo
/// groups, one per draining thread. `senders[w]` is handed to
/// producers (workers, or I/O reactors for disk tasks); `receivers`
/// groups the corresponding consumer halves by owning thread index.
pub struct Partitioned<T> {
    pub senders: Vec<RingSender<T>>,
    /// `receivers[thread_idx]` is the list of `(worker_idx, receiver)`
    /// pairs that thread exclusively drains.
    pub receivers: Vec<Vec<(usize, RingReceiver<T>)>>,
}

pub fn build_partitioned<T>(worker_count: usize, pool_size: usize, capacity: usize) -> Partitioned<T> {
    let pool_size = pool_size.max(1);
    let mut senders = Vec::with_capacity(worker_count);
    let mut receivers: Vec<Vec<(usize, RingReceiver<T>)>> = (0..pool_size).map(|_| Vec::new()).collect();

    for w in 0..worker_count {
        let (tx, rx) = ring::<T>(capacity);
        senders.push(tx);
        receivers[w % pool_size].push((w, rx));
    }

    Partitioned { senders, receivers }
}

/// The full queue topology, built once at startup and handed out to
/// every thread role.
pub struct Queues {
    /// Inbound: reactor/timer -> worker. One ring per worker; the
    /// worker itself is the sole consumer.
    pub io_to_worker: Vec<RingSender<Event>>,
    pub io_to_worker_rx: Vec<Option<RingReceiver<Event>>>,

    /// Outbound Tcp-kind tasks, partitioned across `tcp_io_threads`.
    pub worker_to_tcp_io: Partitioned<GenericTask>,
    /// Outbound Udp-kind tasks, partitioned across `udp_io_threads`.
    pub worker_to_udp_io: Partitioned<GenericTask>,
    /// Disk jobs (structured, from reactors, or described, from
    /// scripts), partitioned across `disk_threads`.
    pub worker_to_disk: Partitioned<DiskJob>,

    /// Single global log queue. See [`crate::log_consumer`] for how
    /// `log_threads > 1` is handled without breaking single-consumer.
    pub worker_to_log_tx: RingSender<LogTask>,
    pub worker_to_log_rx: Option<RingReceiver<LogTask>>,
}

impl Queues {
    pub fn new(
        worker_count: usize,
        tcp_io_threads: usize,
        udp_io_threads: usize,
        disk_threads: usize,
        queue_size_io_to_worker: usize,
        queue_size_worker_to_io: usize,
        queue_size_worker_to_disk: usize,
        queue_size_worker_to_log: usize,
    ) -> Self {
        let mut io_to_worker = Vec::with_capacity(worker_count);
        let mut io_to_worker_rx = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (tx, rx) = ring::<Event>(queue_size_io_to_worker);
            io_to_worker.push(tx);
            io_to_worker_rx.push(Some(rx));
        }

        let worker_to_tcp_io = build_partitioned(worker_count, tcp_io_threads, queue_size_worker_to_io);
        let worker_to_udp_io = build_partitioned(worker_count, udp_io_threads, queue_size_worker_to_io);
        let worker_to_disk = build_partitioned(worker_count, disk_threads, queue_size_worker_to_disk);

        let (log_tx, log_rx) = ring::<LogTask>(queue_size_worker_to_log);

        Queues {
            io_to_worker,
            io_to_worker_rx,
            worker_to_tcp_io,
            worker_to_udp_io,
            worker_to_disk,
            worker_to_log_tx: log_tx,
            worker_to_log_rx: Some(log_rx),
        }
    }
}

/// Shared "keep running" flag, polled cooperatively by every thread.
///
/// A genuine process-wide singleton (one process hosts one [`crate::runtime::Runtime`]),
/// so this is a `&'static AtomicBool` rather than an `Arc`: every call
/// to [`new_run_flag`] yields a reference to the same function-local
/// static, which also lets a C signal handler (which can't capture an
/// `Arc`) flip the same flag by calling this function again.
pub type RunFlag = &'static std::sync::atomic::AtomicBool;

pub fn new_run_flag() -> RunFlag {
    static RUNNING: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);
    &RUNNING
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_worker_exactly_once() {
        let p = build_partitioned::<u32>(8, 3, 4);
        assert_eq!(p.senders.len(), 8);
        let mut seen: Vec<usize> = p.receivers.iter().flatten().map(|(w, _)| *w).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn partition_assigns_by_modulo() {
        let p = build_partitioned::<u32>(5, 2, 4);
        let thread0: Vec<usize> = p.receivers[0].iter().map(|(w, _)| *w).collect();
        let thread1: Vec<usize> = p.receivers[1].iter().map(|(w, _)| *w).collect();
        assert_eq!(thread0, vec![0, 2, 4]);
        assert_eq!(thread1, vec![1, 3]);
    }
}
