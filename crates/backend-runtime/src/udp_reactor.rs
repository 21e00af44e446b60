//! UDP reactor (component D). One thread per `udp_io_threads`, all
//! sharing one `SO_REUSEPORT` socket bound by the caller and the
//! shared UDP/RTP session tables (the kernel fans datagrams out
//! across threads calling `recvfrom` on sibling sockets; the session
//! tables themselves need a lock since more than one reactor thread
//! can observe a brand-new `(ip, port)` or SSRC concurrently).

use std::os::unix::io::RawFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use backend_core::protocol::{is_rtp, rtp_ssrc};
use backend_core::ring::{RingReceiver, RingSender};
use backend_core::spinlock::SpinLock;
use backend_core::{kerror, kinfo, kwarn};
use backend_core::{DiskJob, DiskTask, Event, EventContext, GenericTask, ProtocolType, RtpTable, TaskKind, UdpTable};

use crate::socket;

const SCRATCH_BUF: usize = 65536;
const READINESS_TIMEOUT_MS: u16 = 1000;

/// Session tables shared by every UDP reactor thread (see module doc).
pub struct UdpSessions {
    pub udp: SpinLock<UdpTable>,
    pub rtp: SpinLock<RtpTable>,
}

impl UdpSessions {
    pub fn new() -> Arc<Self> {
        Arc::new(UdpSessions { udp: SpinLock::new(UdpTable::new()), rtp: SpinLock::new(RtpTable::new()) })
    }
}

pub struct UdpReactor {
    id: usize,
    worker_count: usize,
    sock_fd: RawFd,
    epoll: Epoll,
    sessions: Arc<UdpSessions>,
    io_to_worker: Vec<RingSender<Event>>,
    worker_to_disk: Vec<RingSender<DiskJob>>,
    egress: Vec<(usize, RingReceiver<GenericTask>)>,
    egress_cursor: usize,
}

impl UdpReactor {
    pub fn new(
        id: usize,
        port: u16,
        worker_count: usize,
        sessions: Arc<UdpSessions>,
        io_to_worker: Vec<RingSender<Event>>,
        worker_to_disk: Vec<RingSender<DiskJob>>,
        egress: Vec<(usize, RingReceiver<GenericTask>)>,
    ) -> std::io::Result<Self> {
        let sock_fd = socket::bind_udp(port)?;
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        epoll
            .add(sock_fd, EpollEvent::new(EpollFlags::EPOLLIN, sock_fd as u64))
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

        Ok(UdpReactor {
            id,
            worker_count,
            sock_fd,
            epoll,
            sessions,
            io_to_worker,
            worker_to_disk,
            egress,
            egress_cursor: 0,
        })
    }

    pub fn run(mut self, running: crate::wiring::RunFlag) {
        kinfo!("udp reactor {} listening (fd {})", self.id, self.sock_fd);
        let mut events = [EpollEvent::empty(); 16];
        let mut scratch = vec![0u8; SCRATCH_BUF];

        while running.load(Ordering::Relaxed) {
            let n = match self.epoll.wait(&mut events, EpollTimeout::from(READINESS_TIMEOUT_MS)) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    kerror!("udp reactor {} epoll_wait failed: {}", self.id, e);
                    break;
                }
            };

            if n > 0 {
                self.drain_datagrams(&mut scratch);
            }

            self.drain_one_outbound();
        }

        socket::close_fd(self.sock_fd);
        kinfo!("udp reactor {} stopped", self.id);
    }

    fn drain_datagrams(&mut self, scratch: &mut [u8]) {
        loop {
            match socket::recvfrom_nonblocking(self.sock_fd, scratch) {
                Ok(Some((n, remote_ip, remote_port))) => {
                    self.handle_datagram(&scratch[..n], remote_ip, remote_port);
                }
                Ok(None) => break,
                Err(e) => {
                    kwarn!("udp reactor {} recvfrom failed: {}", self.id, e);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, datagram: &[u8], remote_ip: String, remote_port: u16) {
        let now = now_ms();
        let (protocol, session_id) = if is_rtp(datagram) {
            let ssrc = rtp_ssrc(datagram);
            let id = self.sessions.rtp.lock().find_or_create(ssrc, now);
            (ProtocolType::Rtp, id)
        } else {
            let id = self.sessions.udp.lock().find_or_create(&remote_ip, remote_port, now);
            (ProtocolType::Udp, id)
        };

        let shard = (session_id as usize) % self.worker_count;

        let event = Event {
            protocol,
            session_id,
            context: EventContext { timestamp_ms: now, remote_ip, remote_port },
            payload: datagram.to_vec(),
        };
        if self.io_to_worker[shard].push(event).is_err() {
            // Full inbound queue: drop silently (§7 queue overflow).
        }

        let path = match protocol {
            ProtocolType::Rtp => format!("rtp/session_{session_id}.bin"),
            _ => format!("recordings/udp_session_{session_id}.bin"),
        };
        let task = DiskJob::Structured(DiskTask::append(path, datagram.to_vec()));
        // Full disk queue: drop silently — the event was already dispatched.
        let _ = self.worker_to_disk[shard].push(task);
    }

    fn drain_one_outbound(&mut self) {
        if self.egress.is_empty() {
            return;
        }
        let len = self.egress.len();
        for i in 0..len {
            let idx = (self.egress_cursor + i) % len;
            if let Some(task) = self.egress[idx].1.pop() {
                self.egress_cursor = (idx + 1) % len;
                self.handle_outbound(task);
                return;
            }
        }
        self.egress_cursor = (self.egress_cursor + 1) % len;
    }

    fn handle_outbound(&mut self, task: GenericTask) {
        debug_assert_eq!(task.kind, TaskKind::Udp);
        let dest = {
            let udp = self.sessions.udp.lock();
            udp_dest_by_id(&udp, task.session_id)
        };
        match dest {
            Some((ip, port)) => {
                if let Err(e) = socket::sendto(self.sock_fd, &task.payload, &ip, port) {
                    kwarn!("udp reactor {} sendto failed for session {}: {}", self.id, task.session_id, e);
                }
            }
            None => {
                kwarn!("udp reactor {} unknown session {} for outbound send", self.id, task.session_id);
            }
        }
    }
}

/// Linear scan by id, per the spec's `find_by_id` contract for the
/// UDP table ("linear scan acceptable").
fn udp_dest_by_id(table: &UdpTable, id: u64) -> Option<(String, u16)> {
    table.find_addr_by_id(id)
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtp_vs_udp_classification_picks_right_table() {
        let mut rtp_pkt = vec![0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        rtp_pkt.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
        assert!(is_rtp(&rtp_pkt));
        assert_eq!(rtp_ssrc(&rtp_pkt), 0xDEADBEEF);

        let plain = vec![1, 2, 3];
        assert!(!is_rtp(&plain));
    }
}
