//! Disk executor (component G, first third). One thread per
//! `disk_threads`; round-robins across its assigned partition of
//! `worker_to_disk[*]`, servicing one job per scan.

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use backend_core::ring::RingReceiver;
use backend_core::{kerror, kinfo, kwarn};
use backend_core::{DiskJob, DiskOp, DiskTask};

const IDLE_SLEEP: Duration = Duration::from_millis(1);
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

pub struct DiskExecutor {
    id: usize,
    egress: Vec<(usize, RingReceiver<DiskJob>)>,
    cursor: usize,
}

impl DiskExecutor {
    pub fn new(id: usize, egress: Vec<(usize, RingReceiver<DiskJob>)>) -> Self {
        DiskExecutor { id, egress, cursor: 0 }
    }

    pub fn run(mut self, running: crate::wiring::RunFlag) {
        kinfo!("disk executor {} ready ({} queues)", self.id, self.egress.len());
        while running.load(Ordering::Relaxed) {
            match self.pop_one() {
                Some(job) => self.execute(job),
                None => std::thread::sleep(IDLE_SLEEP),
            }
        }
        kinfo!("disk executor {} stopped", self.id);
    }

    fn pop_one(&mut self) -> Option<DiskJob> {
        if self.egress.is_empty() {
            return None;
        }
        let len = self.egress.len();
        for i in 0..len {
            let idx = (self.cursor + i) % len;
            if let Some(job) = self.egress[idx].1.pop() {
                self.cursor = (idx + 1) % len;
                return Some(job);
            }
        }
        self.cursor = (self.cursor + 1) % len;
        None
    }

    fn execute(&self, job: DiskJob) {
        match job {
            DiskJob::Structured(task) => self.execute_structured(task),
            DiskJob::Described(description) => {
                // A script's `post_disk_task`/`call_external_service`
                // description carries no concrete path/data to act on
                // (§9 open question); it is only logged.
                kinfo!(
                    "disk executor {} received described task: {}",
                    self.id,
                    String::from_utf8_lossy(&description)
                );
            }
        }
    }

    fn execute_structured(&self, task: DiskTask) {
        match task.op {
            DiskOp::Read => {
                kwarn!("disk executor {} got reserved Read op for '{}', ignoring", self.id, task.path);
            }
            DiskOp::Write => {
                if let Err(e) = write_file(&task.path, &task.data) {
                    log_io_error(self.id, "write", &task.path, &e);
                }
            }
            DiskOp::Append => {
                if let Err(e) = append_file(&task.path, &task.data) {
                    log_io_error(self.id, "append", &task.path, &e);
                }
            }
        }
    }
}

fn log_io_error(id: usize, op: &str, path: &str, e: &std::io::Error) {
    if e.kind() == std::io::ErrorKind::NotFound || e.kind() == std::io::ErrorKind::PermissionDenied {
        kwarn!("disk executor {} {} open failed for '{}': {}", id, op, path, e);
    } else {
        kerror!("disk executor {} {} failed for '{}': {}", id, op, path, e);
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    let Some(parent) = path.parent() else { return Ok(()) };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true).mode(DIR_MODE);
            builder.create(parent)
        } else {
            fs::create_dir_all(parent)
        }
    }
}

/// Full truncating write. Invariant: parent directories are created on
/// demand (§3 DiskTask, §8 property 5).
fn write_file(path_str: &str, data: &[u8]) -> std::io::Result<()> {
    let path = Path::new(path_str);
    ensure_parent_dir(path)?;
    fs::write(path, data)
}

/// Append, creating the file (and its parent directories) if it does
/// not already exist — never a failure condition (§3 DiskTask
/// invariant).
fn append_file(path_str: &str, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let path = Path::new(path_str);
    ensure_parent_dir(path)?;
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("backend-runtime-disk-test-{}-{:?}", std::process::id(), std::thread::current().id()));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn write_creates_parent_dir_and_replaces_content() {
        let dir = tempdir();
        let path = dir.join("nested/deep/file.bin");
        write_file(path.to_str().unwrap(), b"first").unwrap();
        write_file(path.to_str().unwrap(), b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn append_creates_file_and_accumulates() {
        let dir = tempdir();
        let path = dir.join("rtp/session_1.bin");
        append_file(path.to_str().unwrap(), b"abc").unwrap();
        append_file(path.to_str().unwrap(), b"def").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abcdef");
    }

    #[test]
    fn disk_executor_processes_structured_and_described_jobs() {
        let dir = tempdir();
        let path = dir.join("state/counter.bin");

        let (tx, rx) = backend_core::ring::ring::<DiskJob>(4);
        tx.push(DiskJob::Structured(DiskTask::write(path.to_str().unwrap(), b"42".to_vec()))).unwrap();
        tx.push(DiskJob::Described(b"external call".to_vec())).unwrap();

        let mut exec = DiskExecutor::new(0, vec![(0, rx)]);
        assert!(matches!(exec.pop_one(), Some(DiskJob::Structured(_))));
        exec.execute(DiskJob::Structured(DiskTask::write(path.to_str().unwrap(), b"42".to_vec())));
        assert_eq!(fs::read(&path).unwrap(), b"42");

        assert!(matches!(exec.pop_one(), Some(DiskJob::Described(_))));
    }
}
