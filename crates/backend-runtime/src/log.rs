//! Log consumer (component G, second third). Drains `LogTask`s posted
//! by scripts via `log(level, message)` and re-emits them through
//! [`backend_core::kprint`] at the requested level.
//!
//! There is exactly one producer-side queue (`worker_to_log_tx` is
//! cloned by every worker, but the receiving ring itself has a single
//! owner). `log_threads` can still be configured above 1; only the
//! first such thread gets the real [`RingReceiver`] — the rest are
//! handed a disposable ring whose sender is dropped immediately, so
//! they sit idle and still honor `running` and `join` like every other
//! thread role, per §4.E's "any thread may be one of several" wording.

use std::sync::atomic::Ordering;
use std::time::Duration;

use backend_core::kprint::_klog_impl;
use backend_core::kinfo;
use backend_core::ring::{ring, RingReceiver};
use backend_core::LogTask;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct LogConsumer {
    id: usize,
    inbound: RingReceiver<LogTask>,
}

impl LogConsumer {
    /// `inbound = Some(rx)` for the one real consumer; `None` for every
    /// extra `log_threads` beyond the first, which gets a disposable
    /// always-empty ring instead.
    pub fn new(id: usize, inbound: Option<RingReceiver<LogTask>>) -> Self {
        let inbound = inbound.unwrap_or_else(|| {
            let (tx, rx) = ring::<LogTask>(1);
            drop(tx);
            rx
        });
        LogConsumer { id, inbound }
    }

    pub fn run(self, running: crate::wiring::RunFlag) {
        kinfo!("log consumer {} ready", self.id);
        while running.load(Ordering::Relaxed) {
            match self.inbound.pop() {
                Some(task) => _klog_impl(task.level, format_args!("{}", task.message)),
                None => std::thread::sleep(IDLE_SLEEP),
            }
        }
        kinfo!("log consumer {} stopped", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_core::LogLevel;

    #[test]
    fn disposable_consumer_never_panics_on_empty_ring() {
        let consumer = LogConsumer::new(1, None);
        assert!(consumer.inbound.is_empty());
        assert!(consumer.inbound.pop().is_none());
    }

    #[test]
    fn real_consumer_drains_posted_tasks() {
        let (tx, rx) = ring::<LogTask>(4);
        tx.push(LogTask { level: LogLevel::Warn, message: "disk queue full".to_string() }).unwrap();
        let consumer = LogConsumer::new(0, Some(rx));
        assert_eq!(consumer.inbound.len(), 1);
        let task = consumer.inbound.pop().unwrap();
        assert_eq!(task.message, "disk queue full");
    }
}
