//! Timer ticker (component G, last third). Every 10ms, broadcasts a
//! timer event to every worker's inbound ring. `timer_threads > 1` just
//! duplicates the broadcast — harmless, since timer ticks are
//! idempotent heartbeats rather than state-carrying events.

use std::sync::atomic::Ordering;
use std::time::Duration;

use backend_core::event::Event;
use backend_core::kinfo;
use backend_core::ring::RingSender;

const TICK_INTERVAL: Duration = Duration::from_millis(10);

pub struct TimerTicker {
    id: usize,
    io_to_worker: Vec<RingSender<Event>>,
}

impl TimerTicker {
    pub fn new(id: usize, io_to_worker: Vec<RingSender<Event>>) -> Self {
        TimerTicker { id, io_to_worker }
    }

    pub fn run(self, running: crate::wiring::RunFlag) {
        kinfo!("timer ticker {} ready ({} workers)", self.id, self.io_to_worker.len());
        while running.load(Ordering::Relaxed) {
            let tick = Event::timer_tick(now_ms());
            for sender in &self.io_to_worker {
                // Best-effort: a full inbound ring just drops this
                // tick, same as any other event (§4.E backpressure).
                let _ = sender.push(tick.clone());
            }
            std::thread::sleep(TICK_INTERVAL);
        }
        kinfo!("timer ticker {} stopped", self.id);
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_to_every_worker_queue() {
        let (tx0, rx0) = backend_core::ring::ring::<Event>(4);
        let (tx1, rx1) = backend_core::ring::ring::<Event>(4);
        let ticker = TimerTicker::new(0, vec![tx0, tx1]);

        let tick = Event::timer_tick(now_ms());
        for sender in &ticker.io_to_worker {
            sender.push(tick.clone()).unwrap();
        }

        assert!(rx0.pop().unwrap().is_timer_tick());
        assert!(rx1.pop().unwrap().is_timer_tick());
    }
}
