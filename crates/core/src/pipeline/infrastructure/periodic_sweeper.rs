use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::shared::clock::Clock;
use crate::shared::sweep::Sweepable;

/// Background thread that sweeps a shared arena on a fixed interval.
///
/// Stops when [`PeriodicSweeper::stop`] is called or the handle is dropped.
pub struct PeriodicSweeper {
    label: &'static str,
    stop_tx: Option<crossbeam_channel::Sender<()>>,
    handle: Option<JoinHandle<usize>>,
}

impl PeriodicSweeper {
    pub fn spawn<S>(target: Arc<Mutex<S>>, interval: Duration, clock: Arc<dyn Clock>) -> Self
    where
        S: Sweepable + 'static,
    {
        let label = match target.lock() {
            Ok(guard) => guard.label(),
            Err(poisoned) => poisoned.into_inner().label(),
        };
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(interval);

        let handle = std::thread::spawn(move || {
            let mut total = 0;
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        let Ok(mut guard) = target.lock() else {
                            log::warn!("{label} sweeper stopping: lock poisoned");
                            break;
                        };
                        let removed = guard.sweep(clock.now_ms());
                        if removed > 0 {
                            log::debug!("{label} sweeper removed {removed}");
                        }
                        total += removed;
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
            total
        });

        log::debug!("{label} sweeper started every {interval:?}");
        Self {
            label,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Stop the thread and return how many entries it removed overall.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for PeriodicSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::ManualClock;

    struct Expiring {
        stamps: Vec<u64>,
    }

    impl Sweepable for Expiring {
        fn label(&self) -> &'static str {
            "stamps"
        }

        fn sweep(&mut self, now_ms: u64) -> usize {
            let before = self.stamps.len();
            self.stamps.retain(|&t| now_ms.saturating_sub(t) <= 100);
            before - self.stamps.len()
        }
    }

    #[test]
    fn test_sweeper_removes_stale_entries() {
        let target = Arc::new(Mutex::new(Expiring {
            stamps: vec![0, 50, 900],
        }));
        let clock = Arc::new(ManualClock::new(1_000));
        let sweeper = PeriodicSweeper::spawn(target.clone(), Duration::from_millis(5), clock);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while target.lock().unwrap().stamps.len() > 1 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(sweeper.label(), "stamps");
        assert_eq!(sweeper.stop(), 2);
        assert_eq!(target.lock().unwrap().stamps, vec![900]);
    }

    #[test]
    fn test_stop_before_first_tick() {
        let target = Arc::new(Mutex::new(Expiring { stamps: vec![0] }));
        let clock = Arc::new(ManualClock::new(1_000));
        let sweeper = PeriodicSweeper::spawn(target.clone(), Duration::from_secs(3600), clock);

        assert_eq!(sweeper.stop(), 0);
        assert_eq!(target.lock().unwrap().stamps.len(), 1);
    }
}
