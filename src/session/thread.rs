// Scheduler thread - runs `Session::tick` on a fixed interval
//
// Sleeps on a crossbeam channel with a timeout: the timeout is the tick, a
// message (or a dropped sender) is the shutdown signal.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::{error, info};

use super::Session;
use crate::error::EngineResult;

pub struct SchedulerThread {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerThread {
    pub fn spawn(session: Arc<Mutex<Session>>, interval: Duration) -> EngineResult<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let interval = interval.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("studio-scheduler".into())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "Scheduler thread started");
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match session.lock() {
                            Ok(mut session) => session.tick(),
                            Err(_) => {
                                error!("session mutex poisoned, scheduler thread exiting");
                                break;
                            }
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Scheduler thread stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // A full channel already carries the signal
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
