use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use agencyops_core::AgencyId;
use agencyops_events::{AgencyScoped, EventBus, Subscription};

use crate::error::EngineError;

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown and wait for the worker thread to exit. Once this
    /// returns the handler will not run again.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        let _ = self.shutdown.send(());
        match self.join.take() {
            Some(join) => join.join().map_err(|_| EngineError::Worker {
                name: self.name,
                reason: "worker thread panicked".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Generic subscription consumer loop.
///
/// - Drains one subscription (bus deliveries or store snapshots)
/// - Runs the handler for each message; failures are logged, never fatal
/// - Optional agency filter
/// - Stops on shutdown or when the publisher side goes away
#[derive(Debug)]
pub struct SubscriptionWorker;

impl SubscriptionWorker {
    pub fn spawn<M, H, E>(
        name: &'static str,
        subscription: Subscription<M>,
        agency_id: Option<AgencyId>,
        mut handler: H,
    ) -> Result<WorkerHandle, EngineError>
    where
        M: AgencyScoped + Send + 'static,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, subscription, shutdown_rx, agency_id, &mut handler))
            .map_err(|e| EngineError::Worker {
                name,
                reason: e.to_string(),
            })?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Subscribe to `bus` and consume it.
    pub fn spawn_on_bus<M, B, H, E>(
        name: &'static str,
        bus: &B,
        agency_id: Option<AgencyId>,
        handler: H,
    ) -> Result<WorkerHandle, EngineError>
    where
        M: AgencyScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        Self::spawn(name, bus.subscribe(), agency_id, handler)
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    subscription: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    agency_id: Option<AgencyId>,
    handler: &mut H,
) where
    M: AgencyScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match subscription.recv_timeout(tick) {
            Ok(message) => {
                if agency_id.is_some_and(|a| message.agency_id() != a) {
                    continue;
                }
                // Shutdown may have been requested while we were blocked.
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                if let Err(err) = handler(message) {
                    warn!(worker = name, error = %err, "subscription handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use agencyops_events::InMemoryEventBus;

    #[derive(Debug, Clone)]
    struct Ping(AgencyId);

    impl AgencyScoped for Ping {
        fn agency_id(&self) -> AgencyId {
            self.0
        }
    }

    #[test]
    fn filters_foreign_agencies_and_stops_on_shutdown() {
        let bus = InMemoryEventBus::new();
        let agency = AgencyId::new();
        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();

        let worker = SubscriptionWorker::spawn_on_bus("test-worker", &bus, Some(agency), move |_: Ping| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), EngineError>(())
        })
        .unwrap();

        bus.publish(Ping(agency)).unwrap();
        bus.publish(Ping(AgencyId::new())).unwrap();
        bus.publish(Ping(agency)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        worker.shutdown().unwrap();

        bus.publish(Ping(agency)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
