/*!
Mock exposure server

Stands in for the HTTP exposure server: records every start request instead
of binding a port, and can be told to fail like a port already in use.
*/

use heapster_publisher::error::SetupError;
use heapster_publisher::health::HealthTracker;
use heapster_publisher::state::{new_state, Shared};
use heapster_publisher::{EntityStore, ExposureServer};
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct MockExposure {
    started_ports: Shared<Vec<u16>>,
    fail: bool,
    start_delay: Duration,
}

impl MockExposure {
    pub fn new() -> Self {
        Self {
            started_ports: new_state(Vec::new()),
            fail: false,
            start_delay: Duration::ZERO,
        }
    }

    /// Every start attempt fails with `AddrInUse`.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    /// Slows down each start, to widen races on first use.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn start_count(&self) -> usize {
        self.started_ports.lock().len()
    }

    pub fn started_ports(&self) -> Vec<u16> {
        self.started_ports.lock().clone()
    }
}

impl ExposureServer for MockExposure {
    fn ensure_started(&self, _store: Arc<EntityStore>, _health: HealthTracker, port: u16) -> Result<(), SetupError> {
        if !self.start_delay.is_zero() {
            std::thread::sleep(self.start_delay);
        }
        if self.fail {
            log::warn!("[MOCK] refusing to start exposure server on port {}", port);
            return Err(SetupError::Server {
                port,
                source: io::Error::new(io::ErrorKind::AddrInUse, "mock port in use"),
            });
        }
        self.started_ports.lock().push(port);
        log::info!("[MOCK] exposure server started on port {}", port);
        Ok(())
    }
}
