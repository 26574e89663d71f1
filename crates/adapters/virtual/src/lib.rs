//! # mipirobot-adapter-virtual
//!
//! In-memory radio with simulated robots, for demos and tests.
//!
//! ## Behaviour
//!
//! | Operation | Simulation |
//! |-----------|------------|
//! | Permission | Granted while the radio is powered |
//! | Scan | Every configured peripheral advertises, round after round |
//! | Connect | Succeeds for any configured peripheral |
//! | Capability discovery | Fails on peripherals without the robot service |
//! | Write / read | Served by [`VirtualRobot`] after the configured latency |
//! | Link loss | Triggered on demand with [`VirtualTransport::trigger_link_loss`] |
//!
//! One-shot failures can be injected per operation with
//! [`VirtualTransport::inject_fault`].
//!
//! ## Dependency rule
//!
//! Depends on `mipirobot-app` (port traits) and `mipirobot-domain` only.

mod config;
mod robot;

pub use config::{VirtualConfig, VirtualRobotConfig};
pub use robot::VirtualRobot;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use mipirobot_app::ports::{LinkLossSignal, ScanEvent, ScanFilter, Transport};
use mipirobot_domain::error::TransportError;
use mipirobot_domain::id::PeripheralId;
use mipirobot_domain::protocol::{CharacteristicAddress, SERVICE_UUID};

/// Transport operation a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Scan,
    Connect,
    Discovery,
    Write,
    Read,
    Disconnect,
}

/// Simulated radio implementing [`Transport`].
///
/// Cloning shares the same radio, so a test can keep a handle while the
/// controller owns another.
#[derive(Clone)]
pub struct VirtualTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: VirtualConfig,
    robots: Vec<VirtualRobot>,
    radio: Mutex<Radio>,
}

struct Radio {
    powered: bool,
    scan: Option<JoinHandle<()>>,
    connected: Option<PeripheralId>,
    watchers: Vec<oneshot::Sender<()>>,
    faults: HashMap<Fault, TransportError>,
}

impl Default for VirtualTransport {
    fn default() -> Self {
        Self::new(VirtualConfig::default())
    }
}

impl VirtualTransport {
    #[must_use]
    pub fn new(config: VirtualConfig) -> Self {
        let robots = config.robots.iter().map(VirtualRobot::new).collect();
        Self {
            inner: Arc::new(Inner {
                config,
                robots,
                radio: Mutex::new(Radio {
                    powered: true,
                    scan: None,
                    connected: None,
                    watchers: Vec::new(),
                    faults: HashMap::new(),
                }),
            }),
        }
    }

    /// The simulated peripheral with the given identifier.
    #[must_use]
    pub fn robot(&self, id: &str) -> Option<&VirtualRobot> {
        self.inner.robots.iter().find(|robot| robot.id().as_str() == id)
    }

    /// Peripheral currently linked, if any.
    #[must_use]
    pub fn connected(&self) -> Option<PeripheralId> {
        self.with_radio(|radio| radio.connected.clone())
    }

    /// Power the radio on or off. Permission is refused while off.
    pub fn set_powered(&self, powered: bool) {
        self.with_radio(|radio| radio.powered = powered);
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn inject_fault(&self, operation: Fault, error: TransportError) {
        self.with_radio(|radio| radio.faults.insert(operation, error));
    }

    /// Drop the current link as if the robot went out of range.
    pub fn trigger_link_loss(&self) {
        let (peripheral, watchers) = self.with_radio(|radio| {
            (radio.connected.take(), std::mem::take(&mut radio.watchers))
        });
        if let Some(peripheral) = peripheral {
            tracing::info!(%peripheral, "virtual link lost");
        }
        for watcher in watchers {
            let _ = watcher.send(());
        }
    }

    fn with_radio<R>(&self, f: impl FnOnce(&mut Radio) -> R) -> R {
        let mut guard = self
            .inner
            .radio
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn take_fault(&self, operation: Fault) -> Result<(), TransportError> {
        match self.with_radio(|radio| radio.faults.remove(&operation)) {
            Some(err) => {
                tracing::debug!(?operation, error = %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn linked_robot(&self, link: &PeripheralId) -> Result<&VirtualRobot, TransportError> {
        let linked = self.with_radio(|radio| radio.connected.as_ref() == Some(link));
        if !linked {
            return Err(TransportError::LinkLost);
        }
        self.robot(link.as_str())
            .ok_or_else(|| TransportError::PeripheralNotFound(link.to_string()))
    }
}

impl Transport for VirtualTransport {
    type Link = PeripheralId;

    async fn request_permission(&self) -> Result<(), TransportError> {
        if self.with_radio(|radio| radio.powered) {
            Ok(())
        } else {
            Err(TransportError::PermissionDenied(
                "virtual radio is powered off".into(),
            ))
        }
    }

    async fn start_scan(
        &self,
        filter: ScanFilter,
    ) -> Result<mpsc::Receiver<ScanEvent>, TransportError> {
        self.take_fault(Fault::Scan)?;
        let advertisements: Vec<_> = self
            .inner
            .robots
            .iter()
            .map(VirtualRobot::advertisement)
            .collect();
        let interval = self.inner.config.advertise_interval();
        let (sender, receiver) = mpsc::channel(32);

        tracing::debug!(service = %filter.service, peripherals = advertisements.len(), "virtual scan started");
        let pump = tokio::spawn(async move {
            loop {
                for advertisement in &advertisements {
                    let event = ScanEvent::Discovered(advertisement.clone());
                    if sender.send(event).await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
        if let Some(previous) = self.with_radio(|radio| radio.scan.replace(pump)) {
            previous.abort();
        }
        Ok(receiver)
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        if let Some(pump) = self.with_radio(|radio| radio.scan.take()) {
            pump.abort();
            tracing::debug!("virtual scan stopped");
        }
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralId) -> Result<PeripheralId, TransportError> {
        self.take_fault(Fault::Connect)?;
        if self.robot(peripheral.as_str()).is_none() {
            return Err(TransportError::PeripheralNotFound(peripheral.to_string()));
        }
        tokio::time::sleep(self.inner.config.write_latency()).await;
        self.with_radio(|radio| radio.connected = Some(peripheral.clone()));
        tracing::info!(%peripheral, "virtual link established");
        Ok(peripheral.clone())
    }

    async fn discover_capabilities(&self, link: &PeripheralId) -> Result<(), TransportError> {
        self.take_fault(Fault::Discovery)?;
        let robot = self.linked_robot(link)?;
        if robot.advertises_service() {
            Ok(())
        } else {
            Err(TransportError::MissingCapability(SERVICE_UUID))
        }
    }

    async fn write(
        &self,
        link: &PeripheralId,
        address: CharacteristicAddress,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.linked_robot(link)?;
        self.take_fault(Fault::Write)?;
        tokio::time::sleep(self.inner.config.write_latency()).await;
        self.linked_robot(link)?.write(address, payload)
    }

    async fn read(
        &self,
        link: &PeripheralId,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, TransportError> {
        self.linked_robot(link)?;
        self.take_fault(Fault::Read)?;
        tokio::time::sleep(self.inner.config.write_latency()).await;
        self.linked_robot(link)?.read(address)
    }

    async fn on_disconnect(&self, link: &PeripheralId) -> Result<LinkLossSignal, TransportError> {
        self.linked_robot(link)?;
        let (sender, receiver) = oneshot::channel();
        self.with_radio(|radio| radio.watchers.push(sender));
        Ok(receiver)
    }

    async fn cancel_connection(&self, link: &PeripheralId) -> Result<(), TransportError> {
        self.take_fault(Fault::Disconnect)?;
        self.with_radio(|radio| {
            if radio.connected.as_ref() == Some(link) {
                radio.connected = None;
                radio.watchers.clear();
            }
        });
        tracing::info!(peripheral = %link, "virtual link closed");
        Ok(())
    }
}
