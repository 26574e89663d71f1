//! # mipirobot-adapter-ble
//!
//! BLE transport — reaches the robot through the host's Bluetooth adapter
//! with `btleplug`.
//!
//! ## How it works
//!
//! | Operation | btleplug |
//! |-----------|----------|
//! | Permission | `adapter_state()` must not be `PoweredOff` |
//! | Scan | `start_scan` filtered on the robot service; `DeviceDiscovered` / `DeviceUpdated` events become advertisements |
//! | Connect | `connect()` bounded by `connect_timeout_secs` |
//! | Capabilities | `discover_services()`, then the robot service and both characteristics must be present |
//! | Write | write-with-response of the raw bytes |
//! | Link loss | `DeviceDisconnected` for the linked peripheral |
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `mipirobot-app` and `mipirobot-domain`.

mod config;
mod error;
mod gatt;
mod scanner;

pub use config::BleConfig;
pub use error::BleError;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt as _};

use mipirobot_app::ports::{LinkLossSignal, ScanEvent, ScanFilter, Transport};
use mipirobot_domain::error::TransportError;
use mipirobot_domain::id::PeripheralId;
use mipirobot_domain::protocol::CharacteristicAddress;

use scanner::KnownPeripherals;

/// A connected robot.
#[derive(Clone)]
pub struct BleLink {
    id: PeripheralId,
    peripheral: Peripheral,
}

impl BleLink {
    #[must_use]
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }
}

/// [`Transport`] over the host's BLE adapter.
pub struct BleTransport {
    adapter: Adapter,
    config: BleConfig,
    known: KnownPeripherals,
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Open the host adapter selected by `config.adapter_index`.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when there is no such adapter, or
    /// the stack error when the platform manager cannot start.
    pub async fn new(config: BleConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleError::NotAvailable)?;
        match adapter.adapter_info().await {
            Ok(info) => tracing::info!(adapter = %info, "BLE adapter selected"),
            Err(err) => tracing::debug!(%err, "BLE adapter info unavailable"),
        }
        Ok(Self {
            adapter,
            config,
            known: Arc::new(Mutex::new(HashMap::new())),
            scan: Mutex::new(None),
        })
    }

    fn replace_scan(&self, pump: Option<JoinHandle<()>>) {
        let previous = {
            let mut scan = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *scan, pump)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// A peripheral known from a scan, or else one the adapter still lists.
    async fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, BleError> {
        let known = self
            .known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        if let Some(peripheral) = known {
            return Ok(peripheral);
        }
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|peripheral| peripheral.id().to_string() == id.as_str())
            .ok_or_else(|| BleError::UnknownPeripheral(id.to_string()))
    }
}

async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    future: impl Future<Output = btleplug::Result<T>>,
) -> Result<T, BleError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| BleError::Timeout { operation })?
        .map_err(BleError::from)
}

/// Fire `sender` on the first event `dropped` accepts. Returns as soon as
/// the receiving side is gone or the stack closes its event stream.
async fn watch_link<S>(
    mut events: S,
    dropped: impl Fn(&S::Item) -> bool,
    peripheral: PeripheralId,
    mut sender: oneshot::Sender<()>,
) where
    S: Stream + Unpin,
{
    loop {
        let event = tokio::select! {
            () = sender.closed() => return,
            event = events.next() => match event {
                Some(event) => event,
                None => return,
            },
        };
        if dropped(&event) {
            tracing::info!(%peripheral, "BLE link dropped");
            let _ = sender.send(());
            return;
        }
    }
}

impl Transport for BleTransport {
    type Link = BleLink;

    async fn request_permission(&self) -> Result<(), TransportError> {
        match self.adapter.adapter_state().await.map_err(BleError::from)? {
            CentralState::PoweredOff => Err(BleError::PoweredOff.into()),
            CentralState::PoweredOn => Ok(()),
            state => {
                // Some platforms only settle the state after the first scan.
                tracing::debug!(?state, "BLE adapter state not yet known");
                Ok(())
            }
        }
    }

    async fn start_scan(
        &self,
        filter: ScanFilter,
    ) -> Result<mpsc::Receiver<ScanEvent>, TransportError> {
        // A new run only knows what it hears itself.
        self.replace_scan(None);
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let events = self.adapter.events().await.map_err(BleError::from)?;
        self.adapter
            .start_scan(btleplug::api::ScanFilter {
                services: vec![filter.service],
            })
            .await
            .map_err(BleError::from)?;

        let (sender, receiver) = mpsc::channel(64);
        let pump = tokio::spawn(scanner::forward_advertisements(
            self.adapter.clone(),
            events,
            Arc::clone(&self.known),
            sender,
        ));
        self.replace_scan(Some(pump));
        tracing::info!(service = %filter.service, "BLE scan started");
        Ok(receiver)
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.replace_scan(None);
        self.adapter.stop_scan().await.map_err(BleError::from)?;
        tracing::debug!("BLE scan stopped");
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralId) -> Result<BleLink, TransportError> {
        let handle = self.peripheral(peripheral).await?;
        bounded(self.config.connect_timeout(), "connect", handle.connect()).await?;
        tracing::info!(%peripheral, "BLE link established");
        Ok(BleLink {
            id: peripheral.clone(),
            peripheral: handle,
        })
    }

    async fn discover_capabilities(&self, link: &BleLink) -> Result<(), TransportError> {
        bounded(
            self.config.discovery_timeout(),
            "service discovery",
            link.peripheral.discover_services(),
        )
        .await?;
        gatt::ensure_robot_attributes(&link.peripheral)?;
        Ok(())
    }

    async fn write(
        &self,
        link: &BleLink,
        address: CharacteristicAddress,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        gatt::write(&link.peripheral, address, payload).await?;
        Ok(())
    }

    async fn read(
        &self,
        link: &BleLink,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(gatt::read(&link.peripheral, address).await?)
    }

    async fn on_disconnect(&self, link: &BleLink) -> Result<LinkLossSignal, TransportError> {
        let events = self.adapter.events().await.map_err(BleError::from)?;
        let target = link.peripheral.id();
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(watch_link(
            events,
            move |event| matches!(event, CentralEvent::DeviceDisconnected(id) if *id == target),
            link.id.clone(),
            sender,
        ));
        Ok(receiver)
    }

    async fn cancel_connection(&self, link: &BleLink) -> Result<(), TransportError> {
        link.peripheral
            .disconnect()
            .await
            .map_err(BleError::from)?;
        tracing::info!(peripheral = %link.id, "BLE link closed");
        Ok(())
    }
}
