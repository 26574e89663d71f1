//! BLE scanner — turns adapter events into advertisements for the
//! controller.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{Central, CentralEvent, Peripheral as _, PeripheralProperties};
use btleplug::platform::{Adapter, Peripheral};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt as _};

use mipirobot_app::ports::{Advertisement, ScanEvent};
use mipirobot_domain::error::TransportError;
use mipirobot_domain::id::PeripheralId;

pub(crate) type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Peripherals seen by a scan, so a later connect can find them by id.
pub(crate) type KnownPeripherals = Arc<Mutex<HashMap<PeripheralId, Peripheral>>>;

/// Build an [`Advertisement`] from what the stack knows about a peripheral.
pub(crate) fn advertisement_from(id: PeripheralId, properties: &PeripheralProperties) -> Advertisement {
    Advertisement {
        id,
        local_name: properties.local_name.clone(),
        services: properties.services.clone(),
    }
}

/// Forward every advertisement on `events` to `sender` until the receiver
/// goes away. The end of the adapter stream is reported as a scan failure.
pub(crate) async fn forward_advertisements(
    adapter: Adapter,
    mut events: EventStream,
    known: KnownPeripherals,
    sender: mpsc::Sender<ScanEvent>,
) {
    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => id,
            _ => continue,
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(err) => {
                tracing::trace!(%err, "advertising peripheral vanished");
                continue;
            }
        };
        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => continue,
            Err(err) => {
                tracing::trace!(%err, "failed to read peripheral properties");
                continue;
            }
        };

        let advertisement = advertisement_from(PeripheralId::new(id.to_string()), &properties);
        tracing::trace!(
            peripheral = %advertisement.id,
            name = ?advertisement.local_name,
            rssi = ?properties.rssi,
            "BLE advertisement"
        );
        known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(advertisement.id.clone(), peripheral);

        if sender.send(ScanEvent::Discovered(advertisement)).await.is_err() {
            return;
        }
    }

    let _ = sender
        .send(ScanEvent::Failed(TransportError::Unavailable(
            "BLE event stream ended".into(),
        )))
        .await;
}
