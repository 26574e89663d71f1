//! Transport port — the platform wireless stack, seen from the controller.
//!
//! An adapter implements [`Transport`] on top of a real stack (BLE via
//! `btleplug`) or a simulation. The controller owns exactly one transport,
//! injected at construction time.
//!
//! Payload bytes crossing this port are already transport-encoded by the
//! codec; adapters that talk to real hardware reverse that encoding before
//! putting bytes on the air.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};

use mipirobot_domain::error::TransportError;
use mipirobot_domain::id::PeripheralId;
use mipirobot_domain::protocol::CharacteristicAddress;

/// Which peripherals a scan should report.
///
/// Adapters pass `service` down to the stack as a discovery filter when they
/// can; the controller applies the full filter (service and name prefix) to
/// every advertisement regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanFilter {
    pub service: uuid::Uuid,
}

/// One advertisement heard during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: PeripheralId,
    pub local_name: Option<String>,
    pub services: Vec<uuid::Uuid>,
}

/// Item delivered on a scan stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Discovered(Advertisement),
    /// The scan died; no further events follow.
    Failed(TransportError),
}

/// Resolves once when an established link drops.
///
/// A sender dropped without firing means the adapter stopped watching the
/// link; the controller treats that as no notification at all.
pub type LinkLossSignal = oneshot::Receiver<()>;

/// A platform wireless stack able to reach the robot.
pub trait Transport: Send + Sync + 'static {
    /// Adapter-specific handle to a connected peripheral.
    type Link: Clone + Send + Sync + 'static;

    /// Make sure the platform has authorised wireless access.
    fn request_permission(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Start discovery. Advertisements arrive on the returned channel in the
    /// order the stack reports them; the channel closes when the scan stops.
    fn start_scan(
        &self,
        filter: ScanFilter,
    ) -> impl Future<Output = Result<mpsc::Receiver<ScanEvent>, TransportError>> + Send;

    /// Stop discovery. Must succeed when no scan is running.
    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Establish a link to `peripheral`.
    fn connect(
        &self,
        peripheral: &PeripheralId,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;

    /// Enumerate services and characteristics of a fresh link and check that
    /// the robot service is present.
    fn discover_capabilities(
        &self,
        link: &Self::Link,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write `payload` and wait for the link-layer acknowledgement.
    fn write(
        &self,
        link: &Self::Link,
        address: CharacteristicAddress,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Read the current value of a characteristic.
    fn read(
        &self,
        link: &Self::Link,
        address: CharacteristicAddress,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Register interest in the link dropping.
    fn on_disconnect(
        &self,
        link: &Self::Link,
    ) -> impl Future<Output = Result<LinkLossSignal, TransportError>> + Send;

    /// Tear the link down.
    fn cancel_connection(
        &self,
        link: &Self::Link,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
