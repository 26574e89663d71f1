//! Session controller — discovery, the single robot link, and the state
//! every observer renders.
//!
//! The controller owns one [`Transport`] and publishes a [`SessionEvent`] for
//! every observable change. Mutable state sits behind a synchronous mutex
//! that is never held across an await; transport calls that must not
//! interleave are serialised with async locks instead:
//!
//! * scan start/stop share one lock,
//! * command writes share one lock, so writes reach the robot in call order,
//! * parameter writes and reads share another.
//!
//! Directional commands go through [`dispatch`], gain editing through
//! [`tuning`].

mod dispatch;
mod tuning;


use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;

use mipirobot_domain::command::ActiveCommand;
use mipirobot_domain::error::{OperationError, SessionError};
use mipirobot_domain::event::{Event, SessionEvent};
use mipirobot_domain::id::SessionId;
use mipirobot_domain::parameter_store::ParameterStore;
use mipirobot_domain::parameters::ParameterSet;
use mipirobot_domain::peripheral::{DiscoveredPeripherals, PeripheralDescriptor, name_matches};
use mipirobot_domain::session::{ConnectionState, Session, SessionSnapshot, SessionStatus};

use crate::config::ControllerConfig;
use crate::ports::{Advertisement, EventPublisher, LinkLossSignal, ScanEvent, ScanFilter, Transport};

/// Drives the robot session over a [`Transport`].
///
/// Cloning is cheap and every clone drives the same session.
pub struct SessionController<T: Transport, P> {
    shared: Arc<Shared<T, P>>,
}

impl<T: Transport, P> Clone for SessionController<T, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<T: Transport, P> {
    transport: T,
    publisher: P,
    config: ControllerConfig,
    state: Mutex<ControllerState<T::Link>>,
    scan_lock: AsyncMutex<()>,
    command_lock: AsyncMutex<()>,
    parameter_lock: AsyncMutex<()>,
}

struct ControllerState<L> {
    connection: ConnectionState,
    discovered: DiscoveredPeripherals,
    scan: Option<ScanRun>,
    scan_generation: u64,
    link: Option<ActiveLink<L>>,
    active_command: ActiveCommand,
    parameters: ParameterStore,
    writes_in_flight: usize,
    writing_announced: bool,
    permission_granted: bool,
    last_error: Option<OperationError>,
}

impl<L> ControllerState<L> {
    fn new() -> Self {
        Self {
            connection: ConnectionState::Idle,
            discovered: DiscoveredPeripherals::new(),
            scan: None,
            scan_generation: 0,
            link: None,
            active_command: ActiveCommand::None,
            parameters: ParameterStore::new(),
            writes_in_flight: 0,
            writing_announced: false,
            permission_granted: false,
            last_error: None,
        }
    }

    fn session_status(&self) -> SessionStatus {
        self.link
            .as_ref()
            .map_or(SessionStatus::NoSession, |active| {
                SessionStatus::Active(active.session.clone())
            })
    }

    fn connection_event(&self) -> SessionEvent {
        SessionEvent::ConnectionChanged {
            state: self.connection,
            session: self.session_status(),
        }
    }

    fn set_connection(&mut self, connection: ConnectionState, events: &mut Vec<SessionEvent>) {
        self.connection = connection;
        events.push(self.connection_event());
    }

    fn set_active_command(&mut self, command: ActiveCommand, events: &mut Vec<SessionEvent>) {
        if self.active_command != command {
            self.active_command = command;
            events.push(SessionEvent::ActiveCommandChanged(command));
        }
    }

    fn session_id(&self) -> Option<SessionId> {
        self.link.as_ref().map(|active| active.session.id)
    }

    /// The edge observers have not heard about yet, if any.
    fn writing_edge(&mut self) -> Option<bool> {
        let writing = self.writes_in_flight > 0;
        (writing != self.writing_announced).then(|| {
            self.writing_announced = writing;
            writing
        })
    }

    fn require_connected(&self) -> Result<(), SessionError> {
        if self.connection == ConnectionState::Connected && self.link.is_some() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn require_accepts_new_link(&self) -> Result<(), SessionError> {
        if self.connection.accepts_new_link() {
            Ok(())
        } else {
            Err(SessionError::Busy {
                state: self.connection,
            })
        }
    }
}

impl<L: Clone> ControllerState<L> {
    fn link(&self) -> Result<L, SessionError> {
        self.require_connected()?;
        self.link
            .as_ref()
            .map(|active| active.link.clone())
            .ok_or(SessionError::NotConnected)
    }

    /// The link, as long as `session` is still the one holding it.
    fn link_of(&self, session: SessionId) -> Result<L, SessionError> {
        if self.session_id() == Some(session) {
            self.link()
        } else {
            Err(SessionError::NotConnected)
        }
    }
}

/// One command write in flight. Dropping it takes the write back out of the
/// count, so a caller that gives up mid-write cannot leave `writing` stuck.
struct WriteInFlight<'a, L> {
    state: &'a Mutex<ControllerState<L>>,
}

impl<L> Drop for WriteInFlight<'_, L> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writes_in_flight = state.writes_in_flight.saturating_sub(1);
    }
}

/// The link of the current session and the task watching it.
struct ActiveLink<L> {
    session: Session,
    link: L,
    watcher: JoinHandle<()>,
}

/// Tasks of one discovery run. `generation` tells a run apart from the ones
/// before it, so a late deadline or a stale stream never ends a newer scan.
struct ScanRun {
    generation: u64,
    pump: JoinHandle<()>,
    deadline: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    Requested,
    Deadline,
    Failed,
    Superseded,
}

impl ScanRun {
    /// Abort the run's tasks, except the one that is ending it.
    fn release(self, end: ScanEnd) {
        if end != ScanEnd::Failed {
            self.pump.abort();
        }
        if end != ScanEnd::Deadline {
            self.deadline.abort();
        }
    }
}

impl<T, P> SessionController<T, P>
where
    T: Transport,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Create a controller in the `Idle` state with default gains.
    pub fn new(transport: T, publisher: P, config: ControllerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                publisher,
                config,
                state: Mutex::new(ControllerState::new()),
                scan_lock: AsyncMutex::new(()),
                command_lock: AsyncMutex::new(()),
                parameter_lock: AsyncMutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Everything an observer needs to render the controller.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.with_state(|state| SessionSnapshot {
            state: state.connection,
            session: state.session_status(),
            discovered: state.discovered.to_vec(),
            active_command: state.active_command,
            parameters: state.parameters.current(),
            draft: state.parameters.draft(),
            writing: state.writes_in_flight > 0,
            last_error: state.last_error.clone(),
        })
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.with_state(|state| state.connection)
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.with_state(|state| state.link.as_ref().map(|active| active.session.clone()))
    }

    /// Peripherals found by the current or last scan, in discovery order.
    #[must_use]
    pub fn discovered(&self) -> Vec<PeripheralDescriptor> {
        self.with_state(|state| state.discovered.to_vec())
    }

    #[must_use]
    pub fn active_command(&self) -> ActiveCommand {
        self.with_state(|state| state.active_command)
    }

    /// Gains last confirmed with the robot.
    #[must_use]
    pub fn parameters(&self) -> ParameterSet {
        self.with_state(|state| state.parameters.current())
    }

    #[must_use]
    pub fn draft(&self) -> ParameterSet {
        self.with_state(|state| state.parameters.draft())
    }

    #[must_use]
    pub fn last_error(&self) -> Option<OperationError> {
        self.with_state(|state| state.last_error.clone())
    }

    /// Forget the last operation error once the operator has seen it.
    pub fn dismiss_error(&self) {
        self.with_state(|state| state.last_error = None);
    }

    /// Start discovering robots.
    ///
    /// A scan already in progress is restarted: its timer is cancelled and
    /// the discovered set is emptied. The scan stops by itself after the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while a session is being set up, held
    /// or torn down, [`SessionError::PermissionDenied`] when the platform
    /// refuses wireless access, or [`SessionError::ScanFailed`] when the
    /// stack cannot start discovery.
    #[tracing::instrument(skip(self))]
    pub async fn start_scan(&self) -> Result<(), SessionError> {
        let _scan_guard = self.shared.scan_lock.lock().await;

        if let Err(err) = self.with_state(|state| state.require_accepts_new_link()) {
            return self.fail(err).await;
        }
        if let Err(err) = self.ensure_permission().await {
            return self.fail(err).await;
        }

        let previous = self.with_state(|state| state.scan.take());
        if let Some(run) = previous {
            tracing::debug!(generation = run.generation, "restarting scan");
            run.release(ScanEnd::Superseded);
            self.stop_transport_scan().await;
        }

        let filter = ScanFilter {
            service: self.shared.config.service,
        };
        let stream = match self.shared.transport.start_scan(filter).await {
            Ok(stream) => stream,
            Err(err) => {
                let events = self.with_state(|state| {
                    let mut events = Vec::new();
                    if state.connection == ConnectionState::Scanning {
                        state.set_connection(ConnectionState::Idle, &mut events);
                    }
                    events
                });
                self.publish_all(events).await;
                return self.fail(SessionError::ScanFailed(err)).await;
            }
        };

        let started: Result<_, SessionError> = self.with_state(|state| {
            // A connect may have begun while the stack was starting up.
            state.require_accepts_new_link()?;
            state.scan_generation = state.scan_generation.wrapping_add(1);
            let generation = state.scan_generation;
            state.discovered.clear();
            state.scan = Some(ScanRun {
                generation,
                pump: tokio::spawn(self.clone().pump_scan(generation, stream)),
                deadline: tokio::spawn(self.clone().scan_deadline(generation)),
            });
            let mut events = vec![SessionEvent::DiscoveryReset];
            state.set_connection(ConnectionState::Scanning, &mut events);
            Ok((generation, events))
        });

        match started {
            Ok((generation, events)) => {
                tracing::info!(
                    generation,
                    timeout_ms = self.shared.config.scan_timeout_ms,
                    "scan started"
                );
                self.publish_all(events).await;
                Ok(())
            }
            Err(err) => {
                self.stop_transport_scan().await;
                self.fail(err).await
            }
        }
    }

    /// Stop discovering. Safe to call at any time; does nothing when no scan
    /// is running.
    #[tracing::instrument(skip(self))]
    pub async fn stop_scan(&self) {
        self.end_scan(None, ScanEnd::Requested, None).await;
    }

    /// Connect to `target`, or to the first discovered robot when `None`.
    ///
    /// A running scan is stopped first. On success the gains are reset to
    /// the defaults and the link is watched for loss.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] unless `Idle` or `Scanning`,
    /// [`SessionError::NoPeripheralAvailable`] when `target` is `None` and
    /// nothing was discovered, or a permission, connect or capability
    /// discovery error. A refused request or a refused permission leaves
    /// the state as it was; any later failure leaves the controller `Idle`.
    #[tracing::instrument(skip(self, target))]
    pub async fn connect(
        &self,
        target: Option<PeripheralDescriptor>,
    ) -> Result<Session, SessionError> {
        let resolved: Result<_, SessionError> = self.with_state(|state| {
            state.require_accepts_new_link()?;
            match target {
                Some(peripheral) => Ok(peripheral),
                None => state
                    .discovered
                    .first()
                    .cloned()
                    .ok_or(SessionError::NoPeripheralAvailable),
            }
        });
        let peripheral = match resolved {
            Ok(peripheral) => peripheral,
            Err(err) => return self.fail(err).await,
        };
        if let Err(err) = self.ensure_permission().await {
            return self.fail(err).await;
        }

        let begun: Result<_, SessionError> = self.with_state(|state| {
            // A scan or another connect may have moved on meanwhile.
            state.require_accepts_new_link()?;
            let scan = state.scan.take();
            let mut events = Vec::new();
            state.set_connection(ConnectionState::Connecting, &mut events);
            Ok((scan, events))
        });
        let (scan, events) = match begun {
            Ok(begun) => begun,
            Err(err) => return self.fail(err).await,
        };
        tracing::info!(peripheral = %peripheral.id, name = peripheral.display_name(), "connecting");
        self.publish_all(events).await;

        if let Some(run) = scan {
            run.release(ScanEnd::Superseded);
            self.stop_transport_scan().await;
        }

        let transport = &self.shared.transport;
        let link = match transport.connect(&peripheral.id).await {
            Ok(link) => link,
            Err(err) => return self.abort_connect(SessionError::ConnectFailed(err)).await,
        };
        if let Err(err) = transport.discover_capabilities(&link).await {
            self.release_link(&link).await;
            return self
                .abort_connect(SessionError::CapabilityDiscoveryFailed(err))
                .await;
        }
        let signal = match transport.on_disconnect(&link).await {
            Ok(signal) => signal,
            Err(err) => {
                self.release_link(&link).await;
                return self.abort_connect(SessionError::ConnectFailed(err)).await;
            }
        };

        let session = Session::start(peripheral);
        let events = self.with_state(|state| {
            // Spawned under the lock so a loss signal cannot overtake the
            // session it belongs to.
            let watcher = tokio::spawn(self.clone().watch_link(session.id, signal));
            state.link = Some(ActiveLink {
                session: session.clone(),
                link,
                watcher,
            });
            let mut events = Vec::new();
            state.set_connection(ConnectionState::Connected, &mut events);
            state.set_active_command(ActiveCommand::None, &mut events);
            let parameters = state.parameters.reset();
            events.push(SessionEvent::ParametersChanged(parameters));
            events.push(SessionEvent::DraftChanged(parameters));
            events
        });
        tracing::info!(session = %session.id, name = session.peripheral.display_name(), "connected");
        self.publish_all(events).await;
        Ok(session)
    }

    /// End the current session.
    ///
    /// Does nothing without a session. The active command is cleared and the
    /// controller returns to `Idle` even when the stack reports an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while a connection is being set up or
    /// torn down, or [`SessionError::DisconnectFailed`] when the stack could
    /// not cancel the link.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let begun: Result<_, SessionError> = self.with_state(|state| {
            match state.connection {
                ConnectionState::Connected => {}
                ConnectionState::Connecting | ConnectionState::Disconnecting => {
                    return Err(SessionError::Busy {
                        state: state.connection,
                    });
                }
                ConnectionState::Idle | ConnectionState::Scanning => return Ok(None),
            }
            let Some(active) = state.link.take() else {
                return Ok(None);
            };
            active.watcher.abort();
            let mut events = Vec::new();
            state.set_connection(ConnectionState::Disconnecting, &mut events);
            state.set_active_command(ActiveCommand::None, &mut events);
            Ok(Some((active.link, active.session, events)))
        });
        let (link, session, events) = match begun {
            Ok(Some(begun)) => begun,
            Ok(None) => {
                tracing::debug!("no session to disconnect");
                return Ok(());
            }
            Err(err) => return self.fail(err).await,
        };
        self.publish_all(events).await;

        let result = self.shared.transport.cancel_connection(&link).await;
        let events = self.with_state(|state| {
            let mut events = Vec::new();
            state.set_connection(ConnectionState::Idle, &mut events);
            events
        });
        self.publish_all(events).await;

        match result {
            Ok(()) => {
                tracing::info!(session = %session.id, "disconnected");
                Ok(())
            }
            Err(err) => self.fail(SessionError::DisconnectFailed(err)).await,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ControllerState<T::Link>) -> R) -> R {
        let mut guard = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    async fn publish(&self, payload: SessionEvent) {
        self.shared.publisher.publish(Event::new(payload)).await;
    }

    async fn publish_all(&self, payloads: Vec<SessionEvent>) {
        for payload in payloads {
            self.publish(payload).await;
        }
    }

    /// Record `err` as the last operation error, announce it, and return it.
    async fn fail<R>(&self, err: SessionError) -> Result<R, SessionError> {
        let operation = OperationError::from(&err);
        tracing::warn!(kind = %operation.kind, error = %operation.message, "operation failed");
        self.with_state(|state| state.last_error = Some(operation.clone()));
        self.publish(SessionEvent::OperationFailed(operation)).await;
        Err(err)
    }

    /// Ask the platform for wireless access once; a grant is remembered.
    async fn ensure_permission(&self) -> Result<(), SessionError> {
        if self.with_state(|state| state.permission_granted) {
            return Ok(());
        }
        self.shared
            .transport
            .request_permission()
            .await
            .map_err(SessionError::PermissionDenied)?;
        self.with_state(|state| state.permission_granted = true);
        tracing::debug!("wireless access granted");
        Ok(())
    }

    async fn stop_transport_scan(&self) {
        if let Err(err) = self.shared.transport.stop_scan().await {
            tracing::warn!(error = %err, "failed to stop transport scan");
        }
    }

    async fn pump_scan(self, generation: u64, mut stream: mpsc::Receiver<ScanEvent>) {
        while let Some(event) = stream.recv().await {
            match event {
                ScanEvent::Discovered(advertisement) => {
                    self.record_advertisement(generation, advertisement).await;
                }
                ScanEvent::Failed(err) => {
                    self.end_scan(
                        Some(generation),
                        ScanEnd::Failed,
                        Some(SessionError::ScanFailed(err)),
                    )
                    .await;
                    return;
                }
            }
        }
        tracing::debug!(generation, "scan stream closed");
    }

    async fn record_advertisement(&self, generation: u64, advertisement: Advertisement) {
        let config = &self.shared.config;
        // Stacks that cannot report advertised services leave the list empty
        // and rely on the stack-side filter.
        let offers_service = advertisement.services.is_empty()
            || advertisement.services.contains(&config.service);
        if !offers_service
            || !name_matches(advertisement.local_name.as_deref(), &config.name_prefix)
        {
            tracing::trace!(
                peripheral = %advertisement.id,
                name = ?advertisement.local_name,
                "advertisement filtered out"
            );
            return;
        }

        let added = self.with_state(|state| {
            let current = state
                .scan
                .as_ref()
                .is_some_and(|run| run.generation == generation);
            if !current {
                return None;
            }
            let descriptor = PeripheralDescriptor::new(advertisement.id, advertisement.local_name);
            state
                .discovered
                .insert(descriptor.clone())
                .then_some(descriptor)
        });
        if let Some(descriptor) = added {
            tracing::info!(peripheral = %descriptor.id, name = descriptor.display_name(), "robot discovered");
            self.publish(SessionEvent::PeripheralDiscovered(descriptor))
                .await;
        }
    }

    async fn scan_deadline(self, generation: u64) {
        tokio::time::sleep(self.shared.config.scan_timeout()).await;
        self.end_scan(Some(generation), ScanEnd::Deadline, None)
            .await;
    }

    /// End the scan run `generation` (any run when `None`). A run that has
    /// already ended, or been replaced, is left alone.
    async fn end_scan(&self, generation: Option<u64>, end: ScanEnd, error: Option<SessionError>) {
        let _scan_guard = self.shared.scan_lock.lock().await;

        let ended = self.with_state(|state| {
            let matches = state
                .scan
                .as_ref()
                .is_some_and(|run| generation.is_none_or(|wanted| run.generation == wanted));
            if !matches {
                return None;
            }
            let run = state.scan.take()?;
            let mut events = Vec::new();
            if state.connection == ConnectionState::Scanning {
                state.set_connection(ConnectionState::Idle, &mut events);
            }
            Some((run, events))
        });
        let Some((run, events)) = ended else {
            return;
        };

        let generation = run.generation;
        run.release(end);
        self.stop_transport_scan().await;
        tracing::info!(generation, reason = ?end, "scan stopped");
        self.publish_all(events).await;
        if let Some(err) = error {
            let _ = self.fail::<()>(err).await;
        }
    }

    async fn abort_connect<R>(&self, err: SessionError) -> Result<R, SessionError> {
        let events = self.with_state(|state| {
            let mut events = Vec::new();
            state.set_connection(ConnectionState::Idle, &mut events);
            events
        });
        self.publish_all(events).await;
        self.fail(err).await
    }

    /// Best-effort teardown of a link that never became a session.
    async fn release_link(&self, link: &T::Link) {
        if let Err(err) = self.shared.transport.cancel_connection(link).await {
            tracing::warn!(error = %err, "failed to release half-open link");
        }
    }

    async fn watch_link(self, session: SessionId, signal: LinkLossSignal) {
        if signal.await.is_ok() {
            self.handle_link_loss(session).await;
        }
    }

    /// The stack reported that the link of `session` dropped.
    async fn handle_link_loss(&self, session: SessionId) {
        let events = self.with_state(|state| {
            let current = state
                .link
                .as_ref()
                .is_some_and(|active| active.session.id == session);
            if !current {
                return None;
            }
            state.link = None;
            let mut events = Vec::new();
            state.set_connection(ConnectionState::Idle, &mut events);
            state.set_active_command(ActiveCommand::None, &mut events);
            Some(events)
        });
        let Some(events) = events else {
            return;
        };
        tracing::warn!(%session, "link to robot lost");
        self.publish_all(events).await;
    }

    /// Count a command write in flight until the returned guard is dropped
    /// or handed to [`end_write`](Self::end_write). Observers see one edge
    /// per burst; a falling edge missed by a cancelled write goes out with
    /// the next one.
    async fn begin_write(&self) -> WriteInFlight<'_, T::Link> {
        let edge = self.with_state(|state| {
            state.writes_in_flight += 1;
            state.writing_edge()
        });
        let write = WriteInFlight {
            state: &self.shared.state,
        };
        if let Some(writing) = edge {
            self.publish(SessionEvent::WritingChanged(writing)).await;
        }
        write
    }

    async fn end_write(&self, write: WriteInFlight<'_, T::Link>) {
        drop(write);
        if let Some(writing) = self.with_state(ControllerState::writing_edge) {
            self.publish(SessionEvent::WritingChanged(writing)).await;
        }
    }
}
