//! End-to-end tests for the full mipictl stack.
//!
//! Each test wires the real session controller to the in-process event bus
//! and the virtual radio, then drives a session the way the console does.
//! Time is paused, so scan deadlines and write latency elapse instantly.

use std::time::Duration;

use mipirobot_adapter_virtual::{Fault, VirtualConfig, VirtualTransport};
use mipirobot_app::config::ControllerConfig;
use mipirobot_app::event_bus::InProcessEventBus;
use mipirobot_app::services::SessionController;
use mipirobot_domain::codec;
use mipirobot_domain::command::{ActiveCommand, DirectionalCommand};
use mipirobot_domain::error::{ErrorKind, TransportError};
use mipirobot_domain::event::SessionEvent;
use mipirobot_domain::id::PeripheralId;
use mipirobot_domain::parameters::ParameterSet;
use mipirobot_domain::peripheral::PeripheralDescriptor;
use mipirobot_domain::session::{ConnectionState, Indicator};

type Controller = SessionController<VirtualTransport, InProcessEventBus>;

const ROBOT: &str = "virtual-robot-1";

struct Stack {
    controller: Controller,
    radio: VirtualTransport,
    bus: InProcessEventBus,
}

/// Build a fully-wired controller over the default simulated radio.
fn stack() -> Stack {
    stack_with(ControllerConfig::default())
}

fn stack_with(config: ControllerConfig) -> Stack {
    let radio = VirtualTransport::new(VirtualConfig::default());
    let bus = InProcessEventBus::default();
    let controller = SessionController::new(radio.clone(), bus.clone(), config);
    Stack {
        controller,
        radio,
        bus,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn connected() -> Stack {
    let stack = stack();
    stack.controller.start_scan().await.unwrap();
    settle().await;
    stack.controller.connect(None).await.unwrap();
    stack
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_discover_only_robots() {
    let stack = stack();
    let mut events = stack.bus.subscribe();

    stack.controller.start_scan().await.unwrap();
    settle().await;

    let discovered = stack.controller.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].id.as_str(), ROBOT);
    assert_eq!(discovered[0].name.as_deref(), Some("MIPIRobot-Sim"));
    assert_eq!(stack.controller.snapshot().indicator(), Indicator::Scanning);

    assert_eq!(events.recv().await.unwrap().payload, SessionEvent::DiscoveryReset);
    assert!(matches!(
        events.recv().await.unwrap().payload,
        SessionEvent::ConnectionChanged {
            state: ConnectionState::Scanning,
            ..
        }
    ));
    assert!(matches!(
        events.recv().await.unwrap().payload,
        SessionEvent::PeripheralDiscovered(ref peripheral) if peripheral.id.as_str() == ROBOT
    ));
}

#[tokio::test(start_paused = true)]
async fn should_not_duplicate_robot_across_advertising_rounds() {
    let stack = stack();
    stack.controller.start_scan().await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(stack.controller.discovered().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn should_stop_scanning_at_deadline_and_keep_results() {
    let stack = stack_with(ControllerConfig {
        scan_timeout_ms: 2_000,
        ..ControllerConfig::default()
    });
    stack.controller.start_scan().await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    assert_eq!(stack.controller.state(), ConnectionState::Idle);
    assert_eq!(stack.controller.discovered().len(), 1);
    assert!(stack.controller.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn should_refuse_scan_while_radio_is_off() {
    let stack = stack();
    stack.radio.set_powered(false);

    let err = stack.controller.start_scan().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(stack.controller.state(), ConnectionState::Idle);
    assert_eq!(
        stack.controller.last_error().map(|error| error.kind),
        Some(ErrorKind::PermissionDenied)
    );
}

#[tokio::test(start_paused = true)]
async fn should_report_scan_failure() {
    let stack = stack();
    stack
        .radio
        .inject_fault(Fault::Scan, TransportError::Unavailable("radio busy".into()));

    let err = stack.controller.start_scan().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ScanFailed);
    assert_eq!(stack.controller.state(), ConnectionState::Idle);
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_connect_to_first_discovered_robot() {
    let stack = connected().await;

    let snapshot = stack.controller.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.indicator(), Indicator::Connected);
    assert_eq!(snapshot.active_command, ActiveCommand::None);
    assert_eq!(snapshot.parameters, ParameterSet::default());
    assert_eq!(snapshot.draft, ParameterSet::default());
    assert_eq!(stack.radio.connected(), Some(PeripheralId::from(ROBOT)));
}

#[tokio::test(start_paused = true)]
async fn should_fail_connect_without_discovered_robot() {
    let stack = stack();

    let err = stack.controller.connect(None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoPeripheralAvailable);
    assert_eq!(stack.radio.connected(), None);
}

#[tokio::test(start_paused = true)]
async fn should_release_bystander_without_robot_service() {
    let stack = stack();
    let speaker = PeripheralDescriptor::new(
        PeripheralId::from("virtual-speaker"),
        Some("Speaker-42".into()),
    );

    let err = stack.controller.connect(Some(speaker)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CapabilityDiscoveryFailed);
    assert_eq!(stack.controller.state(), ConnectionState::Idle);
    assert!(stack.controller.session().is_none());
    assert_eq!(stack.radio.connected(), None);
}

#[tokio::test(start_paused = true)]
async fn should_return_to_idle_when_connect_fails() {
    let stack = stack();
    stack.controller.start_scan().await.unwrap();
    settle().await;
    stack
        .radio
        .inject_fault(Fault::Connect, TransportError::Timeout { operation: "connect" });

    let err = stack.controller.connect(None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectFailed);
    assert_eq!(stack.controller.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn should_disconnect_and_clear_command() {
    let stack = connected().await;
    stack
        .controller
        .send_directional(DirectionalCommand::Left)
        .await
        .unwrap();

    stack.controller.disconnect().await.unwrap();

    assert_eq!(stack.controller.state(), ConnectionState::Idle);
    assert_eq!(stack.controller.active_command(), ActiveCommand::None);
    assert_eq!(stack.radio.connected(), None);
}

#[tokio::test(start_paused = true)]
async fn should_drop_session_on_link_loss() {
    let stack = connected().await;
    stack
        .controller
        .send_directional(DirectionalCommand::Forward)
        .await
        .unwrap();

    stack.radio.trigger_link_loss();
    settle().await;

    assert_eq!(stack.controller.state(), ConnectionState::Idle);
    assert!(stack.controller.session().is_none());
    assert_eq!(stack.controller.active_command(), ActiveCommand::None);

    let err = stack
        .controller
        .send_directional(DirectionalCommand::Forward)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}

#[tokio::test(start_paused = true)]
async fn should_reconnect_after_link_loss() {
    let stack = connected().await;
    stack.radio.trigger_link_loss();
    settle().await;

    stack.controller.start_scan().await.unwrap();
    settle().await;
    stack.controller.connect(None).await.unwrap();

    assert_eq!(stack.controller.state(), ConnectionState::Connected);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_not_touch_robot_when_not_connected() {
    let stack = stack();

    let err = stack
        .controller
        .send_directional(DirectionalCommand::Forward)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotConnected);
    let robot = stack.radio.robot(ROBOT).unwrap();
    assert!(robot.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_deliver_commands_in_call_order() {
    let stack = connected().await;
    let controller = &stack.controller;

    let (forward, stop) = tokio::join!(
        controller.send_directional(DirectionalCommand::Forward),
        controller.stop_motion(),
    );
    forward.unwrap();
    stop.unwrap();

    let robot = stack.radio.robot(ROBOT).unwrap();
    assert_eq!(
        robot.commands(),
        vec![DirectionalCommand::Forward, DirectionalCommand::Stop]
    );
    assert_eq!(controller.active_command(), ActiveCommand::None);
    assert!(!controller.snapshot().writing);
}

#[tokio::test(start_paused = true)]
async fn should_keep_session_when_command_write_fails() {
    let stack = connected().await;
    stack
        .radio
        .inject_fault(Fault::Write, TransportError::Rejected("no ack".into()));

    let err = stack
        .controller
        .send_directional(DirectionalCommand::Right)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WriteFailed);
    assert_eq!(stack.controller.state(), ConnectionState::Connected);
    assert_eq!(
        stack.controller.active_command(),
        ActiveCommand::Directional(DirectionalCommand::Right)
    );
}

// ---------------------------------------------------------------------------
// Gains
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_clamp_gains_before_sending() {
    let stack = connected().await;

    let sent = stack
        .controller
        .commit(ParameterSet::new(55.0, -1.0, 2.0))
        .await
        .unwrap();

    assert_eq!(sent, ParameterSet::new(40.0, 0.0, 2.0));
    assert_eq!(stack.controller.parameters(), sent);
    assert_eq!(stack.controller.draft(), sent);
    let robot = stack.radio.robot(ROBOT).unwrap();
    assert_eq!(robot.parameters(), Some(sent));
}

#[tokio::test(start_paused = true)]
async fn should_read_gains_back_from_robot() {
    let stack = connected().await;
    let robot = stack.radio.robot(ROBOT).unwrap();
    robot.set_raw_parameters(codec::encode_parameters(&ParameterSet::new(20.0, 1.0, 0.5)));

    let received = stack.controller.refresh().await.unwrap();

    assert_eq!(received, ParameterSet::new(20.0, 1.0, 0.5));
    assert_eq!(stack.controller.parameters(), received);
}

#[tokio::test(start_paused = true)]
async fn should_keep_gains_when_robot_reports_garbage() {
    let stack = connected().await;
    let robot = stack.radio.robot(ROBOT).unwrap();
    robot.set_raw_parameters(codec::transport_encode(b"{\"kp\": \"fast\"}"));

    let err = stack.controller.refresh().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedParameterPayload);
    assert_eq!(stack.controller.parameters(), ParameterSet::default());
}

#[tokio::test(start_paused = true)]
async fn should_refuse_commit_when_not_connected() {
    let stack = stack();

    let err = stack.controller.commit_draft().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert_eq!(stack.controller.parameters(), ParameterSet::default());
}
