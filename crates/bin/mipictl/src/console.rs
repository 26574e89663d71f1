//! Operator console — one text command per line, one reply per command.
//!
//! The console is the only user-facing surface of `mipictl`. It parses a
//! line into a [`ConsoleCommand`], runs it against the session controller and
//! renders the outcome. Controller failures are rendered as replies rather
//! than propagated; the controller already records them as the last error.

use std::fmt::Write as _;
use std::str::FromStr;

use mipirobot_app::ports::{EventPublisher, Transport};
use mipirobot_app::services::SessionController;
use mipirobot_domain::command::{ActiveCommand, DirectionalCommand};
use mipirobot_domain::parameter_store::StepDirection;
use mipirobot_domain::parameters::{Gain, ParameterSet};
use mipirobot_domain::peripheral::PeripheralDescriptor;
use mipirobot_domain::session::{ConnectionState, Indicator, SessionSnapshot};

pub const HELP: &str = "\
commands:
  scan                      discover robots
  stop-scan                 stop discovering
  devices                   list discovered robots
  connect [n]               connect to robot n (default: the first one)
  disconnect                end the session
  forward|backward|left|right
                            send a directional command
  stop                      stop the robot
  draft <kp|ki|kd> <value>  edit the draft gains
  step <kp|ki|kd> <+|->     nudge a draft gain by one step
  send [kp ki kd]           commit the draft, or the given gains
  refresh                   read the gains back from the robot
  status                    show the session
  dismiss                   clear the last error
  help                      show this text
  quit                      leave";

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Scan,
    StopScan,
    Devices,
    /// Connect to the n-th discovered robot (1-based), or the first.
    Connect(Option<usize>),
    Disconnect,
    Move(DirectionalCommand),
    Stop,
    Draft(Gain, f64),
    Step(Gain, StepDirection),
    /// Commit explicit gains, or the draft when `None`.
    Send(Option<ParameterSet>),
    Refresh,
    Status,
    Dismiss,
    Help,
    Quit,
}

/// Errors raised while parsing a console line.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}, type `help`")]
    UnknownCommand(String),
    #[error("{command}: {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: String,
    },
}

fn invalid(command: &'static str, reason: impl Into<String>) -> ConsoleError {
    ConsoleError::InvalidArgument {
        command,
        reason: reason.into(),
    }
}

fn parse_gain(command: &'static str, word: Option<&str>) -> Result<Gain, ConsoleError> {
    let word = word.ok_or_else(|| invalid(command, "expected kp, ki or kd"))?;
    word.parse().map_err(|_| invalid(command, format!("unknown gain {word:?}")))
}

fn parse_number(command: &'static str, word: Option<&str>) -> Result<f64, ConsoleError> {
    let word = word.ok_or_else(|| invalid(command, "expected a number"))?;
    match word.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(invalid(command, format!("{word:?} is not a number"))),
    }
}

fn parse_step(word: Option<&str>) -> Result<StepDirection, ConsoleError> {
    match word {
        Some("+" | "up") => Ok(StepDirection::Up),
        Some("-" | "down") => Ok(StepDirection::Down),
        _ => Err(invalid("step", "expected + or -")),
    }
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ConsoleError::Empty);
        };
        let head = head.to_ascii_lowercase();

        let command = match head.as_str() {
            "scan" => Self::Scan,
            "stop-scan" => Self::StopScan,
            "devices" | "ls" => Self::Devices,
            "connect" => match words.next() {
                None => Self::Connect(None),
                Some(word) => match word.parse::<usize>() {
                    Ok(index) if index > 0 => Self::Connect(Some(index)),
                    _ => return Err(invalid("connect", format!("{word:?} is not a device number"))),
                },
            },
            "disconnect" => Self::Disconnect,
            "stop" => Self::Stop,
            "draft" => {
                let gain = parse_gain("draft", words.next())?;
                Self::Draft(gain, parse_number("draft", words.next())?)
            }
            "step" => {
                let gain = parse_gain("step", words.next())?;
                Self::Step(gain, parse_step(words.next())?)
            }
            "send" => match words.next() {
                None => Self::Send(None),
                Some(kp) => {
                    let kp = parse_number("send", Some(kp))?;
                    let ki = parse_number("send", words.next())?;
                    let kd = parse_number("send", words.next())?;
                    Self::Send(Some(ParameterSet::new(kp, ki, kd)))
                }
            },
            "refresh" => Self::Refresh,
            "status" => Self::Status,
            "dismiss" => Self::Dismiss,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => match other.parse::<DirectionalCommand>() {
                Ok(DirectionalCommand::Stop) => Self::Stop,
                Ok(direction) => Self::Move(direction),
                Err(_) => return Err(ConsoleError::UnknownCommand(other.to_string())),
            },
        };

        match words.next() {
            Some(extra) => Err(invalid("console", format!("unexpected argument {extra:?}"))),
            None => Ok(command),
        }
    }
}

/// What the caller should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Quit,
}

/// Runs console commands against one session controller.
pub struct Console<T: Transport, P> {
    controller: SessionController<T, P>,
}

impl<T, P> Console<T, P>
where
    T: Transport,
    P: EventPublisher + Send + Sync + 'static,
{
    pub fn new(controller: SessionController<T, P>) -> Self {
        Self { controller }
    }

    /// Parse and run one line. Blank lines produce an empty reply.
    pub async fn handle_line(&self, line: &str) -> Outcome {
        if line.trim().is_empty() {
            return Outcome::Reply(String::new());
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => self.execute(command).await,
            Err(err) => Outcome::Reply(format!("error: {err}")),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn execute(&self, command: ConsoleCommand) -> Outcome {
        let controller = &self.controller;
        let reply = match command {
            ConsoleCommand::Scan => match controller.start_scan().await {
                Ok(()) => format!(
                    "scanning for {}s",
                    controller.config().scan_timeout().as_secs_f64()
                ),
                Err(err) => format!("error: {}", err.report()),
            },
            ConsoleCommand::StopScan => {
                controller.stop_scan().await;
                "scan stopped".to_string()
            }
            ConsoleCommand::Devices => format_devices(&controller.discovered()),
            ConsoleCommand::Connect(index) => {
                let target = match index {
                    None => None,
                    Some(index) => match index
                        .checked_sub(1)
                        .and_then(|position| controller.discovered().into_iter().nth(position))
                    {
                        Some(peripheral) => Some(peripheral),
                        None => return Outcome::Reply(format!("error: no device #{index}")),
                    },
                };
                match controller.connect(target).await {
                    Ok(session) => format!(
                        "connected to {}",
                        session.peripheral.display_name()
                    ),
                    Err(err) => format!("error: {}", err.report()),
                }
            }
            ConsoleCommand::Disconnect => match controller.disconnect().await {
                Ok(()) => "disconnected".to_string(),
                Err(err) => format!("error: {}", err.report()),
            },
            ConsoleCommand::Move(direction) => {
                match controller.send_directional(direction).await {
                    Ok(()) => format!("sent {direction}"),
                    Err(err) => format!("error: {}", err.report()),
                }
            }
            ConsoleCommand::Stop => match controller.stop_motion().await {
                Ok(()) => "sent stop".to_string(),
                Err(err) => format!("error: {}", err.report()),
            },
            ConsoleCommand::Draft(gain, value) => {
                format!("draft {}", controller.set_draft(gain, value).await)
            }
            ConsoleCommand::Step(gain, direction) => {
                format!("draft {}", controller.step_draft(gain, direction).await)
            }
            ConsoleCommand::Send(gains) => {
                let result = match gains {
                    Some(gains) => controller.commit(gains).await,
                    None => controller.commit_draft().await,
                };
                match result {
                    Ok(sent) => format!("sent {sent}"),
                    Err(err) => format!("error: {}", err.report()),
                }
            }
            ConsoleCommand::Refresh => match controller.refresh().await {
                Ok(received) => format!("robot reports {received}"),
                Err(err) => format!("error: {}", err.report()),
            },
            ConsoleCommand::Status => format_status(&controller.snapshot()),
            ConsoleCommand::Dismiss => {
                controller.dismiss_error();
                "ok".to_string()
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => return Outcome::Quit,
        };
        Outcome::Reply(reply)
    }

    /// Leave the robot stopped and unlinked.
    pub async fn shutdown(&self) {
        self.controller.stop_scan().await;
        if self.controller.state() == ConnectionState::Connected {
            if let Err(err) = self.controller.stop_motion().await {
                tracing::warn!(error = %err, "stop on shutdown failed");
            }
        }
        if let Err(err) = self.controller.disconnect().await {
            tracing::warn!(error = %err, "disconnect on shutdown failed");
        }
    }
}

pub fn format_devices(devices: &[PeripheralDescriptor]) -> String {
    if devices.is_empty() {
        return "no robots discovered".to_string();
    }
    let mut out = String::new();
    for (index, device) in devices.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:>2}. {} ({})", index + 1, device.display_name(), device.id);
    }
    out
}

pub fn format_status(snapshot: &SessionSnapshot) -> String {
    let indicator = match snapshot.indicator() {
        Indicator::Connected => "connected",
        Indicator::Scanning => "scanning",
        Indicator::Disconnected => "disconnected",
    };
    let mut out = format!("{indicator} [{}]", snapshot.state);
    if let Some(session) = snapshot.session.session() {
        let _ = write!(out, "\nrobot:     {}", session.peripheral.display_name());
    }
    let command = match snapshot.active_command {
        ActiveCommand::None => "none".to_string(),
        ActiveCommand::Directional(command) => command.to_string(),
    };
    let _ = write!(out, "\ncommand:   {command}");
    if snapshot.writing {
        out.push_str(" (writing)");
    }
    let _ = write!(out, "\ngains:     {}", snapshot.parameters);
    if snapshot.draft != snapshot.parameters {
        let _ = write!(out, "\ndraft:     {}", snapshot.draft);
    }
    if !snapshot.discovered.is_empty() {
        let _ = write!(out, "\ndevices:   {}", snapshot.discovered.len());
    }
    if let Some(error) = &snapshot.last_error {
        let _ = write!(out, "\nlast error: {error}");
    }
    out
}
