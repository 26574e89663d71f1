//! Directional commands.

use mipirobot_domain::codec;
use mipirobot_domain::command::{ActiveCommand, DirectionalCommand};
use mipirobot_domain::error::SessionError;
use mipirobot_domain::protocol::CharacteristicAddress;

use super::SessionController;
use crate::ports::{EventPublisher, Transport};

impl<T, P> SessionController<T, P>
where
    T: Transport,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Mark `command` active and write it to the robot.
    ///
    /// `Stop` clears the active command, like [`stop_motion`](Self::stop_motion).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] without touching the transport
    /// when there is no session, or [`SessionError::WriteFailed`] when the
    /// robot did not acknowledge the write.
    #[tracing::instrument(skip(self))]
    pub async fn send_directional(&self, command: DirectionalCommand) -> Result<(), SessionError> {
        let indicator = match command {
            DirectionalCommand::Stop => ActiveCommand::None,
            other => ActiveCommand::Directional(other),
        };
        self.dispatch(indicator, command).await
    }

    /// Clear the active command and write `Stop`.
    ///
    /// The stop is written after every command issued before it.
    ///
    /// # Errors
    ///
    /// Same as [`send_directional`](Self::send_directional).
    #[tracing::instrument(skip(self))]
    pub async fn stop_motion(&self) -> Result<(), SessionError> {
        self.dispatch(ActiveCommand::None, DirectionalCommand::Stop)
            .await
    }

    async fn dispatch(
        &self,
        indicator: ActiveCommand,
        command: DirectionalCommand,
    ) -> Result<(), SessionError> {
        // The indicator flips at call time; the write queues behind earlier
        // ones. No await may come before taking the command lock.
        let changed: Result<_, SessionError> = self.with_state(|state| {
            state.require_connected()?;
            let session = state.session_id().ok_or(SessionError::NotConnected)?;
            let mut events = Vec::new();
            state.set_active_command(indicator, &mut events);
            Ok((session, events))
        });
        let (session, events) = match changed {
            Ok(changed) => changed,
            Err(err) => return self.fail(err).await,
        };
        let _write_guard = self.shared.command_lock.lock().await;

        // The link may have dropped, or been replaced, while earlier writes
        // were in flight. Its teardown already cleared the indicator.
        let link = match self.with_state(|state| state.link_of(session)) {
            Ok(link) => link,
            Err(err) => return self.fail(err).await,
        };
        self.publish_all(events).await;

        let payload = codec::encode_command(command);
        let write = self.begin_write().await;
        let result = self
            .shared
            .transport
            .write(&link, CharacteristicAddress::COMMAND, &payload)
            .await;
        self.end_write(write).await;

        match result {
            Ok(()) => {
                tracing::debug!(%command, "command written");
                Ok(())
            }
            Err(err) => self.fail(SessionError::WriteFailed(err)).await,
        }
    }
}
