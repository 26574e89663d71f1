//! Gain editing: the draft, committing it, and reading the robot's gains
//! back.

use mipirobot_domain::codec;
use mipirobot_domain::error::SessionError;
use mipirobot_domain::event::SessionEvent;
use mipirobot_domain::parameter_store::StepDirection;
use mipirobot_domain::parameters::{Gain, ParameterSet};
use mipirobot_domain::protocol::CharacteristicAddress;

use super::SessionController;
use crate::ports::{EventPublisher, Transport};

impl<T, P> SessionController<T, P>
where
    T: Transport,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Set one gain of the draft. The value is clamped on commit, not here.
    pub async fn set_draft(&self, gain: Gain, value: f64) -> ParameterSet {
        let draft = self.with_state(|state| state.parameters.set_draft(gain, value));
        self.publish(SessionEvent::DraftChanged(draft)).await;
        draft
    }

    /// Nudge one gain of the draft by its step size, staying within bounds.
    pub async fn step_draft(&self, gain: Gain, direction: StepDirection) -> ParameterSet {
        let draft = self.with_state(|state| state.parameters.step_draft(gain, direction));
        self.publish(SessionEvent::DraftChanged(draft)).await;
        draft
    }

    /// Clamp `draft`, make it the current gains and write it to the robot.
    ///
    /// The store keeps the clamped gains even when the write fails.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] without touching the store or
    /// the transport when there is no session, or
    /// [`SessionError::WriteFailed`] when the robot did not acknowledge.
    #[tracing::instrument(skip(self, draft), fields(draft = %draft))]
    pub async fn commit(&self, draft: ParameterSet) -> Result<ParameterSet, SessionError> {
        if let Err(err) = self.with_state(|state| state.require_connected()) {
            return self.fail(err).await;
        }
        let _io_guard = self.shared.parameter_lock.lock().await;

        let committed: Result<_, SessionError> = self.with_state(|state| {
            let link = state.link()?;
            Ok((state.parameters.commit(draft), link))
        });
        let (committed, link) = match committed {
            Ok(committed) => committed,
            Err(err) => return self.fail(err).await,
        };
        self.publish_all(vec![
            SessionEvent::ParametersChanged(committed),
            SessionEvent::DraftChanged(committed),
        ])
        .await;

        let payload = codec::encode_parameters(&committed);
        match self
            .shared
            .transport
            .write(&link, CharacteristicAddress::PARAMETERS, &payload)
            .await
        {
            Ok(()) => {
                tracing::info!(parameters = %committed, "gains committed");
                Ok(committed)
            }
            Err(err) => self.fail(SessionError::WriteFailed(err)).await,
        }
    }

    /// Commit the current draft.
    ///
    /// # Errors
    ///
    /// Same as [`commit`](Self::commit).
    pub async fn commit_draft(&self) -> Result<ParameterSet, SessionError> {
        let draft = self.draft();
        self.commit(draft).await
    }

    /// Read the gains stored on the robot and adopt them, clamped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when there is no session,
    /// [`SessionError::ReadFailed`] when the read fails, or
    /// [`SessionError::MalformedParameterPayload`] when the value cannot be
    /// decoded. The store is untouched on every error.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<ParameterSet, SessionError> {
        if let Err(err) = self.with_state(|state| state.require_connected()) {
            return self.fail(err).await;
        }
        let _io_guard = self.shared.parameter_lock.lock().await;

        let link = match self.with_state(|state| state.link()) {
            Ok(link) => link,
            Err(err) => return self.fail(err).await,
        };
        let raw = match self
            .shared
            .transport
            .read(&link, CharacteristicAddress::PARAMETERS)
            .await
        {
            Ok(raw) => raw,
            Err(err) => return self.fail(SessionError::ReadFailed(err)).await,
        };
        let received = match codec::decode_parameters(&raw) {
            Ok(received) => received,
            Err(err) => {
                return self
                    .fail(SessionError::MalformedParameterPayload(err))
                    .await;
            }
        };

        let applied = self.with_state(|state| state.parameters.apply_received(received));
        tracing::info!(parameters = %applied, "gains read from robot");
        self.publish_all(vec![
            SessionEvent::ParametersChanged(applied),
            SessionEvent::DraftChanged(applied),
        ])
        .await;
        Ok(applied)
    }
}
