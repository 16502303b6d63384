//! Bounded polling for entity state transitions.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::array::Transport;
use crate::error::DriverError;
use crate::repository::Stateful;

use super::K2Driver;

/// Cadence of [`K2Driver::wait_for_state`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Delay between refreshes.
    pub interval: Duration,
    /// Refreshes made before giving up.
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

impl<T: Transport> K2Driver<T> {
    /// Refreshes `entity` until it reports `state`, returning the refreshed
    /// entity.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] when the state is not reached within
    /// the configured attempts, or [`DriverError::Array`] when a refresh
    /// fails.
    #[tracing::instrument(skip(self, entity), fields(entity = %entity.object_ref()))]
    pub async fn wait_for_state<R: Stateful>(&self, entity: &R, state: &str) -> Result<R, DriverError> {
        if entity.state() == Some(state) {
            return Ok(entity.clone());
        }
        let reference = entity.object_ref();
        for attempt in 1..=self.poll.max_attempts {
            let current: R = self.client.get(&reference).await?;
            if current.state() == Some(state) {
                return Ok(current);
            }
            debug!(attempt, current = ?current.state(), "entity has not reached state yet");
            sleep(self.poll.interval).await;
        }
        Err(DriverError::Timeout {
            entity: reference.to_string(),
            state: state.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::error::ErrorKind;
    use crate::repository::{ObjectRef, Volume};
    use crate::test_support::fake_driver;

    use super::PollSettings;

    fn volume(id: u64, state: &str) -> Volume {
        Volume {
            id,
            name: String::from("cv-poll"),
            size: 1_048_576,
            volume_group: ObjectRef::new("volume_groups", 1),
            state: Some(state.to_owned()),
        }
    }

    #[tokio::test]
    async fn returns_immediately_when_already_in_state() {
        let (driver, array) = fake_driver();
        let reached = driver
            .wait_for_state(&volume(99, "online"), "online")
            .await
            .expect("already online");
        assert_eq!(reached.id, 99);
        assert!(array.requests().is_empty());
    }

    #[tokio::test]
    async fn polls_until_state_is_reported() {
        let (plain, array) = fake_driver();
        let driver = plain.with_poll_settings(PollSettings {
            interval: Duration::from_millis(1),
            max_attempts: 1_000,
        });
        let id = array.insert(
            "volumes",
            json!({"name": "cv-poll", "size": 1, "volume_group": {"ref": "/volume_groups/1"}, "state": "creating"}),
        );

        let updater = array.clone();
        let flip = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            updater.update("volumes", id, json!({"state": "online"}));
        });

        let reached = driver
            .wait_for_state(&volume(id, "creating"), "online")
            .await
            .expect("volume comes online");
        flip.await.expect("updater task");
        assert_eq!(reached.state.as_deref(), Some("online"));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (plain, array) = fake_driver();
        let driver = plain.with_poll_settings(PollSettings {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        });
        let id = array.insert(
            "volumes",
            json!({"name": "cv-poll", "size": 1, "volume_group": {"ref": "/volume_groups/1"}, "state": "creating"}),
        );

        let err = driver
            .wait_for_state(&volume(id, "creating"), "online")
            .await
            .expect_err("never comes online");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(array.requests().len(), 3);
    }
}
