//! Single-slot ceremony challenge tracking.
//!
//! Each user carries at most one outstanding WebAuthn challenge. Starting a
//! new ceremony overwrites the previous slot, and completion consumes it
//! before any verification runs, so a failed attempt still burns the
//! challenge.

use std::sync::Arc;

use tracing::debug;

use crate::directory::{UserDirectory, UserUpdate};
use crate::error::AuthError;
use crate::utils::gen_random_string;

const CHALLENGE_LEN: usize = 32;

pub(crate) struct ChallengeStore {
    directory: Arc<dyn UserDirectory>,
}

impl ChallengeStore {
    pub(crate) fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Mints a fresh challenge and stores it on the user row, replacing any
    /// outstanding one.
    pub(crate) async fn begin(&self, user_id: &str) -> Result<String, AuthError> {
        let challenge = gen_random_string(CHALLENGE_LEN)?;
        self.directory
            .update_user(
                user_id,
                UserUpdate {
                    current_challenge: Some(Some(challenge.clone())),
                    ..Default::default()
                },
            )
            .await?;
        debug!(user_id, "issued ceremony challenge");
        Ok(challenge)
    }

    /// Takes the stored challenge, clearing the slot. Errors when no
    /// ceremony is in flight for the user.
    pub(crate) async fn consume(&self, user_id: &str) -> Result<String, AuthError> {
        let user = self
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidRequest)?;
        let challenge = user.current_challenge.ok_or_else(|| {
            tracing::warn!(user_id, "no ceremony in flight for user");
            AuthError::InvalidRequest
        })?;
        self.directory
            .update_user(
                user_id,
                UserUpdate {
                    current_challenge: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        Ok(challenge)
    }
}
