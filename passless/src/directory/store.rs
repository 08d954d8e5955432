use async_trait::async_trait;

use super::errors::DirectoryError;
use super::types::{Authenticator, User, UserUpdate};

/// The persistence boundary consumed by every flow controller.
///
/// Callers pass emails already case-normalized. There is no
/// compare-and-swap: `update_user` is a plain last-writer-wins write, and
/// completion paths re-read immediately before comparing secrets.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError>;

    /// Look up the user currently holding this ticket value. The flow
    /// still re-validates the stored slot (expiry, constant-time match)
    /// after the lookup.
    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<User>, DirectoryError>;

    /// Atomic create. Collisions on email surface as
    /// [`DirectoryError::DuplicateEmail`], distinct from other failures.
    async fn insert_user(&self, user: User) -> Result<User, DirectoryError>;

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<(), DirectoryError>;

    /// Extend (never replace) the user's authenticator set. Collisions on
    /// credential id surface as [`DirectoryError::DuplicateCredential`].
    async fn add_authenticator(&self, authenticator: Authenticator) -> Result<(), DirectoryError>;

    async fn authenticators_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Authenticator>, DirectoryError>;

    async fn find_authenticator(
        &self,
        credential_id: &str,
    ) -> Result<Option<Authenticator>, DirectoryError>;

    async fn update_authenticator_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), DirectoryError>;
}
