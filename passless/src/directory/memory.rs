use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::errors::DirectoryError;
use super::store::UserDirectory;
use super::types::{Authenticator, User, UserUpdate};

/// In-memory directory. Backs the test suites and small deployments that
/// do not need durability.
pub struct MemoryDirectory {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    authenticators: HashMap<String, Authenticator>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        tracing::debug!("Creating new in-memory user directory");
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(id).cloned())
    }

    async fn find_by_ticket(&self, ticket: &str) -> Result<Option<User>, DirectoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.ticket.as_ref().is_some_and(|t| t.value == ticket))
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<User, DirectoryError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = user.email.as_deref() {
            if inner
                .users
                .values()
                .any(|u| u.email.as_deref() == Some(email))
            {
                return Err(DirectoryError::DuplicateEmail);
            }
        }
        if inner.users.contains_key(&user.id) {
            return Err(DirectoryError::Storage("duplicate user id".to_string()));
        }
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = update.email.as_deref() {
            if inner
                .users
                .values()
                .any(|u| u.id != id && u.email.as_deref() == Some(email))
            {
                return Err(DirectoryError::DuplicateEmail);
            }
        }
        let user = inner.users.get_mut(id).ok_or(DirectoryError::NotFound)?;
        update.apply(user);
        Ok(())
    }

    async fn add_authenticator(&self, authenticator: Authenticator) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        if inner
            .authenticators
            .contains_key(&authenticator.credential_id)
        {
            return Err(DirectoryError::DuplicateCredential);
        }
        inner
            .authenticators
            .insert(authenticator.credential_id.clone(), authenticator);
        Ok(())
    }

    async fn authenticators_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Authenticator>, DirectoryError> {
        let inner = self.inner.lock().await;
        let mut found: Vec<Authenticator> = inner
            .authenticators
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn find_authenticator(
        &self,
        credential_id: &str,
    ) -> Result<Option<Authenticator>, DirectoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.authenticators.get(credential_id).cloned())
    }

    async fn update_authenticator_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().await;
        let authenticator = inner
            .authenticators
            .get_mut(credential_id)
            .ok_or(DirectoryError::NotFound)?;
        authenticator.counter = counter;
        Ok(())
    }
}
