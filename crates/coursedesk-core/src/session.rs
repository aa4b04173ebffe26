//! The logged-in user, held explicitly alongside the provider.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{DataError, DataResult};
use crate::model::{Student, Teacher, User};
use crate::traits::DataProvider;

/// A provider plus the user who logged in through it.
pub struct Session {
    provider: Arc<dyn DataProvider>,
    user: RwLock<Option<User>>,
}

impl Session {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self {
            provider,
            user: RwLock::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<dyn DataProvider> {
        &self.provider
    }

    /// Authenticate and remember the user. A failed login leaves any
    /// existing session untouched.
    pub async fn login(&self, username: &str, password: &str) -> DataResult<User> {
        let user = self.provider.login(username, password).await?;
        tracing::info!(user = user.username(), role = %user.role(), "logged in");
        *self.user.write().await = Some(user.clone());
        Ok(user)
    }

    pub async fn logout(&self) {
        if let Some(user) = self.user.write().await.take() {
            tracing::info!(user = user.username(), "logged out");
        }
    }

    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub async fn require_teacher(&self) -> DataResult<Teacher> {
        match self.user.read().await.as_ref() {
            Some(User::Teacher(t)) => Ok(t.clone()),
            Some(User::Student(_)) => Err(DataError::WrongRole("teacher")),
            None => Err(DataError::NotLoggedIn),
        }
    }

    pub async fn require_student(&self) -> DataResult<Student> {
        match self.user.read().await.as_ref() {
            Some(User::Student(s)) => Ok(s.clone()),
            Some(User::Teacher(_)) => Err(DataError::WrongRole("student")),
            None => Err(DataError::NotLoggedIn),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}
