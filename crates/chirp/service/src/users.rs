use crate::auth::{Auth, AuthError};
use crate::error::{ServiceError, ServiceResult};
use chirp_storage::{Storage, StorageError};
use chirp_types::{User, UserUpdate};
use std::sync::Arc;
use tracing::{debug, info};

/// Account operations. Passwords are hashed through [`Auth`] before they
/// reach storage.
pub struct UserService {
    storage: Arc<dyn Storage>,
    auth: Arc<dyn Auth>,
}

impl UserService {
    pub fn new(storage: Arc<dyn Storage>, auth: Arc<dyn Auth>) -> Self {
        Self { storage, auth }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<String>,
    ) -> ServiceResult<User> {
        let mut user = User::new(username, self.auth.hash(password)?);
        user.email = email.filter(|email| !email.is_empty());
        let user = self.storage.users().add(user).await?;
        info!(username = %user.username, "user registered");
        Ok(user)
    }

    pub async fn get(&self, username: &str) -> ServiceResult<User> {
        Ok(self.storage.users().get(username).await?)
    }

    /// Check the password and issue a session token. An unknown user and a
    /// wrong password are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<String> {
        let user = match self.storage.users().get(username).await {
            Ok(user) => user,
            Err(StorageError::NotFound(_)) => return Err(AuthError::InvalidCredentials.into()),
            Err(err) => return Err(err.into()),
        };
        if !self.auth.verify(&user.password_digest, password) {
            debug!(username = %username, "login rejected");
            return Err(AuthError::InvalidCredentials.into());
        }
        let token = self.auth.issue_token(&user.username)?;
        info!(username = %username, "user logged in");
        Ok(token)
    }

    /// Change the email and/or password. Empty values leave the field as is.
    pub async fn update_profile(
        &self,
        username: &str,
        email: Option<&str>,
        password: Option<&str>,
    ) -> ServiceResult<User> {
        let mut update = UserUpdate::new(username);
        if let Some(email) = email {
            update = update.set_email(email);
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            update = update.set_password_digest(self.auth.hash(password)?);
        }
        Ok(self.storage.users().update(update).await?)
    }

    pub async fn follow(&self, follower: &str, followee: &str) -> ServiceResult<()> {
        self.storage.users().follow(follower, followee).await?;
        Ok(())
    }

    pub async fn unfollow(&self, follower: &str, followee: &str) -> ServiceResult<()> {
        self.storage.users().unfollow(follower, followee).await?;
        Ok(())
    }

    /// Resolve a session token to its (current) account.
    pub async fn authenticate(&self, token: &str) -> ServiceResult<User> {
        let username = self
            .auth
            .verify_token(token)
            .map_err(|err| ServiceError::Unauthenticated(err.to_string()))?;
        match self.storage.users().get(&username).await {
            Ok(user) => Ok(user),
            Err(StorageError::NotFound(_)) => Err(ServiceError::Unauthenticated(format!(
                "token subject {username} no longer exists"
            ))),
            Err(err) => Err(err.into()),
        }
    }
}
