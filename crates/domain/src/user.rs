//! Account use cases: sign-up, sign-in and followers.

use std::time::Duration;

use common::{Cause, DomainError, ErrorKind, Result, UserId, WrapErr};
use store::{Follower, NewUser, User, UserRepository};

use crate::deadline::{DEFAULT_TIMEOUT, with_deadline};
use crate::password::{PasswordHasher, Sha256Hasher};
use crate::validation;

const REPO_ERROR: &str = "error from user repo";

fn invalid(err: validation::ValidationError, message: &str) -> DomainError {
    DomainError::wrap(ErrorKind::Validation, Cause::opaque(err), message)
}

fn invalid_credentials() -> DomainError {
    DomainError::wrap(ErrorKind::UserCredentials, "invalid password", "invalid credentials")
}

/// Service for accounts and the follower graph.
pub struct UserService<R: UserRepository, H: PasswordHasher = Sha256Hasher> {
    repo: R,
    hasher: H,
    timeout: Duration,
}

impl<R: UserRepository> UserService<R> {
    /// Creates a user service that hashes with [`Sha256Hasher`].
    pub fn new(repo: R) -> Self {
        Self::with_hasher(repo, Sha256Hasher)
    }
}

impl<R: UserRepository, H: PasswordHasher> UserService<R, H> {
    pub fn with_hasher(repo: R, hasher: H) -> Self {
        Self {
            repo,
            hasher,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline applied to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Registers an account and returns its id.
    ///
    /// Fails with `Exist` if the username is taken.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<UserId> {
        validation::validate_credentials(username, password)
            .map_err(|e| invalid(e, "user validation error"))?;

        let id = with_deadline(self.timeout, async {
            match self.repo.get_user_by_username(username).await {
                Ok(_) => {
                    return Err(DomainError::new(
                        ErrorKind::Exist,
                        "username is already taken",
                    ));
                }
                Err(err) if err.kind() == ErrorKind::NotExist => {}
                Err(err) => return Err(err),
            }

            let password_hash = self
                .hasher
                .hash(password)
                .wrap_err(ErrorKind::Internal, "encryptor error")?;
            self.repo
                .store_user(&NewUser {
                    username: username.to_string(),
                    password_hash,
                })
                .await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)?;

        metrics::counter!("users_signed_up_total").increment(1);
        tracing::info!(%id, "user signed up");
        Ok(id)
    }

    /// Returns the account if the password matches.
    ///
    /// An unknown username and a wrong password fail the same way, with
    /// `UserCredentials`.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<User> {
        let found = with_deadline(self.timeout, self.repo.get_user_by_username(username)).await;
        let user = match found {
            Ok(user) => user,
            Err(err) if err.kind() == ErrorKind::NotExist => return Err(invalid_credentials()),
            Err(err) => return Err(DomainError::wrap(ErrorKind::Database, err, REPO_ERROR)),
        };

        if !self.hasher.verify(&user.password_hash, password) {
            tracing::debug!(id = %user.id, "password mismatch");
            return Err(invalid_credentials());
        }
        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: UserId) -> Result<User> {
        with_deadline(self.timeout, self.repo.get_user(id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Records that `follower.follower_id` follows `follower.user_id`. Both
    /// accounts must exist. Repeating the call changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn add_follower(&self, follower: Follower) -> Result<()> {
        validation::validate_follower(&follower)
            .map_err(|e| invalid(e, "follower validation error"))?;

        with_deadline(self.timeout, async {
            self.repo.get_user(follower.user_id).await?;
            self.repo.get_user(follower.follower_id).await?;
            self.repo.add_follower(&follower).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn followers(&self, user_id: UserId) -> Result<Vec<UserId>> {
        with_deadline(self.timeout, self.repo.get_followers(user_id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_follower(&self, follower: Follower) -> Result<()> {
        with_deadline(self.timeout, self.repo.remove_follower(&follower))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }
}
