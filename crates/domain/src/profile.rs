//! Profile use cases.

use std::time::Duration;

use common::{Cause, DomainError, ErrorKind, Result, UserId, WrapErr};
use store::{Profile, ProfileData, ProfileRepository, UserRepository};

use crate::deadline::{DEFAULT_TIMEOUT, with_deadline};
use crate::validation;

const REPO_ERROR: &str = "error from profile repo";

fn invalid(err: validation::ValidationError) -> DomainError {
    DomainError::wrap(ErrorKind::Validation, Cause::opaque(err), "profile validation error")
}

/// Service for the one profile each user may have.
pub struct ProfileService<R: ProfileRepository + UserRepository> {
    repo: R,
    timeout: Duration,
}

impl<R: ProfileRepository + UserRepository> ProfileService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline applied to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<Profile> {
        with_deadline(self.timeout, self.repo.get_profile(user_id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Creates the profile of an existing user.
    ///
    /// Fails with `Exist` if the user already has one.
    #[tracing::instrument(skip(self, data))]
    pub async fn create(&self, user_id: UserId, data: ProfileData) -> Result<()> {
        validation::validate_profile(&data).map_err(invalid)?;

        with_deadline(self.timeout, async {
            self.repo.get_user(user_id).await?;
            match self.repo.get_profile(user_id).await {
                Ok(_) => return Err(DomainError::new(ErrorKind::Exist, "already exist")),
                Err(err) if err.kind() == ErrorKind::NotExist => {}
                Err(err) => return Err(err),
            }
            self.repo.store_profile(user_id, &data).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)?;

        tracing::info!(%user_id, "profile created");
        Ok(())
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn update(&self, user_id: UserId, data: ProfileData) -> Result<()> {
        validation::validate_profile(&data).map_err(invalid)?;

        with_deadline(self.timeout, self.repo.update_profile(user_id, &data))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, user_id: UserId) -> Result<()> {
        with_deadline(self.timeout, self.repo.remove_profile(user_id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use store::{InMemoryStore, NewUser};

    use super::*;

    fn person(first_name: &str) -> ProfileData {
        ProfileData {
            first_name: first_name.to_string(),
            last_name: "Lovelace".to_string(),
            middle_name: "King".to_string(),
            sex: "w".to_string(),
            age: 36,
        }
    }

    async fn account(store: &InMemoryStore) -> UserId {
        store
            .store_user(&NewUser {
                username: "ada".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryStore::new();
        let user_id = account(&store).await;
        let service = ProfileService::new(store);

        service.create(user_id, person("Ada")).await.unwrap();

        let profile = service.get(user_id).await.unwrap();
        assert_eq!(profile.full_name, "Lovelace Ada King");
        assert_eq!(profile.age, 36);
    }

    #[tokio::test]
    async fn second_profile_is_exist() {
        let store = InMemoryStore::new();
        let user_id = account(&store).await;
        let service = ProfileService::new(store);
        service.create(user_id, person("Ada")).await.unwrap();

        let err = service.create(user_id, person("Augusta")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exist);
        assert_eq!(err.classify().message(), "already exist");
        assert_eq!(service.get(user_id).await.unwrap().first_name, "Ada");
    }

    #[tokio::test]
    async fn unknown_user_is_not_exist() {
        let service = ProfileService::new(InMemoryStore::new());
        let err = service.create(UserId::new(), person("Ada")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[tokio::test]
    async fn update_requires_a_profile() {
        let store = InMemoryStore::new();
        let user_id = account(&store).await;
        let service = ProfileService::new(store);

        let err = service.update(user_id, person("Ada")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);

        service.create(user_id, person("Ada")).await.unwrap();
        service.update(user_id, person("Augusta")).await.unwrap();
        assert_eq!(service.get(user_id).await.unwrap().first_name, "Augusta");

        service.remove(user_id).await.unwrap();
        let err = service.get(user_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[tokio::test]
    async fn invalid_profile_is_validation() {
        let service = ProfileService::new(InMemoryStore::new());
        let mut data = person("Ada");
        data.age = -1;

        let err = service.create(UserId::new(), data).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.describe(), "profile validation error: age: must be positive");
    }
}
