//! In-memory repository implementations backed by `BTreeMap`s.
//!
//! Used by unit tests and by the service layer's own tests so they can run
//! without a database file. Semantics mirror the SQLx implementations,
//! including the status compare-and-set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Intersection, IntersectionDetails, IntersectionId, IntersectionStatus, NewIntersection,
    NewUser, OptimisationUpdate, User, UserId,
};
use crate::errors::{Result, ServiceError};
use crate::storage::repositories::{IntersectionRepository, UserRepository};

/// Map-backed user store. `BTreeMap` keeps listing order stable by id.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: Mutex<BTreeMap<String, User>>,
    associations: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(ServiceError::already_exists("user with this email already exists"));
        }

        let now = Utc::now();
        let record = User {
            id: user.id.clone(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            intersection_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id.into_string(), record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        let Some(user) = users.get(id.as_str()) else {
            return Ok(None);
        };
        let mut user = user.clone();
        user.intersection_ids = self
            .associations
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Ok(Some(user))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let id = {
            let users = self.users.lock().unwrap();
            users.values().find(|u| u.email == email).map(|u| u.id.clone())
        };
        match id {
            Some(id) => self.get_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn list(&self, limit: i64, offset: i64, filter: &str) -> Result<Vec<User>> {
        let ids: Vec<UserId> = {
            let users = self.users.lock().unwrap();
            users
                .values()
                .filter(|u| filter.is_empty() || u.name.contains(filter) || u.email.contains(filter))
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .map(|u| u.id.clone())
                .collect()
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.get_by_id(&id).await? {
                out.push(user);
            }
        }
        Ok(out)
    }

    async fn update_profile(&self, id: &UserId, name: &str, email: &str) -> Result<User> {
        {
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == email && u.id != *id) {
                return Err(ServiceError::already_exists("user with this email already exists"));
            }
            let user = users
                .get_mut(id.as_str())
                .ok_or_else(|| ServiceError::not_found("user", id.as_str()))?;
            user.name = name.to_string();
            user.email = email.to_string();
            user.updated_at = Utc::now();
        }
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::internal("user not found after update"))
    }

    async fn update_password(&self, id: &UserId, password_hash: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(id.as_str())
            .ok_or_else(|| ServiceError::not_found("user", id.as_str()))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_admin(&self, id: &UserId, is_admin: bool) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(id.as_str())
            .ok_or_else(|| ServiceError::not_found("user", id.as_str()))?;
        user.is_admin = is_admin;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn demote_admin(&self, id: &UserId) -> Result<bool> {
        // The count check and the write happen under one lock, matching the
        // single-statement SQL guard.
        let mut users = self.users.lock().unwrap();
        let admins = users.values().filter(|u| u.is_admin).count();
        let Some(user) = users.get_mut(id.as_str()) else {
            return Ok(false);
        };
        if !user.is_admin || admins <= 1 {
            return Ok(false);
        }
        user.is_admin = false;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: &UserId) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if users.remove(id.as_str()).is_none() {
            return Err(ServiceError::not_found("user", id.as_str()));
        }
        self.associations.lock().unwrap().remove(id.as_str());
        Ok(())
    }

    async fn intersection_ids(&self, id: &UserId) -> Result<Vec<String>> {
        Ok(self
            .associations
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_intersection_id(&self, id: &UserId, intersection_id: &str) -> Result<()> {
        self.associations
            .lock()
            .unwrap()
            .entry(id.as_str().to_string())
            .or_default()
            .insert(intersection_id.to_string());
        Ok(())
    }

    async fn remove_intersection_ids(
        &self,
        id: &UserId,
        intersection_ids: &[String],
    ) -> Result<()> {
        if let Some(set) = self.associations.lock().unwrap().get_mut(id.as_str()) {
            for intersection_id in intersection_ids {
                set.remove(intersection_id);
            }
        }
        Ok(())
    }
}

/// Map-backed intersection store.
#[derive(Debug, Default)]
pub struct InMemoryIntersectionRepository {
    intersections: Mutex<BTreeMap<String, Intersection>>,
}

impl InMemoryIntersectionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntersectionRepository for InMemoryIntersectionRepository {
    async fn create(&self, intersection: NewIntersection) -> Result<Intersection> {
        let now = Utc::now();
        let record = Intersection {
            id: intersection.id.clone(),
            name: intersection.name,
            details: intersection.details,
            created_at: now,
            last_run_at: now,
            status: IntersectionStatus::Unoptimised,
            run_count: 0,
            traffic_density: intersection.traffic_density,
            default_parameters: intersection.default_parameters,
            best_parameters: intersection.default_parameters,
            current_parameters: intersection.default_parameters,
        };
        self.intersections
            .lock()
            .unwrap()
            .insert(intersection.id.into_string(), record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: &IntersectionId) -> Result<Option<Intersection>> {
        Ok(self.intersections.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn list(&self, limit: i64, offset: i64, ids: &[String]) -> Result<Vec<Intersection>> {
        let intersections = self.intersections.lock().unwrap();
        Ok(intersections
            .values()
            .filter(|i| ids.is_empty() || ids.iter().any(|id| id == i.id.as_str()))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_details(
        &self,
        id: &IntersectionId,
        name: &str,
        details: &IntersectionDetails,
    ) -> Result<Intersection> {
        let mut intersections = self.intersections.lock().unwrap();
        let intersection = intersections
            .get_mut(id.as_str())
            .ok_or_else(|| ServiceError::not_found("intersection", id.as_str()))?;
        intersection.name = name.to_string();
        intersection.details = details.clone();
        Ok(intersection.clone())
    }

    async fn delete(&self, id: &IntersectionId) -> Result<()> {
        if self.intersections.lock().unwrap().remove(id.as_str()).is_none() {
            return Err(ServiceError::not_found("intersection", id.as_str()));
        }
        Ok(())
    }

    async fn apply_optimisation(
        &self,
        id: &IntersectionId,
        expected: IntersectionStatus,
        update: OptimisationUpdate,
    ) -> Result<bool> {
        let mut intersections = self.intersections.lock().unwrap();
        let Some(intersection) = intersections.get_mut(id.as_str()) else {
            return Ok(false);
        };
        if intersection.status != expected {
            return Ok(false);
        }

        intersection.status = update.status;
        intersection.current_parameters = update.current_parameters;
        if let Some(best) = update.best_parameters {
            intersection.best_parameters = best;
        }
        if update.run_completed {
            intersection.run_count += 1;
            intersection.last_run_at = Utc::now();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        IntersectionType, OptimisationParameters, OptimisationType, SimulationParameters,
        TrafficDensity,
    };

    fn new_user(email: &str) -> NewUser {
        NewUser {
            id: UserId::new(),
            name: "Mem User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn user_store_mirrors_sql_semantics() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("a@x.io")).await.unwrap();

        let err = repo.create(new_user("a@x.io")).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists { .. }));

        repo.add_intersection_id(&user.id, "i1").await.unwrap();
        repo.add_intersection_id(&user.id, "i1").await.unwrap();
        let fetched = repo.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.intersection_ids, vec!["i1"]);

        repo.delete(&user.id).await.unwrap();
        assert!(repo.get_by_id(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn demote_admin_guard_mirrors_sql_semantics() {
        let repo = InMemoryUserRepository::new();
        let a = repo.create(new_user("a@x.io")).await.unwrap();
        let b = repo.create(new_user("b@x.io")).await.unwrap();
        repo.set_admin(&a.id, true).await.unwrap();
        repo.set_admin(&b.id, true).await.unwrap();

        assert!(repo.demote_admin(&a.id).await.unwrap());
        assert!(!repo.demote_admin(&b.id).await.unwrap());
        assert!(repo.get_by_id(&b.id).await.unwrap().unwrap().is_admin);
        assert!(!repo.demote_admin(&UserId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn intersection_cas_rejects_stale_status() {
        let repo = InMemoryIntersectionRepository::new();
        let params = OptimisationParameters {
            optimisation_type: OptimisationType::None,
            parameters: SimulationParameters {
                intersection_type: IntersectionType::Roundabout,
                green: 5,
                yellow: 2,
                red: 5,
                speed: 40,
                seed: 0,
            },
        };
        let created = repo
            .create(NewIntersection {
                id: IntersectionId::new(),
                name: "Mem".to_string(),
                details: IntersectionDetails {
                    address: "a".to_string(),
                    city: "c".to_string(),
                    province: "p".to_string(),
                },
                traffic_density: TrafficDensity::Low,
                default_parameters: params,
            })
            .await
            .unwrap();

        let update = OptimisationUpdate {
            status: IntersectionStatus::Optimising,
            current_parameters: params,
            best_parameters: None,
            run_completed: false,
        };
        assert!(!repo
            .apply_optimisation(&created.id, IntersectionStatus::Optimised, update.clone())
            .await
            .unwrap());
        assert!(repo
            .apply_optimisation(&created.id, IntersectionStatus::Unoptimised, update)
            .await
            .unwrap());
    }
}
