//! User domain service.
//!
//! Enforces validation, permissions and the email uniqueness invariant on top
//! of the repository. The gRPC adapter owns only wire conversion; everything
//! a test would want to assert about behaviour lives here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::auth::{hashing, jwt, AuthContext};
use crate::domain::{NewUser, User, UserId};
use crate::errors::{Result, ServiceError};
use crate::services::validation::{
    validate, AddIntersectionIdInput, AdminActionInput, ChangePasswordInput, EmailInput,
    LoginUserInput, PageInput, RegisterUserInput, RemoveIntersectionIdsInput, UpdateUserInput,
    UserIdInput,
};
use crate::storage::repositories::UserRepository;

const ADMIN_ONLY_MESSAGE: &str = "only admins can access this endpoint";
const SELF_ONLY_MESSAGE: &str = "you can only access your own account";
const INVALID_CREDENTIALS: &str = "invalid credentials";

/// A freshly issued bearer token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Caller must be an admin.
    fn require_admin(caller: Option<&AuthContext>) -> Result<&AuthContext> {
        match caller {
            Some(ctx) if ctx.is_admin() => Ok(ctx),
            Some(_) => Err(ServiceError::forbidden(ADMIN_ONLY_MESSAGE)),
            None => Err(ServiceError::unauthorized("authentication required")),
        }
    }

    /// Caller must be an admin or the target user themselves.
    fn require_self_or_admin<'c>(
        caller: Option<&'c AuthContext>,
        target: &str,
    ) -> Result<&'c AuthContext> {
        match caller {
            Some(ctx) if ctx.can_access_user(target) => Ok(ctx),
            Some(_) => Err(ServiceError::forbidden(SELF_ONLY_MESSAGE)),
            None => Err(ServiceError::unauthorized("authentication required")),
        }
    }

    async fn load_user(&self, user_id: &str) -> Result<User> {
        let id = UserId::from_string(user_id.to_string());
        self.repo
            .get_by_id(&id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user", user_id))
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterUserInput) -> Result<User> {
        validate(&input)?;
        let email = User::normalize_email(&input.email);

        if self.repo.get_by_email(&email).await?.is_some() {
            return Err(ServiceError::already_exists("user with this email already exists"));
        }

        let password_hash = hashing::hash_password(&input.password)?;
        let user = self
            .repo
            .create(NewUser {
                id: UserId::new(),
                name: input.name.trim().to_string(),
                email,
                password_hash,
                is_admin: false,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Authenticate and issue a bearer token.
    ///
    /// Unknown email and wrong password produce the identical error so the
    /// endpoint cannot be used to enumerate accounts.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginUserInput) -> Result<IssuedToken> {
        validate(&input)?;
        let email = User::normalize_email(&input.email);

        let user = self
            .repo
            .get_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::unauthorized(INVALID_CREDENTIALS))?;

        if !hashing::verify_password(&input.password, &user.password_hash)? {
            return Err(ServiceError::unauthorized(INVALID_CREDENTIALS));
        }

        let (token, expires_at) = jwt::sign(user.id.as_str(), user.role(), jwt::TOKEN_TTL)?;
        info!(user_id = %user.id, "user logged in");
        Ok(IssuedToken { token, expires_at })
    }

    /// Token issuance is stateless, so logout only confirms the user exists.
    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn logout(&self, caller: Option<&AuthContext>, input: UserIdInput) -> Result<()> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;
        self.load_user(&input.user_id).await?;
        Ok(())
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn get_by_id(
        &self,
        caller: Option<&AuthContext>,
        input: UserIdInput,
    ) -> Result<User> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;
        self.load_user(&input.user_id).await
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn get_by_email(&self, input: EmailInput) -> Result<User> {
        validate(&input)?;
        let email = User::normalize_email(&input.email);
        self.repo
            .get_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("user", email))
    }

    /// Admin-only paged listing in stable id order.
    #[instrument(skip(self, caller, input), fields(page = input.page, page_size = input.page_size))]
    pub async fn list(&self, caller: Option<&AuthContext>, input: PageInput) -> Result<Vec<User>> {
        Self::require_admin(caller)?;
        validate(&input)?;
        self.repo.list(input.limit(), input.offset(), input.filter.trim()).await
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn update(
        &self,
        caller: Option<&AuthContext>,
        input: UpdateUserInput,
    ) -> Result<User> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;

        let existing = self.load_user(&input.user_id).await?;
        let email = User::normalize_email(&input.email);

        if email != existing.email {
            if let Some(other) = self.repo.get_by_email(&email).await? {
                if other.id != existing.id {
                    return Err(ServiceError::already_exists(
                        "user with this email already exists",
                    ));
                }
            }
        }

        self.repo.update_profile(&existing.id, input.name.trim(), &email).await
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn delete(&self, caller: Option<&AuthContext>, input: UserIdInput) -> Result<()> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;

        let user = self.load_user(&input.user_id).await?;
        if user.is_admin {
            warn!(user_id = %user.id, "deleting an admin account");
        }
        self.repo.delete(&user.id).await?;
        info!(user_id = %user.id, "user deleted");
        Ok(())
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn change_password(
        &self,
        caller: Option<&AuthContext>,
        input: ChangePasswordInput,
    ) -> Result<()> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;

        let user = self.load_user(&input.user_id).await?;
        if !hashing::verify_password(&input.current_password, &user.password_hash)? {
            return Err(ServiceError::unauthorized("current password is incorrect"));
        }

        let new_hash = hashing::hash_password(&input.new_password)?;
        self.repo.update_password(&user.id, &new_hash).await?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// Always succeeds after validation so the endpoint cannot reveal whether
    /// an email is registered. Delivery of the reset flow is external.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn reset_password(&self, input: EmailInput) -> Result<()> {
        validate(&input)?;
        let email = User::normalize_email(&input.email);

        if let Some(user) = self.repo.get_by_email(&email).await? {
            info!(user_id = %user.id, "password reset requested");
        }
        Ok(())
    }

    /// Grant admin. The acting user named in the request must exist and hold
    /// the admin role; granting to an existing admin is a no-op.
    #[instrument(skip(self, input), fields(target = %input.user_id, acting = %input.admin_user_id))]
    pub async fn make_admin(&self, input: AdminActionInput) -> Result<()> {
        validate(&input)?;
        self.require_acting_admin(&input.admin_user_id).await?;

        let target = self.load_user(&input.user_id).await?;
        if target.is_admin {
            return Ok(());
        }
        self.repo.set_admin(&target.id, true).await?;
        info!(user_id = %target.id, "admin role granted");
        Ok(())
    }

    /// Revoke admin. Demoting a non-admin is a no-op; demoting the last
    /// remaining admin is refused so the system always keeps one.
    #[instrument(skip(self, input), fields(target = %input.user_id, acting = %input.admin_user_id))]
    pub async fn remove_admin(&self, input: AdminActionInput) -> Result<()> {
        validate(&input)?;
        self.require_acting_admin(&input.admin_user_id).await?;

        let target = self.load_user(&input.user_id).await?;
        if !target.is_admin {
            return Ok(());
        }
        // The store demotes and checks the remaining-admin count in one
        // atomic step; concurrent demotions cannot drop below one admin.
        if !self.repo.demote_admin(&target.id).await? {
            let fresh = self.load_user(target.id.as_str()).await?;
            if fresh.is_admin {
                return Err(ServiceError::forbidden("cannot remove the last remaining admin"));
            }
            // A concurrent demotion got there first; same no-op outcome as
            // targeting a non-admin.
            return Ok(());
        }
        info!(user_id = %target.id, "admin role revoked");
        Ok(())
    }

    async fn require_acting_admin(&self, admin_user_id: &str) -> Result<()> {
        let id = UserId::from_string(admin_user_id.to_string());
        match self.repo.get_by_id(&id).await? {
            Some(acting) if acting.is_admin => Ok(()),
            _ => Err(ServiceError::forbidden(ADMIN_ONLY_MESSAGE)),
        }
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn intersection_ids(
        &self,
        caller: Option<&AuthContext>,
        input: UserIdInput,
    ) -> Result<Vec<String>> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;
        let user = self.load_user(&input.user_id).await?;
        Ok(user.intersection_ids)
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn add_intersection_id(
        &self,
        caller: Option<&AuthContext>,
        input: AddIntersectionIdInput,
    ) -> Result<()> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;
        let user = self.load_user(&input.user_id).await?;
        self.repo.add_intersection_id(&user.id, input.intersection_id.trim()).await
    }

    #[instrument(skip(self, caller, input), fields(user_id = %input.user_id))]
    pub async fn remove_intersection_ids(
        &self,
        caller: Option<&AuthContext>,
        input: RemoveIntersectionIdsInput,
    ) -> Result<()> {
        validate(&input)?;
        Self::require_self_or_admin(caller, &input.user_id)?;
        let user = self.load_user(&input.user_id).await?;
        self.repo.remove_intersection_ids(&user.id, &input.intersection_ids).await
    }
}
