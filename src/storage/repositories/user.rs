//! User repository: CRUD over `users` plus the user↔intersection
//! association set in `user_intersections`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::{NewUser, User, UserId};
use crate::errors::{Result, ServiceError};
use crate::storage::DbPool;

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage contract for user records.
///
/// Absence on read is a distinguished `Ok(None)`, not an error, so the
/// registration flow can probe for an existing email without raising.
/// Unique-constraint violations surface as `ALREADY_EXISTS`.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. `email` must already be normalised.
    async fn create(&self, user: NewUser) -> Result<User>;

    /// Fetch a user by id.
    async fn get_by_id(&self, id: &UserId) -> Result<Option<User>>;

    /// Fetch a user by normalised email.
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List users in stable id order. `filter` is a free-text substring
    /// matched against name or email; empty matches all.
    async fn list(&self, limit: i64, offset: i64, filter: &str) -> Result<Vec<User>>;

    /// Update name and email, bumping `updated_at`.
    async fn update_profile(&self, id: &UserId, name: &str, email: &str) -> Result<User>;

    /// Replace the stored password hash.
    async fn update_password(&self, id: &UserId, password_hash: &str) -> Result<()>;

    /// Flip the admin bit.
    async fn set_admin(&self, id: &UserId, is_admin: bool) -> Result<()>;

    /// Clear the admin bit, refusing when the target is the last remaining
    /// admin. The count check and the write are a single atomic step.
    /// Returns whether a row changed; `false` covers a missing user, a
    /// non-admin target and the last-admin refusal alike.
    async fn demote_admin(&self, id: &UserId) -> Result<bool>;

    /// Hard-delete a user and, transitively, their associations.
    async fn delete(&self, id: &UserId) -> Result<()>;

    /// The intersection ids owned by a user, in stable order.
    async fn intersection_ids(&self, id: &UserId) -> Result<Vec<String>>;

    /// Set-insert an association; inserting an existing pair is a no-op.
    async fn add_intersection_id(&self, id: &UserId, intersection_id: &str) -> Result<()>;

    /// Set-difference; ids not present are ignored.
    async fn remove_intersection_ids(&self, id: &UserId, intersection_ids: &[String])
        -> Result<()>;
}

/// SQLx-backed implementation over the relational schema.
#[derive(Debug, Clone)]
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn row_to_user(&self, row: UserRow) -> Result<User> {
        let id = UserId::from_string(row.id);
        let intersection_ids = self.intersection_ids(&id).await?;
        Ok(User {
            id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            is_admin: row.is_admin,
            intersection_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn map_insert_error(err: sqlx::Error, context: &str) -> ServiceError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return ServiceError::already_exists("user with this email already exists");
        }
    }
    ServiceError::database(err, context.to_string())
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, is_admin, created_at, updated_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    #[instrument(skip(self, user), fields(user_id = %user.id, email = %user.email), name = "db_create_user")]
    async fn create(&self, user: NewUser) -> Result<User> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, is_admin, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, "failed to create user"))?;

        self.get_by_id(&user.id)
            .await?
            .ok_or_else(|| ServiceError::internal("user not found after creation"))
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_get_user")]
    async fn get_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to fetch user"))?;

        match row {
            Some(row) => Ok(Some(self.row_to_user(row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(email = %email), name = "db_get_user_by_email")]
    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to fetch user by email"))?;

        match row {
            Some(row) => Ok(Some(self.row_to_user(row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(limit, offset), name = "db_list_users")]
    async fn list(&self, limit: i64, offset: i64, filter: &str) -> Result<Vec<User>> {
        // LIKE metacharacters in the filter are matched literally, the same
        // plain substring semantics the in-memory repository has.
        let escaped = filter.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ($1 = '' OR name LIKE $2 ESCAPE '\\' OR email LIKE $2 ESCAPE '\\')
             ORDER BY id LIMIT $3 OFFSET $4"
        ))
        .bind(filter)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to list users"))?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.row_to_user(row).await?);
        }
        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_update_user")]
    async fn update_profile(&self, id: &UserId, name: &str, email: &str) -> Result<User> {
        let result = sqlx::query(
            "UPDATE users SET name = $1, email = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, "failed to update user"))?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("user", id.as_str()));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::internal("user not found after update"))
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), name = "db_update_password")]
    async fn update_password(&self, id: &UserId, password_hash: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|err| ServiceError::database(err, "failed to update password"))?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("user", id.as_str()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id, is_admin), name = "db_set_admin")]
    async fn set_admin(&self, id: &UserId, is_admin: bool) -> Result<()> {
        let result = sqlx::query("UPDATE users SET is_admin = $1, updated_at = $2 WHERE id = $3")
            .bind(is_admin)
            .bind(Utc::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| ServiceError::database(err, "failed to update admin flag"))?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("user", id.as_str()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_demote_admin")]
    async fn demote_admin(&self, id: &UserId) -> Result<bool> {
        // Single statement so a concurrent demotion cannot slip between the
        // admin count and the write.
        let result = sqlx::query(
            "UPDATE users SET is_admin = FALSE, updated_at = $1
             WHERE id = $2 AND is_admin = TRUE
               AND (SELECT COUNT(*) FROM users WHERE is_admin = TRUE) > 1",
        )
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to demote admin"))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_delete_user")]
    async fn delete(&self, id: &UserId) -> Result<()> {
        // The association rows cascade via the foreign key, but sqlite only
        // honours that with foreign_keys on; delete them explicitly.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| ServiceError::database(err, "failed to begin delete transaction"))?;

        sqlx::query("DELETE FROM user_intersections WHERE user_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|err| ServiceError::database(err, "failed to delete associations"))?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|err| ServiceError::database(err, "failed to delete user"))?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("user", id.as_str()));
        }

        tx.commit()
            .await
            .map_err(|err| ServiceError::database(err, "failed to commit delete transaction"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_get_intersection_ids")]
    async fn intersection_ids(&self, id: &UserId) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT intersection_id FROM user_intersections
             WHERE user_id = $1 ORDER BY intersection_id",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to fetch intersection ids"))
    }

    #[instrument(skip(self), fields(user_id = %id, intersection_id), name = "db_add_intersection_id")]
    async fn add_intersection_id(&self, id: &UserId, intersection_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_intersections (user_id, intersection_id)
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id.as_str())
        .bind(intersection_id)
        .execute(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to add intersection id"))?;
        Ok(())
    }

    #[instrument(skip(self, intersection_ids), fields(user_id = %id), name = "db_remove_intersection_ids")]
    async fn remove_intersection_ids(
        &self,
        id: &UserId,
        intersection_ids: &[String],
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| ServiceError::database(err, "failed to begin remove transaction"))?;

        for intersection_id in intersection_ids {
            sqlx::query(
                "DELETE FROM user_intersections WHERE user_id = $1 AND intersection_id = $2",
            )
            .bind(id.as_str())
            .bind(intersection_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| ServiceError::database(err, "failed to remove intersection id"))?;
        }

        tx.commit()
            .await
            .map_err(|err| ServiceError::database(err, "failed to commit remove transaction"))?;
        Ok(())
    }
}
