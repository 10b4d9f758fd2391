//! Intersection repository. Parameter sets are stored as JSON documents in
//! TEXT columns; status transitions go through a compare-and-set so two
//! concurrent optimisation submissions cannot both observe the same state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::{
    Intersection, IntersectionDetails, IntersectionId, IntersectionStatus, NewIntersection,
    OptimisationParameters, OptimisationUpdate,
};
use crate::errors::{Result, ServiceError};
use crate::storage::DbPool;

#[derive(Debug, Clone, FromRow)]
struct IntersectionRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub created_at: DateTime<Utc>,
    pub last_run_at: DateTime<Utc>,
    pub status: String,
    pub run_count: i32,
    pub traffic_density: String,
    pub default_parameters: String,
    pub best_parameters: String,
    pub current_parameters: String,
}

/// Storage contract for intersection records.
#[async_trait]
pub trait IntersectionRepository: Send + Sync {
    /// Insert a new intersection. Status starts `unoptimised` and all three
    /// parameter sets start equal to the defaults.
    async fn create(&self, intersection: NewIntersection) -> Result<Intersection>;

    /// Fetch an intersection by id.
    async fn get_by_id(&self, id: &IntersectionId) -> Result<Option<Intersection>>;

    /// List intersections in stable id order. A non-empty `ids` restricts the
    /// page to that set; unknown ids are silently skipped.
    async fn list(&self, limit: i64, offset: i64, ids: &[String]) -> Result<Vec<Intersection>>;

    /// Update name and address details. Optimisation state is untouched.
    async fn update_details(
        &self,
        id: &IntersectionId,
        name: &str,
        details: &IntersectionDetails,
    ) -> Result<Intersection>;

    /// Hard-delete an intersection.
    async fn delete(&self, id: &IntersectionId) -> Result<()>;

    /// Apply an optimisation state transition only if the stored status still
    /// equals `expected`. Returns `false` when the guard failed, so the
    /// caller can re-read and retry.
    async fn apply_optimisation(
        &self,
        id: &IntersectionId,
        expected: IntersectionStatus,
        update: OptimisationUpdate,
    ) -> Result<bool>;
}

/// SQLx-backed implementation.
#[derive(Debug, Clone)]
pub struct SqlxIntersectionRepository {
    pool: DbPool,
}

impl SqlxIntersectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const INTERSECTION_COLUMNS: &str = "id, name, address, city, province, created_at, last_run_at, \
     status, run_count, traffic_density, default_parameters, best_parameters, current_parameters";

fn encode_parameters(params: &OptimisationParameters) -> Result<String> {
    serde_json::to_string(params).map_err(|err| {
        ServiceError::internal_with_source("failed to encode parameters", Box::new(err))
    })
}

fn decode_parameters(json: &str, column: &str) -> Result<OptimisationParameters> {
    serde_json::from_str(json).map_err(|err| {
        ServiceError::internal_with_source(
            format!("corrupt {column} document in intersection row"),
            Box::new(err),
        )
    })
}

fn row_to_intersection(row: IntersectionRow) -> Result<Intersection> {
    let status = row
        .status
        .parse()
        .map_err(|err: String| ServiceError::internal(format!("corrupt intersection row: {err}")))?;
    let traffic_density = row
        .traffic_density
        .parse()
        .map_err(|err: String| ServiceError::internal(format!("corrupt intersection row: {err}")))?;

    Ok(Intersection {
        id: IntersectionId::from_string(row.id),
        name: row.name,
        details: IntersectionDetails {
            address: row.address,
            city: row.city,
            province: row.province,
        },
        created_at: row.created_at,
        last_run_at: row.last_run_at,
        status,
        run_count: row.run_count,
        traffic_density,
        default_parameters: decode_parameters(&row.default_parameters, "default_parameters")?,
        best_parameters: decode_parameters(&row.best_parameters, "best_parameters")?,
        current_parameters: decode_parameters(&row.current_parameters, "current_parameters")?,
    })
}

#[async_trait]
impl IntersectionRepository for SqlxIntersectionRepository {
    #[instrument(skip(self, intersection), fields(intersection_id = %intersection.id), name = "db_create_intersection")]
    async fn create(&self, intersection: NewIntersection) -> Result<Intersection> {
        let now = Utc::now();
        let defaults = encode_parameters(&intersection.default_parameters)?;

        sqlx::query(
            "INSERT INTO intersections
                 (id, name, address, city, province, created_at, last_run_at, status,
                  run_count, traffic_density, default_parameters, best_parameters,
                  current_parameters)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10, $10, $10)",
        )
        .bind(intersection.id.as_str())
        .bind(&intersection.name)
        .bind(&intersection.details.address)
        .bind(&intersection.details.city)
        .bind(&intersection.details.province)
        .bind(now)
        .bind(now)
        .bind(IntersectionStatus::Unoptimised.to_string())
        .bind(intersection.traffic_density.to_string())
        .bind(&defaults)
        .execute(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to create intersection"))?;

        self.get_by_id(&intersection.id)
            .await?
            .ok_or_else(|| ServiceError::internal("intersection not found after creation"))
    }

    #[instrument(skip(self), fields(intersection_id = %id), name = "db_get_intersection")]
    async fn get_by_id(&self, id: &IntersectionId) -> Result<Option<Intersection>> {
        let row = sqlx::query_as::<_, IntersectionRow>(&format!(
            "SELECT {INTERSECTION_COLUMNS} FROM intersections WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to fetch intersection"))?;

        row.map(row_to_intersection).transpose()
    }

    #[instrument(skip(self, ids), fields(limit, offset, id_filter = ids.len()), name = "db_list_intersections")]
    async fn list(&self, limit: i64, offset: i64, ids: &[String]) -> Result<Vec<Intersection>> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {INTERSECTION_COLUMNS} FROM intersections"
        ));

        if !ids.is_empty() {
            builder.push(" WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
            builder.push(")");
        }

        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<IntersectionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| ServiceError::database(err, "failed to list intersections"))?;

        rows.into_iter().map(row_to_intersection).collect()
    }

    #[instrument(skip(self, details), fields(intersection_id = %id), name = "db_update_intersection")]
    async fn update_details(
        &self,
        id: &IntersectionId,
        name: &str,
        details: &IntersectionDetails,
    ) -> Result<Intersection> {
        let result = sqlx::query(
            "UPDATE intersections SET name = $1, address = $2, city = $3, province = $4
             WHERE id = $5",
        )
        .bind(name)
        .bind(&details.address)
        .bind(&details.city)
        .bind(&details.province)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to update intersection"))?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("intersection", id.as_str()));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::internal("intersection not found after update"))
    }

    #[instrument(skip(self), fields(intersection_id = %id), name = "db_delete_intersection")]
    async fn delete(&self, id: &IntersectionId) -> Result<()> {
        let result = sqlx::query("DELETE FROM intersections WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| ServiceError::database(err, "failed to delete intersection"))?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("intersection", id.as_str()));
        }
        Ok(())
    }

    #[instrument(
        skip(self, update),
        fields(intersection_id = %id, expected = %expected, next = %update.status),
        name = "db_apply_optimisation"
    )]
    async fn apply_optimisation(
        &self,
        id: &IntersectionId,
        expected: IntersectionStatus,
        update: OptimisationUpdate,
    ) -> Result<bool> {
        let current = encode_parameters(&update.current_parameters)?;
        let best = update.best_parameters.as_ref().map(encode_parameters).transpose()?;

        // The status guard in the WHERE clause makes this a CAS; a lost race
        // reports zero rows affected rather than clobbering the other writer.
        let result = sqlx::query(
            "UPDATE intersections SET
                 status = $1,
                 current_parameters = $2,
                 best_parameters = COALESCE($3, best_parameters),
                 run_count = run_count + CASE WHEN $4 THEN 1 ELSE 0 END,
                 last_run_at = CASE WHEN $4 THEN $5 ELSE last_run_at END
             WHERE id = $6 AND status = $7",
        )
        .bind(update.status.to_string())
        .bind(&current)
        .bind(best.as_deref())
        .bind(update.run_completed)
        .bind(Utc::now())
        .bind(id.as_str())
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to apply optimisation update"))?;

        Ok(result.rows_affected() == 1)
    }
}
