//! Intersection domain service.
//!
//! Owns the optimisation lifecycle. The status machine is driven entirely by
//! the external engine through `PutOptimisation`: a call against a settled
//! status starts a run, and a call against `optimising` completes it, with
//! the parameter set's `optimisation_type` distinguishing success from
//! failure.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{
    Intersection, IntersectionId, IntersectionStatus, NewIntersection, OptimisationParameters,
    OptimisationType, OptimisationUpdate,
};
use crate::errors::{Result, ServiceError};
use crate::services::validation::{
    parse_id_filter, validate, CreateIntersectionInput, IntersectionIdInput, PageInput,
    PutOptimisationInput, UpdateIntersectionInput,
};
use crate::storage::repositories::IntersectionRepository;

/// Outcome of a `PutOptimisation` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisationOutcome {
    pub improved: bool,
}

#[derive(Clone)]
pub struct IntersectionService {
    repo: Arc<dyn IntersectionRepository>,
}

impl IntersectionService {
    pub fn new(repo: Arc<dyn IntersectionRepository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateIntersectionInput) -> Result<Intersection> {
        validate(&input)?;

        let intersection = self
            .repo
            .create(NewIntersection {
                id: IntersectionId::new(),
                name: input.name.trim().to_string(),
                details: input.details.into(),
                traffic_density: input.traffic_density,
                default_parameters: input.default_parameters.into(),
            })
            .await?;

        info!(intersection_id = %intersection.id, "intersection created");
        Ok(intersection)
    }

    #[instrument(skip(self, input), fields(intersection_id = %input.id))]
    pub async fn get(&self, input: IntersectionIdInput) -> Result<Intersection> {
        validate(&input)?;
        let id = IntersectionId::from_string(input.id.clone());
        self.repo
            .get_by_id(&id)
            .await?
            .ok_or_else(|| ServiceError::not_found("intersection", input.id))
    }

    /// Paged listing in stable id order. The filter is a comma-separated list
    /// of ids; empty matches all.
    #[instrument(skip(self, input), fields(page = input.page, page_size = input.page_size))]
    pub async fn list(&self, input: PageInput) -> Result<Vec<Intersection>> {
        validate(&input)?;
        let ids = parse_id_filter(&input.filter);
        self.repo.list(input.limit(), input.offset(), &ids).await
    }

    #[instrument(skip(self, input), fields(intersection_id = %input.id))]
    pub async fn update(&self, input: UpdateIntersectionInput) -> Result<Intersection> {
        validate(&input)?;
        let id = IntersectionId::from_string(input.id);
        self.repo.update_details(&id, input.name.trim(), &input.details.into()).await
    }

    #[instrument(skip(self, input), fields(intersection_id = %input.id))]
    pub async fn delete(&self, input: IntersectionIdInput) -> Result<()> {
        validate(&input)?;
        let id = IntersectionId::from_string(input.id);
        self.repo.delete(&id).await?;
        info!(intersection_id = %id, "intersection deleted");
        Ok(())
    }

    /// Apply an optimisation step from the engine.
    ///
    /// The read-modify-write runs as a compare-and-set on the stored status;
    /// a lost race is retried once against the fresh state, then surfaced as
    /// an internal error.
    #[instrument(skip(self, input), fields(intersection_id = %input.id))]
    pub async fn put_optimisation(
        &self,
        input: PutOptimisationInput,
    ) -> Result<OptimisationOutcome> {
        validate(&input)?;
        let id = IntersectionId::from_string(input.id.clone());
        let params: OptimisationParameters = input.parameters.into();

        for attempt in 0..2 {
            let intersection = self
                .repo
                .get_by_id(&id)
                .await?
                .ok_or_else(|| ServiceError::not_found("intersection", input.id.clone()))?;

            let (update, improved) = plan_transition(intersection.status, params);
            let next = update.status;

            if self.repo.apply_optimisation(&id, intersection.status, update).await? {
                info!(
                    intersection_id = %id,
                    from = %intersection.status,
                    to = %next,
                    improved,
                    "optimisation state applied"
                );
                return Ok(OptimisationOutcome { improved });
            }

            warn!(intersection_id = %id, attempt, "optimisation update lost a concurrent race");
        }

        Err(ServiceError::internal("concurrent optimisation updates exhausted retries"))
    }
}

/// Decide the next status from the stored one and the submitted parameters.
///
/// A settled intersection (unoptimised, optimised or failed) starts a new run.
/// An optimising one completes: a real `optimisation_type` records an
/// improvement, `none` records a failed run.
fn plan_transition(
    status: IntersectionStatus,
    params: OptimisationParameters,
) -> (OptimisationUpdate, bool) {
    match status {
        IntersectionStatus::Unoptimised
        | IntersectionStatus::Optimised
        | IntersectionStatus::Failed => (
            OptimisationUpdate {
                status: IntersectionStatus::Optimising,
                current_parameters: params,
                best_parameters: None,
                run_completed: false,
            },
            false,
        ),
        IntersectionStatus::Optimising => {
            if params.optimisation_type == OptimisationType::None {
                (
                    OptimisationUpdate {
                        status: IntersectionStatus::Failed,
                        current_parameters: params,
                        best_parameters: None,
                        run_completed: true,
                    },
                    false,
                )
            } else {
                (
                    OptimisationUpdate {
                        status: IntersectionStatus::Optimised,
                        current_parameters: params,
                        best_parameters: Some(params),
                        run_completed: true,
                    },
                    true,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IntersectionType, TrafficDensity};
    use crate::services::validation::{
        IntersectionDetailsInput, OptimisationParametersInput, SimulationParametersInput,
    };
    use crate::storage::repositories::InMemoryIntersectionRepository;

    fn service() -> IntersectionService {
        IntersectionService::new(Arc::new(InMemoryIntersectionRepository::new()))
    }

    fn params_input(optimisation_type: OptimisationType) -> OptimisationParametersInput {
        OptimisationParametersInput {
            optimisation_type,
            parameters: SimulationParametersInput {
                intersection_type: IntersectionType::TrafficLight,
                green: 10,
                yellow: 3,
                red: 7,
                speed: 60,
                seed: 42,
            },
        }
    }

    fn create_input(name: &str) -> CreateIntersectionInput {
        CreateIntersectionInput {
            name: name.to_string(),
            details: IntersectionDetailsInput {
                address: "1 Main Rd".to_string(),
                city: "Pretoria".to_string(),
                province: "Gauteng".to_string(),
            },
            traffic_density: TrafficDensity::High,
            default_parameters: params_input(OptimisationType::None),
        }
    }

    #[tokio::test]
    async fn create_initialises_lifecycle_state() {
        let service = service();
        let created = service.create(create_input("Main & 1st")).await.unwrap();

        assert_eq!(created.status, IntersectionStatus::Unoptimised);
        assert_eq!(created.run_count, 0);
        assert_eq!(created.best_parameters, created.default_parameters);
        assert_eq!(created.current_parameters, created.default_parameters);
    }

    #[tokio::test]
    async fn create_rejects_out_of_bounds_parameters() {
        let service = service();
        let mut input = create_input("Bad");
        input.default_parameters.parameters.green = 0;
        input.default_parameters.parameters.speed = 201;

        let err = service.create(input).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn full_optimisation_cycle() {
        let service = service();
        let created = service.create(create_input("Cycle")).await.unwrap();
        let id = created.id.as_str().to_string();

        // First call starts a run.
        let outcome = service
            .put_optimisation(PutOptimisationInput {
                id: id.clone(),
                parameters: params_input(OptimisationType::Gridsearch),
            })
            .await
            .unwrap();
        assert!(!outcome.improved);

        let mid = service.get(IntersectionIdInput { id: id.clone() }).await.unwrap();
        assert_eq!(mid.status, IntersectionStatus::Optimising);
        assert_eq!(mid.run_count, 0);
        assert_eq!(mid.current_parameters.optimisation_type, OptimisationType::Gridsearch);

        // Second call completes it with an improvement.
        let mut better = params_input(OptimisationType::Gridsearch);
        better.parameters.green = 15;
        let outcome = service
            .put_optimisation(PutOptimisationInput { id: id.clone(), parameters: better })
            .await
            .unwrap();
        assert!(outcome.improved);

        let done = service.get(IntersectionIdInput { id }).await.unwrap();
        assert_eq!(done.status, IntersectionStatus::Optimised);
        assert_eq!(done.run_count, 1);
        assert_eq!(done.best_parameters.parameters.green, 15);
        assert_eq!(done.current_parameters.parameters.green, 15);
        assert!((chrono::Utc::now() - done.last_run_at).num_seconds() < 5);
    }

    #[tokio::test]
    async fn run_with_no_strategy_fails_the_intersection() {
        let service = service();
        let created = service.create(create_input("Failing")).await.unwrap();
        let id = created.id.as_str().to_string();

        service
            .put_optimisation(PutOptimisationInput {
                id: id.clone(),
                parameters: params_input(OptimisationType::GeneticEvaluation),
            })
            .await
            .unwrap();

        let outcome = service
            .put_optimisation(PutOptimisationInput {
                id: id.clone(),
                parameters: params_input(OptimisationType::None),
            })
            .await
            .unwrap();
        assert!(!outcome.improved);

        let failed = service.get(IntersectionIdInput { id: id.clone() }).await.unwrap();
        assert_eq!(failed.status, IntersectionStatus::Failed);
        assert_eq!(failed.run_count, 1);
        // Best parameters are untouched by a failed run.
        assert_eq!(failed.best_parameters, created.default_parameters);

        // A failed intersection can start a fresh run.
        service
            .put_optimisation(PutOptimisationInput {
                id: id.clone(),
                parameters: params_input(OptimisationType::Gridsearch),
            })
            .await
            .unwrap();
        let retried = service.get(IntersectionIdInput { id }).await.unwrap();
        assert_eq!(retried.status, IntersectionStatus::Optimising);
    }

    #[tokio::test]
    async fn put_optimisation_on_missing_intersection_is_not_found() {
        let service = service();
        let err = service
            .put_optimisation(PutOptimisationInput {
                id: uuid::Uuid::new_v4().to_string(),
                parameters: params_input(OptimisationType::Gridsearch),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_comma_separated_ids() {
        let service = service();
        let a = service.create(create_input("Alpha")).await.unwrap();
        let b = service.create(create_input("Beta")).await.unwrap();

        let all = service
            .list(PageInput { page: 1, page_size: 10, filter: String::new() })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let filter = format!(" {} , missing ,", a.id.as_str());
        let filtered =
            service.list(PageInput { page: 1, page_size: 10, filter }).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, a.id);
        let _ = b;
    }

    #[tokio::test]
    async fn update_touches_only_descriptive_fields() {
        let service = service();
        let created = service.create(create_input("Before")).await.unwrap();

        let updated = service
            .update(UpdateIntersectionInput {
                id: created.id.as_str().to_string(),
                name: "After".to_string(),
                details: IntersectionDetailsInput {
                    address: "9 New St".to_string(),
                    city: "Durban".to_string(),
                    province: "KwaZulu-Natal".to_string(),
                },
            })
            .await
            .unwrap();

        assert_eq!(updated.name, "After");
        assert_eq!(updated.details.city, "Durban");
        assert_eq!(updated.status, created.status);
        assert_eq!(updated.current_parameters, created.current_parameters);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let service = service();
        let created = service.create(create_input("Gone")).await.unwrap();
        let id = created.id.as_str().to_string();

        service.delete(IntersectionIdInput { id: id.clone() }).await.unwrap();
        let err = service.get(IntersectionIdInput { id }).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn transition_table() {
        let params = OptimisationParameters::from(params_input(OptimisationType::Gridsearch));
        let none = OptimisationParameters::from(params_input(OptimisationType::None));

        for settled in [
            IntersectionStatus::Unoptimised,
            IntersectionStatus::Optimised,
            IntersectionStatus::Failed,
        ] {
            let (update, improved) = plan_transition(settled, params);
            assert_eq!(update.status, IntersectionStatus::Optimising);
            assert!(!update.run_completed);
            assert!(!improved);
        }

        let (update, improved) = plan_transition(IntersectionStatus::Optimising, params);
        assert_eq!(update.status, IntersectionStatus::Optimised);
        assert!(update.run_completed);
        assert!(improved);

        let (update, improved) = plan_transition(IntersectionStatus::Optimising, none);
        assert_eq!(update.status, IntersectionStatus::Failed);
        assert!(update.run_completed);
        assert!(!improved);
    }
}
