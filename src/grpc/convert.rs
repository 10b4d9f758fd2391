//! Conversions between domain types and the generated wire types.
//!
//! Enum ordinals arriving as `UNSPECIFIED` are validation errors; the domain
//! enums have no such state. Timestamps cross the boundary as
//! `prost_types::Timestamp`.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::domain::{
    Intersection, IntersectionDetails, IntersectionStatus, IntersectionType,
    OptimisationParameters, OptimisationType, SimulationParameters, TrafficDensity, User,
};
use crate::errors::{Result, ServiceError};
use crate::grpc::{intersection_proto, user_proto};

pub fn to_timestamp(value: DateTime<Utc>) -> Timestamp {
    Timestamp { seconds: value.timestamp(), nanos: value.timestamp_subsec_nanos() as i32 }
}

pub fn user_response(user: User) -> user_proto::UserResponse {
    user_proto::UserResponse {
        id: user.id.into_string(),
        name: user.name,
        email: user.email,
        is_admin: user.is_admin,
        intersection_ids: user.intersection_ids,
        created_at: Some(to_timestamp(user.created_at)),
        updated_at: Some(to_timestamp(user.updated_at)),
    }
}

pub fn status_to_proto(status: IntersectionStatus) -> intersection_proto::IntersectionStatus {
    match status {
        IntersectionStatus::Unoptimised => intersection_proto::IntersectionStatus::Unoptimised,
        IntersectionStatus::Optimising => intersection_proto::IntersectionStatus::Optimising,
        IntersectionStatus::Optimised => intersection_proto::IntersectionStatus::Optimised,
        IntersectionStatus::Failed => intersection_proto::IntersectionStatus::Failed,
    }
}

pub fn density_to_proto(density: TrafficDensity) -> intersection_proto::TrafficDensity {
    match density {
        TrafficDensity::Low => intersection_proto::TrafficDensity::Low,
        TrafficDensity::Medium => intersection_proto::TrafficDensity::Medium,
        TrafficDensity::High => intersection_proto::TrafficDensity::High,
    }
}

pub fn density_from_proto(ordinal: i32) -> Result<TrafficDensity> {
    match intersection_proto::TrafficDensity::try_from(ordinal) {
        Ok(intersection_proto::TrafficDensity::Low) => Ok(TrafficDensity::Low),
        Ok(intersection_proto::TrafficDensity::Medium) => Ok(TrafficDensity::Medium),
        Ok(intersection_proto::TrafficDensity::High) => Ok(TrafficDensity::High),
        _ => Err(ServiceError::validation("traffic_density is required")),
    }
}

pub fn optimisation_type_to_proto(
    value: OptimisationType,
) -> intersection_proto::OptimisationType {
    match value {
        OptimisationType::None => intersection_proto::OptimisationType::None,
        OptimisationType::Gridsearch => intersection_proto::OptimisationType::Gridsearch,
        OptimisationType::GeneticEvaluation => {
            intersection_proto::OptimisationType::GeneticEvaluation
        }
    }
}

pub fn optimisation_type_from_proto(ordinal: i32) -> Result<OptimisationType> {
    match intersection_proto::OptimisationType::try_from(ordinal) {
        Ok(intersection_proto::OptimisationType::None) => Ok(OptimisationType::None),
        Ok(intersection_proto::OptimisationType::Gridsearch) => Ok(OptimisationType::Gridsearch),
        Ok(intersection_proto::OptimisationType::GeneticEvaluation) => {
            Ok(OptimisationType::GeneticEvaluation)
        }
        Err(_) => Err(ServiceError::validation("optimisation_type is invalid")),
    }
}

pub fn intersection_type_to_proto(
    value: IntersectionType,
) -> intersection_proto::IntersectionType {
    match value {
        IntersectionType::TrafficLight => intersection_proto::IntersectionType::Trafficlight,
        IntersectionType::TJunction => intersection_proto::IntersectionType::Tjunction,
        IntersectionType::Roundabout => intersection_proto::IntersectionType::Roundabout,
        IntersectionType::StopSign => intersection_proto::IntersectionType::StopSign,
    }
}

pub fn intersection_type_from_proto(ordinal: i32) -> Result<IntersectionType> {
    match intersection_proto::IntersectionType::try_from(ordinal) {
        Ok(intersection_proto::IntersectionType::Trafficlight) => Ok(IntersectionType::TrafficLight),
        Ok(intersection_proto::IntersectionType::Tjunction) => Ok(IntersectionType::TJunction),
        Ok(intersection_proto::IntersectionType::Roundabout) => Ok(IntersectionType::Roundabout),
        Ok(intersection_proto::IntersectionType::StopSign) => Ok(IntersectionType::StopSign),
        _ => Err(ServiceError::validation("intersection_type is required")),
    }
}

pub fn parameters_to_proto(
    params: OptimisationParameters,
) -> intersection_proto::OptimisationParameters {
    intersection_proto::OptimisationParameters {
        optimisation_type: optimisation_type_to_proto(params.optimisation_type) as i32,
        parameters: Some(intersection_proto::SimulationParameters {
            intersection_type: intersection_type_to_proto(params.parameters.intersection_type)
                as i32,
            green: params.parameters.green,
            yellow: params.parameters.yellow,
            red: params.parameters.red,
            speed: params.parameters.speed,
            seed: params.parameters.seed,
        }),
    }
}

pub fn parameters_from_proto(
    params: Option<intersection_proto::OptimisationParameters>,
) -> Result<OptimisationParameters> {
    let params = params.ok_or_else(|| ServiceError::validation("parameters are required"))?;
    let simulation = params
        .parameters
        .ok_or_else(|| ServiceError::validation("simulation parameters are required"))?;

    Ok(OptimisationParameters {
        optimisation_type: optimisation_type_from_proto(params.optimisation_type)?,
        parameters: SimulationParameters {
            intersection_type: intersection_type_from_proto(simulation.intersection_type)?,
            green: simulation.green,
            yellow: simulation.yellow,
            red: simulation.red,
            speed: simulation.speed,
            seed: simulation.seed,
        },
    })
}

pub fn details_from_proto(
    details: Option<intersection_proto::IntersectionDetails>,
) -> Result<IntersectionDetails> {
    let details = details.ok_or_else(|| ServiceError::validation("details are required"))?;
    Ok(IntersectionDetails { address: details.address, city: details.city, province: details.province })
}

pub fn intersection_response(
    intersection: Intersection,
) -> intersection_proto::IntersectionResponse {
    intersection_proto::IntersectionResponse {
        id: intersection.id.into_string(),
        name: intersection.name,
        details: Some(intersection_proto::IntersectionDetails {
            address: intersection.details.address,
            city: intersection.details.city,
            province: intersection.details.province,
        }),
        created_at: Some(to_timestamp(intersection.created_at)),
        last_run_at: Some(to_timestamp(intersection.last_run_at)),
        status: status_to_proto(intersection.status) as i32,
        run_count: intersection.run_count,
        traffic_density: density_to_proto(intersection.traffic_density) as i32,
        default_parameters: Some(parameters_to_proto(intersection.default_parameters)),
        best_parameters: Some(parameters_to_proto(intersection.best_parameters)),
        current_parameters: Some(parameters_to_proto(intersection.current_parameters)),
    }
}
