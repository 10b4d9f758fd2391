//! Intersection domain model: status lifecycle, traffic density and the
//! three co-existing optimisation parameter sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::IntersectionId;

/// Lifecycle status of an intersection's optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntersectionStatus {
    Unoptimised,
    Optimising,
    Optimised,
    Failed,
}

impl std::str::FromStr for IntersectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unoptimised" => Ok(Self::Unoptimised),
            "optimising" => Ok(Self::Optimising),
            "optimised" => Ok(Self::Optimised),
            "failed" => Ok(Self::Failed),
            other => Err(format!("invalid intersection status: {other}")),
        }
    }
}

impl std::fmt::Display for IntersectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unoptimised => "unoptimised",
            Self::Optimising => "optimising",
            Self::Optimised => "optimised",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Expected traffic load used to seed simulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficDensity {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for TrafficDensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("invalid traffic density: {other}")),
        }
    }
}

impl std::fmt::Display for TrafficDensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{name}")
    }
}

/// Search strategy the optimisation engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimisationType {
    None,
    Gridsearch,
    GeneticEvaluation,
}

/// The physical layout being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntersectionType {
    TrafficLight,
    TJunction,
    Roundabout,
    StopSign,
}

/// Per-signal timings consumed by the simulation engine.
///
/// Bounds: `green`, `yellow`, `red` are positive seconds; `speed` is a
/// positive limit capped at 200; `seed` is unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub intersection_type: IntersectionType,
    pub green: i32,
    pub yellow: i32,
    pub red: i32,
    pub speed: i32,
    pub seed: i32,
}

/// A bundle handed to the optimisation engine: strategy plus timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisationParameters {
    pub optimisation_type: OptimisationType,
    pub parameters: SimulationParameters,
}

/// Nested address information for an intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionDetails {
    pub address: String,
    pub city: String,
    pub province: String,
}

/// A physical junction under simulation and optimisation control.
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    pub id: IntersectionId,
    pub name: String,
    pub details: IntersectionDetails,
    pub created_at: DateTime<Utc>,
    pub last_run_at: DateTime<Utc>,
    pub status: IntersectionStatus,
    pub run_count: i32,
    pub traffic_density: TrafficDensity,
    /// Immutable baseline set at creation.
    pub default_parameters: OptimisationParameters,
    /// Best-scoring parameters observed so far.
    pub best_parameters: OptimisationParameters,
    /// Parameters the active run is using.
    pub current_parameters: OptimisationParameters,
}

/// Payload for inserting a new intersection.
#[derive(Debug, Clone)]
pub struct NewIntersection {
    pub id: IntersectionId,
    pub name: String,
    pub details: IntersectionDetails,
    pub traffic_density: TrafficDensity,
    pub default_parameters: OptimisationParameters,
}

/// State written by a `PutOptimisation` call. Applied atomically by the
/// repository against the status the service observed.
#[derive(Debug, Clone)]
pub struct OptimisationUpdate {
    pub status: IntersectionStatus,
    pub current_parameters: OptimisationParameters,
    /// Set when a run completed with an improvement.
    pub best_parameters: Option<OptimisationParameters>,
    /// Set when a run completed (success or failure): bumps `run_count` and
    /// stamps `last_run_at`.
    pub run_completed: bool,
}
