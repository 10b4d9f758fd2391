//! Domain models shared across the service, storage and RPC layers.

mod id;
mod intersection;
mod user;

pub use id::{IntersectionId, UserId};
pub use intersection::{
    Intersection, IntersectionDetails, IntersectionStatus, IntersectionType, NewIntersection,
    OptimisationParameters, OptimisationType, OptimisationUpdate, SimulationParameters,
    TrafficDensity,
};
pub use user::{NewUser, Role, User};
