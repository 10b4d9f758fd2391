//! End-to-end tests for the intersection service, including the optimisation
//! lifecycle over the wire and client deadline behaviour.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_stream::StreamExt;
use tonic::Code;

use swift_signals::clients::IntersectionClient;
use swift_signals::domain::{
    Intersection, IntersectionDetails, IntersectionId, IntersectionStatus, NewIntersection,
    OptimisationUpdate,
};
use swift_signals::errors::Result;
use swift_signals::grpc::intersection_proto::{
    CreateIntersectionRequest, GetAllIntersectionsRequest, IntersectionDetails as WireDetails,
    IntersectionStatus as WireStatus, OptimisationParameters as WireParameters, OptimisationType,
    PutOptimisationRequest, SimulationParameters as WireSimulation, TrafficDensity,
    UpdateIntersectionRequest,
};
use swift_signals::storage::repositories::IntersectionRepository;

use common::{start_intersection_service, start_intersection_service_with};

fn wire_parameters(optimisation_type: OptimisationType, green: i32) -> WireParameters {
    WireParameters {
        optimisation_type: optimisation_type as i32,
        parameters: Some(WireSimulation {
            intersection_type:
                swift_signals::grpc::intersection_proto::IntersectionType::Trafficlight as i32,
            green,
            yellow: 3,
            red: 7,
            speed: 60,
            seed: 42,
        }),
    }
}

fn create_request(name: &str) -> CreateIntersectionRequest {
    CreateIntersectionRequest {
        name: name.to_string(),
        details: Some(WireDetails {
            address: "1 Main Rd".to_string(),
            city: "Pretoria".to_string(),
            province: "Gauteng".to_string(),
        }),
        traffic_density: TrafficDensity::High as i32,
        default_parameters: Some(wire_parameters(OptimisationType::None, 10)),
    }
}

#[tokio::test]
async fn lifecycle_over_the_wire() {
    let channel = start_intersection_service().await;
    let mut client = IntersectionClient::from_channel(channel);

    let created = client.create_intersection(create_request("Main & 1st")).await.unwrap();
    assert_eq!(created.status, WireStatus::Unoptimised as i32);
    assert_eq!(created.run_count, 0);
    assert_eq!(created.default_parameters, created.best_parameters);
    assert_eq!(created.default_parameters, created.current_parameters);

    // First submission starts a run.
    let ack = client
        .put_optimisation(PutOptimisationRequest {
            id: created.id.clone(),
            parameters: Some(wire_parameters(OptimisationType::Gridsearch, 12)),
        })
        .await
        .unwrap();
    assert!(!ack.improved);

    let mid = client.get_intersection(created.id.clone()).await.unwrap();
    assert_eq!(mid.status, WireStatus::Optimising as i32);
    assert_eq!(mid.current_parameters.unwrap().parameters.unwrap().green, 12);

    // Second submission completes it with an improvement.
    let ack = client
        .put_optimisation(PutOptimisationRequest {
            id: created.id.clone(),
            parameters: Some(wire_parameters(OptimisationType::Gridsearch, 15)),
        })
        .await
        .unwrap();
    assert!(ack.improved);

    let done = client.get_intersection(created.id.clone()).await.unwrap();
    assert_eq!(done.status, WireStatus::Optimised as i32);
    assert_eq!(done.run_count, 1);
    assert_eq!(done.best_parameters.unwrap().parameters.unwrap().green, 15);
}

#[tokio::test]
async fn invalid_simulation_bounds_are_invalid_argument() {
    let channel = start_intersection_service().await;
    let mut client = IntersectionClient::from_channel(channel);

    let mut request = create_request("Bad");
    request.default_parameters = Some(wire_parameters(OptimisationType::None, 0));
    let status = client.create_intersection(request).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn missing_intersection_is_not_found() {
    let channel = start_intersection_service().await;
    let mut client = IntersectionClient::from_channel(channel);

    let status =
        client.get_intersection(uuid::Uuid::new_v4().to_string()).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "intersection not found");
}

#[tokio::test]
async fn streaming_list_respects_id_filter() {
    let channel = start_intersection_service().await;
    let mut client = IntersectionClient::from_channel(channel);

    let a = client.create_intersection(create_request("Alpha")).await.unwrap();
    let _b = client.create_intersection(create_request("Beta")).await.unwrap();

    let mut stream = client
        .get_all_intersections(GetAllIntersectionsRequest {
            page: 1,
            page_size: 10,
            filter: format!(" {} ,", a.id),
        })
        .await
        .unwrap();

    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.unwrap().id);
    }
    assert_eq!(ids, vec![a.id]);
}

#[tokio::test]
async fn dropping_a_stream_mid_sequence_keeps_the_server_responsive() {
    let channel = start_intersection_service().await;
    let mut client = IntersectionClient::from_channel(channel);

    for name in ["One", "Two", "Three"] {
        client.create_intersection(create_request(name)).await.unwrap();
    }

    let mut stream = client
        .get_all_intersections(GetAllIntersectionsRequest {
            page: 1,
            page_size: 10,
            filter: String::new(),
        })
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    drop(stream);

    // The aborted stream must not wedge the connection; later calls on the
    // same channel still answer.
    let fetched = client.get_intersection(first.id.clone()).await.unwrap();
    assert_eq!(fetched.id, first.id);

    let mut rest = client
        .get_all_intersections(GetAllIntersectionsRequest {
            page: 1,
            page_size: 10,
            filter: String::new(),
        })
        .await
        .unwrap();
    let mut seen = 0;
    while let Some(item) = rest.next().await {
        item.unwrap();
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[tokio::test]
async fn update_is_descriptive_only() {
    let channel = start_intersection_service().await;
    let mut client = IntersectionClient::from_channel(channel);

    let created = client.create_intersection(create_request("Before")).await.unwrap();
    let updated = client
        .update_intersection(UpdateIntersectionRequest {
            id: created.id.clone(),
            name: "After".to_string(),
            details: Some(WireDetails {
                address: "9 New St".to_string(),
                city: "Durban".to_string(),
                province: "KwaZulu-Natal".to_string(),
            }),
        })
        .await
        .unwrap();

    assert_eq!(updated.name, "After");
    assert_eq!(updated.status, created.status);
    assert_eq!(updated.current_parameters, created.current_parameters);
}

/// Repository whose reads hang long enough to trip the client deadline.
struct StalledRepository;

#[async_trait]
impl IntersectionRepository for StalledRepository {
    async fn create(&self, _intersection: NewIntersection) -> Result<Intersection> {
        unimplemented!("not exercised")
    }

    async fn get_by_id(&self, _id: &IntersectionId) -> Result<Option<Intersection>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }

    async fn list(
        &self,
        _limit: i64,
        _offset: i64,
        _ids: &[String],
    ) -> Result<Vec<Intersection>> {
        unimplemented!("not exercised")
    }

    async fn update_details(
        &self,
        _id: &IntersectionId,
        _name: &str,
        _details: &IntersectionDetails,
    ) -> Result<Intersection> {
        unimplemented!("not exercised")
    }

    async fn delete(&self, _id: &IntersectionId) -> Result<()> {
        unimplemented!("not exercised")
    }

    async fn apply_optimisation(
        &self,
        _id: &IntersectionId,
        _expected: IntersectionStatus,
        _update: OptimisationUpdate,
    ) -> Result<bool> {
        unimplemented!("not exercised")
    }
}

#[tokio::test]
async fn client_deadline_cancels_a_stalled_call() {
    let channel = start_intersection_service_with(Arc::new(StalledRepository)).await;
    let mut client = IntersectionClient::from_channel(channel);

    let started = Instant::now();
    let status =
        client.get_intersection(uuid::Uuid::new_v4().to_string()).await.unwrap_err();
    let elapsed = started.elapsed();

    // Depending on which side notices first the cancellation surfaces as
    // DEADLINE_EXCEEDED (client) or CANCELLED (server-enforced grpc-timeout).
    assert!(
        matches!(status.code(), Code::DeadlineExceeded | Code::Cancelled),
        "unexpected status: {status:?}"
    );
    assert!(elapsed > Duration::from_secs(4), "cancelled too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "deadline did not fire: {elapsed:?}");
}
