//! tonic adapter for the intersection service.

use std::pin::Pin;

use futures::Stream;
use tonic::{Request, Response, Status};

use crate::grpc::convert::{
    density_from_proto, details_from_proto, intersection_response, parameters_from_proto,
};
use crate::grpc::intersection_proto::intersection_service_server::IntersectionService as IntersectionServiceHandler;
use crate::grpc::intersection_proto::{
    CreateIntersectionRequest, GetAllIntersectionsRequest, IntersectionIdRequest,
    IntersectionResponse, PutOptimisationRequest, PutOptimisationResponse,
    UpdateIntersectionRequest,
};
use crate::services::validation::{
    CreateIntersectionInput, IntersectionDetailsInput, IntersectionIdInput,
    OptimisationParametersInput, PageInput, PutOptimisationInput, SimulationParametersInput,
    UpdateIntersectionInput,
};
use crate::services::IntersectionService;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

#[derive(Clone)]
pub struct IntersectionGrpcService {
    service: IntersectionService,
}

impl IntersectionGrpcService {
    pub fn new(service: IntersectionService) -> Self {
        Self { service }
    }
}

fn details_input(
    details: Option<crate::grpc::intersection_proto::IntersectionDetails>,
) -> Result<IntersectionDetailsInput, Status> {
    let details = details_from_proto(details)?;
    Ok(IntersectionDetailsInput {
        address: details.address,
        city: details.city,
        province: details.province,
    })
}

fn parameters_input(
    params: Option<crate::grpc::intersection_proto::OptimisationParameters>,
) -> Result<OptimisationParametersInput, Status> {
    let params = parameters_from_proto(params)?;
    Ok(OptimisationParametersInput {
        optimisation_type: params.optimisation_type,
        parameters: SimulationParametersInput {
            intersection_type: params.parameters.intersection_type,
            green: params.parameters.green,
            yellow: params.parameters.yellow,
            red: params.parameters.red,
            speed: params.parameters.speed,
            seed: params.parameters.seed,
        },
    })
}

#[tonic::async_trait]
impl IntersectionServiceHandler for IntersectionGrpcService {
    async fn create_intersection(
        &self,
        request: Request<CreateIntersectionRequest>,
    ) -> Result<Response<IntersectionResponse>, Status> {
        let message = request.into_inner();
        let intersection = self
            .service
            .create(CreateIntersectionInput {
                name: message.name,
                details: details_input(message.details)?,
                traffic_density: density_from_proto(message.traffic_density)?,
                default_parameters: parameters_input(message.default_parameters)?,
            })
            .await?;
        Ok(Response::new(intersection_response(intersection)))
    }

    async fn get_intersection(
        &self,
        request: Request<IntersectionIdRequest>,
    ) -> Result<Response<IntersectionResponse>, Status> {
        let message = request.into_inner();
        let intersection = self.service.get(IntersectionIdInput { id: message.id }).await?;
        Ok(Response::new(intersection_response(intersection)))
    }

    type GetAllIntersectionsStream = ResponseStream<IntersectionResponse>;

    async fn get_all_intersections(
        &self,
        request: Request<GetAllIntersectionsRequest>,
    ) -> Result<Response<Self::GetAllIntersectionsStream>, Status> {
        let message = request.into_inner();
        let intersections = self
            .service
            .list(PageInput {
                page: message.page,
                page_size: message.page_size,
                filter: message.filter,
            })
            .await?;

        let stream = async_stream::stream! {
            for intersection in intersections {
                yield Ok(intersection_response(intersection));
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn update_intersection(
        &self,
        request: Request<UpdateIntersectionRequest>,
    ) -> Result<Response<IntersectionResponse>, Status> {
        let message = request.into_inner();
        let intersection = self
            .service
            .update(UpdateIntersectionInput {
                id: message.id,
                name: message.name,
                details: details_input(message.details)?,
            })
            .await?;
        Ok(Response::new(intersection_response(intersection)))
    }

    async fn delete_intersection(
        &self,
        request: Request<IntersectionIdRequest>,
    ) -> Result<Response<()>, Status> {
        let message = request.into_inner();
        self.service.delete(IntersectionIdInput { id: message.id }).await?;
        Ok(Response::new(()))
    }

    async fn put_optimisation(
        &self,
        request: Request<PutOptimisationRequest>,
    ) -> Result<Response<PutOptimisationResponse>, Status> {
        let message = request.into_inner();
        let outcome = self
            .service
            .put_optimisation(PutOptimisationInput {
                id: message.id,
                parameters: parameters_input(message.parameters)?,
            })
            .await?;
        Ok(Response::new(PutOptimisationResponse { improved: outcome.improved }))
    }
}
