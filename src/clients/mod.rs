//! Typed gRPC clients for gateway use.
//!
//! Every outbound call carries a 5-second deadline; a hung service surfaces
//! as `DEADLINE_EXCEEDED` at the caller instead of an indefinite wait. RPC
//! errors are returned as raw `tonic::Status` so the gateway can forward the
//! wire code unchanged.

use std::time::Duration;

use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::Channel;
use tonic::{Request, Status, Streaming};

use crate::errors::{Result, ServiceError};
use crate::grpc::intersection_proto::intersection_service_client::IntersectionServiceClient;
use crate::grpc::intersection_proto::{
    CreateIntersectionRequest, GetAllIntersectionsRequest, IntersectionIdRequest,
    IntersectionResponse, PutOptimisationRequest, PutOptimisationResponse,
    UpdateIntersectionRequest,
};
use crate::grpc::user_proto::user_service_client::UserServiceClient;
use crate::grpc::user_proto::{
    AddIntersectionIdRequest, AdminRequest, ChangePasswordRequest, GetAllUsersRequest,
    GetUserByEmailRequest, IntersectionIdResponse, LoginUserRequest, LoginUserResponse,
    RegisterUserRequest, RemoveIntersectionIdsRequest, ResetPasswordRequest, UpdateUserRequest,
    UserIdRequest, UserResponse,
};

/// Deadline applied to every outbound call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn connect_error(err: tonic::transport::Error) -> ServiceError {
    ServiceError::External {
        message: "failed to connect to upstream service".to_string(),
        source: Some(Box::new(err)),
    }
}

fn bearer_value(token: &str) -> Result<MetadataValue<Ascii>> {
    format!("Bearer {token}")
        .parse()
        .map_err(|_| ServiceError::validation("bearer token contains invalid characters"))
}

fn deadline_request<T>(message: T, token: Option<&MetadataValue<Ascii>>) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(REQUEST_TIMEOUT);
    if let Some(token) = token {
        request.metadata_mut().insert("authorization", token.clone());
    }
    request
}

/// Client for the user service.
#[derive(Clone)]
pub struct UserClient {
    inner: UserServiceClient<Channel>,
    bearer: Option<MetadataValue<Ascii>>,
}

impl UserClient {
    pub async fn connect(endpoint: String) -> Result<Self> {
        let inner = UserServiceClient::connect(endpoint).await.map_err(connect_error)?;
        Ok(Self { inner, bearer: None })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self { inner: UserServiceClient::new(channel), bearer: None }
    }

    /// Attach a bearer token to every subsequent call.
    pub fn with_bearer_token(mut self, token: &str) -> Result<Self> {
        self.bearer = Some(bearer_value(token)?);
        Ok(self)
    }

    fn request<T>(&self, message: T) -> Request<T> {
        deadline_request(message, self.bearer.as_ref())
    }

    pub async fn register_user(
        &mut self,
        request: RegisterUserRequest,
    ) -> std::result::Result<UserResponse, Status> {
        Ok(self.inner.register_user(self.request(request)).await?.into_inner())
    }

    pub async fn login_user(
        &mut self,
        request: LoginUserRequest,
    ) -> std::result::Result<LoginUserResponse, Status> {
        Ok(self.inner.login_user(self.request(request)).await?.into_inner())
    }

    pub async fn logout_user(&mut self, user_id: String) -> std::result::Result<(), Status> {
        self.inner.logout_user(self.request(UserIdRequest { user_id })).await?;
        Ok(())
    }

    pub async fn get_user_by_id(
        &mut self,
        user_id: String,
    ) -> std::result::Result<UserResponse, Status> {
        Ok(self.inner.get_user_by_id(self.request(UserIdRequest { user_id })).await?.into_inner())
    }

    pub async fn get_user_by_email(
        &mut self,
        email: String,
    ) -> std::result::Result<UserResponse, Status> {
        Ok(self
            .inner
            .get_user_by_email(self.request(GetUserByEmailRequest { email }))
            .await?
            .into_inner())
    }

    pub async fn get_all_users(
        &mut self,
        request: GetAllUsersRequest,
    ) -> std::result::Result<Streaming<UserResponse>, Status> {
        Ok(self.inner.get_all_users(self.request(request)).await?.into_inner())
    }

    pub async fn update_user(
        &mut self,
        request: UpdateUserRequest,
    ) -> std::result::Result<UserResponse, Status> {
        Ok(self.inner.update_user(self.request(request)).await?.into_inner())
    }

    pub async fn delete_user(&mut self, user_id: String) -> std::result::Result<(), Status> {
        self.inner.delete_user(self.request(UserIdRequest { user_id })).await?;
        Ok(())
    }

    pub async fn get_user_intersection_ids(
        &mut self,
        user_id: String,
    ) -> std::result::Result<Streaming<IntersectionIdResponse>, Status> {
        Ok(self
            .inner
            .get_user_intersection_ids(self.request(UserIdRequest { user_id }))
            .await?
            .into_inner())
    }

    pub async fn add_intersection_id(
        &mut self,
        user_id: String,
        intersection_id: String,
    ) -> std::result::Result<(), Status> {
        self.inner
            .add_intersection_id(self.request(AddIntersectionIdRequest {
                user_id,
                intersection_id,
            }))
            .await?;
        Ok(())
    }

    pub async fn remove_intersection_ids(
        &mut self,
        user_id: String,
        intersection_ids: Vec<String>,
    ) -> std::result::Result<(), Status> {
        self.inner
            .remove_intersection_ids(self.request(RemoveIntersectionIdsRequest {
                user_id,
                intersection_ids,
            }))
            .await?;
        Ok(())
    }

    pub async fn change_password(
        &mut self,
        request: ChangePasswordRequest,
    ) -> std::result::Result<(), Status> {
        self.inner.change_password(self.request(request)).await?;
        Ok(())
    }

    pub async fn reset_password(&mut self, email: String) -> std::result::Result<(), Status> {
        self.inner.reset_password(self.request(ResetPasswordRequest { email })).await?;
        Ok(())
    }

    pub async fn make_admin(
        &mut self,
        user_id: String,
        admin_user_id: String,
    ) -> std::result::Result<(), Status> {
        self.inner.make_admin(self.request(AdminRequest { user_id, admin_user_id })).await?;
        Ok(())
    }

    pub async fn remove_admin(
        &mut self,
        user_id: String,
        admin_user_id: String,
    ) -> std::result::Result<(), Status> {
        self.inner.remove_admin(self.request(AdminRequest { user_id, admin_user_id })).await?;
        Ok(())
    }
}

/// Client for the intersection service.
#[derive(Clone)]
pub struct IntersectionClient {
    inner: IntersectionServiceClient<Channel>,
}

impl IntersectionClient {
    pub async fn connect(endpoint: String) -> Result<Self> {
        let inner = IntersectionServiceClient::connect(endpoint).await.map_err(connect_error)?;
        Ok(Self { inner })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self { inner: IntersectionServiceClient::new(channel) }
    }

    fn request<T>(&self, message: T) -> Request<T> {
        deadline_request(message, None)
    }

    pub async fn create_intersection(
        &mut self,
        request: CreateIntersectionRequest,
    ) -> std::result::Result<IntersectionResponse, Status> {
        Ok(self.inner.create_intersection(self.request(request)).await?.into_inner())
    }

    pub async fn get_intersection(
        &mut self,
        id: String,
    ) -> std::result::Result<IntersectionResponse, Status> {
        Ok(self
            .inner
            .get_intersection(self.request(IntersectionIdRequest { id }))
            .await?
            .into_inner())
    }

    pub async fn get_all_intersections(
        &mut self,
        request: GetAllIntersectionsRequest,
    ) -> std::result::Result<Streaming<IntersectionResponse>, Status> {
        Ok(self.inner.get_all_intersections(self.request(request)).await?.into_inner())
    }

    pub async fn update_intersection(
        &mut self,
        request: UpdateIntersectionRequest,
    ) -> std::result::Result<IntersectionResponse, Status> {
        Ok(self.inner.update_intersection(self.request(request)).await?.into_inner())
    }

    pub async fn delete_intersection(&mut self, id: String) -> std::result::Result<(), Status> {
        self.inner.delete_intersection(self.request(IntersectionIdRequest { id })).await?;
        Ok(())
    }

    pub async fn put_optimisation(
        &mut self,
        request: PutOptimisationRequest,
    ) -> std::result::Result<PutOptimisationResponse, Status> {
        Ok(self.inner.put_optimisation(self.request(request)).await?.into_inner())
    }
}
