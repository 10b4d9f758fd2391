//! tonic adapter for the user service.
//!
//! Thin by construction: read the auth context, map the wire message to a
//! validated input, call the domain service and convert the result back.
//! Streaming endpoints emit the already-authorised page item by item and stop
//! as soon as the caller goes away.

use std::pin::Pin;

use futures::Stream;
use tonic::{Request, Response, Status};

use crate::auth::auth_context;
use crate::grpc::convert::user_response;
use crate::grpc::user_proto::user_service_server::UserService as UserServiceHandler;
use crate::grpc::user_proto::{
    AddIntersectionIdRequest, AdminRequest, ChangePasswordRequest, GetAllUsersRequest,
    GetUserByEmailRequest, IntersectionIdResponse, LoginUserRequest, LoginUserResponse,
    RegisterUserRequest, RemoveIntersectionIdsRequest, ResetPasswordRequest, UpdateUserRequest,
    UserIdRequest, UserResponse,
};
use crate::services::validation::{
    AddIntersectionIdInput, AdminActionInput, ChangePasswordInput, EmailInput, LoginUserInput,
    PageInput, RegisterUserInput, RemoveIntersectionIdsInput, UpdateUserInput, UserIdInput,
};
use crate::services::UserService;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

#[derive(Clone)]
pub struct UserGrpcService {
    service: UserService,
}

impl UserGrpcService {
    pub fn new(service: UserService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl UserServiceHandler for UserGrpcService {
    async fn register_user(
        &self,
        request: Request<RegisterUserRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let message = request.into_inner();
        let user = self
            .service
            .register(RegisterUserInput {
                name: message.name,
                email: message.email,
                password: message.password,
            })
            .await?;
        Ok(Response::new(user_response(user)))
    }

    async fn login_user(
        &self,
        request: Request<LoginUserRequest>,
    ) -> Result<Response<LoginUserResponse>, Status> {
        let message = request.into_inner();
        let issued = self
            .service
            .login(LoginUserInput { email: message.email, password: message.password })
            .await?;
        Ok(Response::new(LoginUserResponse {
            token: issued.token,
            expires_at: Some(crate::grpc::convert::to_timestamp(issued.expires_at)),
        }))
    }

    async fn logout_user(
        &self,
        request: Request<UserIdRequest>,
    ) -> Result<Response<()>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        self.service
            .logout(caller.as_ref(), UserIdInput { user_id: message.user_id })
            .await?;
        Ok(Response::new(()))
    }

    async fn get_user_by_id(
        &self,
        request: Request<UserIdRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        let user = self
            .service
            .get_by_id(caller.as_ref(), UserIdInput { user_id: message.user_id })
            .await?;
        Ok(Response::new(user_response(user)))
    }

    async fn get_user_by_email(
        &self,
        request: Request<GetUserByEmailRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let message = request.into_inner();
        let user = self.service.get_by_email(EmailInput { email: message.email }).await?;
        Ok(Response::new(user_response(user)))
    }

    type GetAllUsersStream = ResponseStream<UserResponse>;

    async fn get_all_users(
        &self,
        request: Request<GetAllUsersRequest>,
    ) -> Result<Response<Self::GetAllUsersStream>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        let users = self
            .service
            .list(
                caller.as_ref(),
                PageInput {
                    page: message.page,
                    page_size: message.page_size,
                    filter: message.filter,
                },
            )
            .await?;

        let stream = async_stream::stream! {
            for user in users {
                yield Ok(user_response(user));
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn update_user(
        &self,
        request: Request<UpdateUserRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        let user = self
            .service
            .update(
                caller.as_ref(),
                UpdateUserInput {
                    user_id: message.user_id,
                    name: message.name,
                    email: message.email,
                },
            )
            .await?;
        Ok(Response::new(user_response(user)))
    }

    async fn delete_user(
        &self,
        request: Request<UserIdRequest>,
    ) -> Result<Response<()>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        self.service
            .delete(caller.as_ref(), UserIdInput { user_id: message.user_id })
            .await?;
        Ok(Response::new(()))
    }

    type GetUserIntersectionIdsStream = ResponseStream<IntersectionIdResponse>;

    async fn get_user_intersection_ids(
        &self,
        request: Request<UserIdRequest>,
    ) -> Result<Response<Self::GetUserIntersectionIdsStream>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        let ids = self
            .service
            .intersection_ids(caller.as_ref(), UserIdInput { user_id: message.user_id })
            .await?;

        let stream = async_stream::stream! {
            for intersection_id in ids {
                yield Ok(IntersectionIdResponse { intersection_id });
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn add_intersection_id(
        &self,
        request: Request<AddIntersectionIdRequest>,
    ) -> Result<Response<()>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        self.service
            .add_intersection_id(
                caller.as_ref(),
                AddIntersectionIdInput {
                    user_id: message.user_id,
                    intersection_id: message.intersection_id,
                },
            )
            .await?;
        Ok(Response::new(()))
    }

    async fn remove_intersection_ids(
        &self,
        request: Request<RemoveIntersectionIdsRequest>,
    ) -> Result<Response<()>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        self.service
            .remove_intersection_ids(
                caller.as_ref(),
                RemoveIntersectionIdsInput {
                    user_id: message.user_id,
                    intersection_ids: message.intersection_ids,
                },
            )
            .await?;
        Ok(Response::new(()))
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> Result<Response<()>, Status> {
        let caller = auth_context(&request);
        let message = request.into_inner();
        self.service
            .change_password(
                caller.as_ref(),
                ChangePasswordInput {
                    user_id: message.user_id,
                    current_password: message.current_password,
                    new_password: message.new_password,
                },
            )
            .await?;
        Ok(Response::new(()))
    }

    async fn reset_password(
        &self,
        request: Request<ResetPasswordRequest>,
    ) -> Result<Response<()>, Status> {
        let message = request.into_inner();
        self.service.reset_password(EmailInput { email: message.email }).await?;
        Ok(Response::new(()))
    }

    async fn make_admin(&self, request: Request<AdminRequest>) -> Result<Response<()>, Status> {
        let message = request.into_inner();
        self.service
            .make_admin(AdminActionInput {
                user_id: message.user_id,
                admin_user_id: message.admin_user_id,
            })
            .await?;
        Ok(Response::new(()))
    }

    async fn remove_admin(&self, request: Request<AdminRequest>) -> Result<Response<()>, Status> {
        let message = request.into_inner();
        self.service
            .remove_admin(AdminActionInput {
                user_id: message.user_id,
                admin_user_id: message.admin_user_id,
            })
            .await?;
        Ok(Response::new(()))
    }
}
