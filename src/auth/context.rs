//! Request-scoped authentication context.
//!
//! An authenticating interceptor at the gRPC boundary parses the bearer token
//! and stores a typed [`AuthContext`] in the request extensions. Services read
//! it through a small accessor instead of touching global state.

use std::str::FromStr;

use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::auth::jwt;
use crate::domain::{Role, UserId};
use crate::errors::ServiceError;

/// The authenticated caller: identity plus role.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Whether this caller may act on the given target user.
    pub fn can_access_user(&self, target: &str) -> bool {
        self.is_admin() || self.user_id.as_str() == target
    }
}

/// Read the caller context out of a request, if the interceptor attached one.
pub fn auth_context<T>(request: &Request<T>) -> Option<AuthContext> {
    request.extensions().get::<AuthContext>().cloned()
}

/// Tonic interceptor that turns an `authorization: Bearer <jwt>` header into
/// an [`AuthContext`] extension.
///
/// Requests without the header pass through untouched; the open endpoints
/// (register, login, password reset) need no context and the protected ones
/// reject its absence in the service layer. A present but invalid token is
/// rejected here with `UNAUTHENTICATED`.
#[derive(Debug, Clone, Default)]
pub struct AuthInterceptor;

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let header = match request.metadata().get("authorization") {
            Some(value) => value,
            None => return Ok(request),
        };

        let header = header
            .to_str()
            .map_err(|_| Status::unauthenticated("malformed authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Status::unauthenticated("malformed authorization header"))?;

        let claims = jwt::parse(token).map_err(ServiceError::into_status)?;
        let role = Role::from_str(&claims.role)
            .map_err(|_| Status::unauthenticated("invalid token"))?;

        request
            .extensions_mut()
            .insert(AuthContext { user_id: UserId::from_string(claims.user_id), role });

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role) -> AuthContext {
        AuthContext { user_id: UserId::from_string("user-1".into()), role }
    }

    #[test]
    fn admin_can_access_anyone() {
        let admin = ctx(Role::Admin);
        assert!(admin.can_access_user("someone-else"));
        assert!(admin.can_access_user("user-1"));
    }

    #[test]
    fn regular_user_is_self_scoped() {
        let user = ctx(Role::Regular);
        assert!(user.can_access_user("user-1"));
        assert!(!user.can_access_user("someone-else"));
    }

    #[test]
    fn interceptor_passes_anonymous_requests() {
        let mut interceptor = AuthInterceptor;
        let request = Request::new(());
        let passed = interceptor.call(request).expect("anonymous request allowed");
        assert!(passed.extensions().get::<AuthContext>().is_none());
    }

    #[test]
    fn interceptor_rejects_garbage_tokens() {
        jwt::init(b"context-test-secret");
        let mut interceptor = AuthInterceptor;
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("authorization", "Bearer not-a-jwt".parse().unwrap());
        let err = interceptor.call(request).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn interceptor_attaches_context_for_valid_tokens() {
        jwt::init(b"context-test-secret");
        let (token, _) = jwt::sign("user-7", Role::Admin, jwt::TOKEN_TTL).unwrap();
        let mut interceptor = AuthInterceptor;
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());
        let passed = interceptor.call(request).unwrap();
        let ctx = passed.extensions().get::<AuthContext>().expect("context attached");
        assert_eq!(ctx.user_id.as_str(), "user-7");
        assert!(ctx.is_admin());
    }
}
