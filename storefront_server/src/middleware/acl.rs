//! Access control list middleware for the storefront server.
//! This middleware can be placed on any route or service.
//!
//! It reads the access token from the request headers, validates it with the [`TokenValidator`] registered as app
//! data, and stores the claims in the request extensions so that handlers can extract [`JwtClaims`]. The claims are
//! then checked against the roles the route requires.
//!
//! * No token, or a token that fails validation: 401 Unauthorized.
//! * A valid token that lacks one of the required roles: 403 Forbidden.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;

use crate::{
    auth::{extract_token, JwtClaims, Role, TokenValidator},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let validator = req.app_data::<web::Data<TokenValidator>>().cloned().ok_or_else(|| {
                error!("🔐️ No token validator has been registered. Cannot authenticate {}", req.path());
                ServerError::ConfigurationError("Token validation is not available".into())
            })?;
            let token = extract_token(req.headers()).ok_or_else(|| {
                debug!("🔐️ No access token in request for {}", req.path());
                ServerError::AuthenticationError(AuthError::MissingToken)
            })?;
            let claims = validator.validate(&token).map_err(|e| {
                debug!("🔐️ Access token for {} was rejected. {e}", req.path());
                ServerError::AuthenticationError(e)
            })?;
            if !claims.has_roles(&required_roles) {
                info!("🔐️ {} does not have the roles required for {}", claims.sub, req.path());
                return Err(ServerError::AuthenticationError(AuthError::InsufficientPermissions).into());
            }
            req.extensions_mut().insert::<JwtClaims>(claims);
            service.call(req).await
        })
    }
}
