//! Role-based authorization
//!
//! Runs after `JwtMiddleware`: reads the access claims it stored in the
//! request extensions and only lets listed roles through.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{AccessClaims, Role};
use crate::error::{AppError, AuthError};

pub struct RequireRole {
    allowed: Rc<Vec<Role>>,
}

impl RequireRole {
    pub fn new(allowed: &[Role]) -> Self {
        Self {
            allowed: Rc::new(allowed.to_vec()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequireRoleService {
            service: Rc::new(service),
            allowed: self.allowed.clone(),
        }))
    }
}

pub struct RequireRoleService<S> {
    service: Rc<S>,
    allowed: Rc<Vec<Role>>,
}

/// Whether `claims` (if any) grant one of the `allowed` roles
fn check_role(claims: Option<&AccessClaims>, allowed: &[Role]) -> Result<(), AuthError> {
    let claims = claims.ok_or(AuthError::NotAuthenticated)?;

    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions {
            required_roles: allowed.to_vec(),
            user_role: claims.role,
        })
    }
}

impl<S, B> Service<ServiceRequest> for RequireRoleService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verdict = check_role(req.extensions().get::<AccessClaims>(), &self.allowed);

        match verdict {
            Ok(()) => {
                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::warn!(code = e.code(), path = %req.path(), "Role check failed");
                Box::pin(futures::future::err::<ServiceResponse<B>, Error>(
                    AppError::Auth(e).into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> AccessClaims {
        AccessClaims {
            sub: "1".to_string(),
            email: "ops@fleet.com".to_string(),
            role,
            iat: 0,
            exp: 0,
            iss: "fleet_auth".to_string(),
        }
    }

    #[test]
    fn test_allowed_role_passes() {
        assert!(check_role(Some(&claims(Role::Admin)), &[Role::Admin]).is_ok());
        assert!(check_role(Some(&claims(Role::User)), &[Role::Admin, Role::User]).is_ok());
    }

    #[test]
    fn test_other_role_is_refused() {
        assert_eq!(
            check_role(Some(&claims(Role::Viewer)), &[Role::Admin]),
            Err(AuthError::InsufficientPermissions {
                required_roles: vec![Role::Admin],
                user_role: Role::Viewer,
            })
        );
    }

    #[test]
    fn test_missing_claims_is_not_authenticated() {
        assert_eq!(check_role(None, &[Role::Admin]), Err(AuthError::NotAuthenticated));
    }
}
