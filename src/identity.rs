use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use crate::domain::identity::{Identity, Role};
use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";
pub const GUEST_SESSION_HEADER: &str = "X-Guest-Session";

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized(format!("{name} is not a valid id")))
}

/// Builds the caller's identity from the headers set by the identity gateway.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, AppError> {
    let user_id = header_uuid(headers, USER_ID_HEADER)?;
    let guest_session = header_uuid(headers, GUEST_SESSION_HEADER)?;

    let roles = match (user_id, headers.get(USER_ROLES_HEADER)) {
        (None, _) => Vec::new(),
        (Some(_), None) => vec![Role::Shopper],
        (Some(_), Some(raw)) => raw
            .to_str()
            .map_err(|_| AppError::Forbidden(format!("{USER_ROLES_HEADER} is unreadable")))?
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .map(|r| r.parse::<Role>().map_err(AppError::from))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Identity {
        user_id,
        guest_session,
        roles,
    })
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(identity_from_headers(req.headers()))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn signed_in_user_defaults_to_shopper() {
        let user = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, user.to_string()))
            .to_http_request();
        let identity = identity_from_headers(req.headers()).expect("identity");
        assert_eq!(identity.user_id, Some(user));
        assert_eq!(identity.roles, vec![Role::Shopper]);
    }

    #[test]
    fn roles_header_is_comma_separated() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((USER_ROLES_HEADER, "admin, finance"))
            .to_http_request();
        let identity = identity_from_headers(req.headers()).expect("identity");
        assert!(identity.has_role(Role::Admin));
        assert!(identity.has_role(Role::Finance));
        assert!(!identity.has_role(Role::Shopper));
    }

    #[test]
    fn guests_carry_no_roles() {
        let session = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((GUEST_SESSION_HEADER, session.to_string()))
            .insert_header((USER_ROLES_HEADER, "admin"))
            .to_http_request();
        let identity = identity_from_headers(req.headers()).expect("identity");
        assert_eq!(identity, Identity::guest(session));
    }

    #[test]
    fn malformed_user_id_is_unauthorized() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(matches!(
            identity_from_headers(req.headers()),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn unknown_role_is_forbidden() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((USER_ROLES_HEADER, "owner"))
            .to_http_request();
        assert!(matches!(
            identity_from_headers(req.headers()),
            Err(AppError::Forbidden(_))
        ));
    }
}
