use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{domain::Booking, error::AppError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity as forwarded by the upstream identity proxy.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn can_access(&self, booking: &Booking) -> bool {
        self.is_admin || booking.user_id == self.id
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn identity_from_headers(headers: &HeaderMap) -> Result<CurrentUser, AppError> {
    let id = header_str(headers, USER_ID_HEADER)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(AppError::Unauthorized)?;

    let is_admin = header_str(headers, USER_ROLE_HEADER)
        .map(|role| role.eq_ignore_ascii_case("admin"))
        .unwrap_or(false);

    Ok(CurrentUser {
        id,
        email: header_str(headers, USER_EMAIL_HEADER).map(str::to_string),
        name: header_str(headers, USER_NAME_HEADER).map(str::to_string),
        is_admin,
    })
}

pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = identity_from_headers(request.headers())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = identity_from_headers(request.headers())?;
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_identity_requires_user_id() {
        let headers = HeaderMap::new();
        assert!(matches!(identity_from_headers(&headers), Err(AppError::Unauthorized)));

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(identity_from_headers(&headers).is_err());
    }

    #[test]
    fn test_identity_reads_role() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("Admin"));
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("ops@example.com"));

        let user = identity_from_headers(&headers).unwrap();
        assert_eq!(user.id, id);
        assert!(user.is_admin);
        assert_eq!(user.email.as_deref(), Some("ops@example.com"));
        assert_eq!(user.name, None);
    }
}
