use crate::{
    error::AppError,
    model::role::Role,
    models::{Claims, TokenType},
    service::Actor,
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

/// Why a verified token still cannot act as a user.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimsRejection {
    NotAccessToken,
    UnknownRole,
}

impl TryFrom<Claims> for AuthUser {
    type Error = ClaimsRejection;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.token_type != TokenType::Access {
            return Err(ClaimsRejection::NotAccessToken);
        }
        let role = Role::from_id(claims.role).ok_or(ClaimsRejection::UnknownRole)?;
        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        })
    }
}

/// Reads the user stored by `auth_middleware`.
impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing token")),
        )
    }
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            employee_id: self.employee_id,
            role: self.role,
        }
    }

    /// The employee this user punches and applies leave as.
    pub fn employee(&self) -> Result<u64, AppError> {
        self.actor().employee()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: u8, token_type: TokenType) -> Claims {
        Claims {
            user_id: 1,
            sub: "alice".into(),
            role,
            exp: usize::MAX,
            jti: "j".into(),
            token_type,
            employee_id: Some(7),
        }
    }

    #[test]
    fn access_claims_become_a_user() {
        let user = AuthUser::try_from(claims(2, TokenType::Access)).unwrap();
        assert_eq!(user.role, Role::Hr);
        assert_eq!(user.employee().unwrap(), 7);
        assert!(user.actor().require_administrative().is_ok());
    }

    #[actix_web::test]
    async fn extractor_reads_the_user_left_by_the_middleware() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());

        let req = actix_web::test::TestRequest::default().to_http_request();
        let user = AuthUser::try_from(claims(2, TokenType::Access)).unwrap();
        req.extensions_mut().insert(user);

        let user = AuthUser::extract(&req).await.unwrap();
        assert_eq!(user.user_id, 1);
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn refresh_tokens_and_unknown_roles_are_refused() {
        assert_eq!(
            AuthUser::try_from(claims(3, TokenType::Refresh)).unwrap_err(),
            ClaimsRejection::NotAccessToken
        );
        assert_eq!(
            AuthUser::try_from(claims(42, TokenType::Access)).unwrap_err(),
            ClaimsRejection::UnknownRole
        );
    }
}
