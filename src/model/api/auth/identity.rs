use jsonwebtoken::{DecodingKey, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::common::VoterId;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";
const BEARER_SCHEME: &str = "Bearer";

/// Roles assigned to users by the auth provider.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: VoterId,
    pub email: String,
    pub role: Role,
}

/// Token claims as issued by the auth provider.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    role: Role,
    exp: i64,
}

impl Identity {
    /// Verify a raw token, yielding the identity it was issued for.
    pub fn from_token(token: &str, config: &Config) -> Result<Self, Error> {
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| data.claims)?;

        let id = VoterId::new(claims.sub)
            .ok_or_else(|| Error::Unauthenticated("Token has no subject".to_string()))?;
        Ok(Self {
            id,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// The token of a `Bearer` credential. The scheme name is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(BEARER_SCHEME) && !token.is_empty()).then_some(token)
}

/// Extract the raw credential. A bearer header wins over the cookie; any
/// other `Authorization` scheme is ignored.
fn credential(req: &Request<'_>) -> Option<String> {
    req.headers()
        .get("Authorization")
        .find_map(bearer_token)
        .map(str::to_string)
        .or_else(|| {
            req.cookies()
                .get(AUTH_TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_string())
        })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = Error;

    /// Verify the caller's credential. Never forwards: a missing or bad
    /// credential is a failure so handlers can report it in their own shape.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return Outcome::Failure((
                    Status::InternalServerError,
                    Error::Internal("Application config is not loaded".to_string()),
                ))
            }
        };

        let token = match credential(req) {
            Some(token) => token,
            None => {
                return Outcome::Failure((
                    Status::BadRequest,
                    Error::Unauthenticated("No credential provided".to_string()),
                ))
            }
        };

        match Self::from_token(&token, config) {
            Ok(identity) => Outcome::Success(identity),
            Err(e) => {
                debug!("Rejected credential: {e}");
                Outcome::Failure((Status::BadRequest, e))
            }
        }
    }
}
