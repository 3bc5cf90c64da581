use jsonwebtoken::errors::Error as JwtError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, status, Responder},
    serde::json::Json,
    Request,
};
use thiserror::Error;

use crate::logging::request_id;
use crate::model::api::ErrorBody;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while handling a request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthenticated(String),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Election is not currently active")]
    ElectionNotActive,
    #[error("You have already cast your ballot")]
    DuplicateVote,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// A stable, machine-readable name for this kind of failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthenticated(_) | Self::Jwt(_) => "unauthenticated",
            Self::ElectionNotActive => "election_not_active",
            Self::DuplicateVote => "duplicate_vote",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store_transaction_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The HTTP status reported for this error.
    ///
    /// Every failure of the vote casting route collapses onto 400; the
    /// `error` field of the body distinguishes them.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Internal(_) => Status::InternalServerError,
            _ => Status::BadRequest,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let id = request_id(req);
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("req{id} failed: {self}"),
            _ => debug!("req{id} rejected: {self}"),
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        status::Custom(status, Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_messages() {
        assert_eq!(
            Error::DuplicateVote.to_string(),
            "You have already cast your ballot"
        );
        assert_eq!(
            Error::ElectionNotActive.to_string(),
            "Election is not currently active"
        );
    }

    #[test]
    fn vote_failures_collapse_onto_bad_request() {
        for err in [
            Error::Validation("Election ID is required".to_string()),
            Error::Unauthenticated("No credential provided".to_string()),
            Error::ElectionNotActive,
            Error::DuplicateVote,
            Error::Store(StoreError::Conflict),
        ] {
            assert_eq!(err.status(), Status::BadRequest, "{err}");
        }
    }
}
