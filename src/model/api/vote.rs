use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{
    common::{CandidateId, ElectionId, PositionId},
    db::Choices,
};

/// The body of a vote casting request, exactly as the client sent it.
/// Presence is checked when converting into a [`VoteSubmission`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub election_id: Option<String>,
    #[serde(default)]
    pub votes: Option<HashMap<PositionId, CandidateId>>,
}

/// A vote casting request that has passed validation.
///
/// Positions and candidates are not checked against the election: any
/// non-empty mapping of non-empty IDs is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSubmission {
    pub election_id: ElectionId,
    pub votes: Choices,
}

impl TryFrom<VoteRequest> for VoteSubmission {
    type Error = Error;

    fn try_from(request: VoteRequest) -> Result<Self, Self::Error> {
        let election_id = request
            .election_id
            .and_then(ElectionId::new)
            .ok_or_else(|| Error::Validation("Election ID is required".to_string()))?;

        let votes = request.votes.unwrap_or_default();
        if votes.is_empty() {
            return Err(Error::Validation(
                "At least one vote is required".to_string(),
            ));
        }
        if let Some((position, _)) = votes
            .iter()
            .find(|(position, candidate)| position.trim().is_empty() || candidate.trim().is_empty())
        {
            return Err(Error::Validation(format!(
                "Invalid vote for position '{position}'"
            )));
        }

        Ok(Self {
            election_id,
            votes: votes.into_iter().collect(),
        })
    }
}

/// Acknowledgement of a successfully cast ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAccepted {
    pub success: bool,
    pub message: String,
}

impl Default for VoteAccepted {
    fn default() -> Self {
        Self {
            success: true,
            message: "Vote cast successfully".to_string(),
        }
    }
}

/// The body of every failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable failure kind, e.g. `duplicate_vote`.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}
