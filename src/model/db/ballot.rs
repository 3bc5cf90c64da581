use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{CandidateId, ElectionId, PositionId, VoterId};

/// A voter's choices for one election: position ID to chosen candidate ID.
pub type Choices = BTreeMap<PositionId, CandidateId>;

/// A cast ballot. Immutable once stored, and unique per (election, voter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// The voter who cast this ballot; also the ballot's key within its election.
    #[serde(rename = "id")]
    pub voter_id: VoterId,
    pub votes: Choices,
    /// When the ballot was cast, serialized as an ISO-8601 string.
    pub timestamp: DateTime<Utc>,
}

impl Ballot {
    /// Create a new ballot stamped with the current time.
    pub fn new(voter_id: VoterId, votes: Choices) -> Self {
        Self {
            voter_id,
            votes,
            timestamp: Utc::now(),
        }
    }
}

/// A ballot as stored in the shared `ballots` collection, tagged with the
/// election it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionBallot {
    pub election_id: ElectionId,
    #[serde(flatten)]
    pub ballot: Ballot,
}

#[cfg(test)]
mod tests {
    use mongodb::bson;

    use super::*;

    #[test]
    fn stored_layout() {
        let ballot = Ballot::new(
            VoterId::new("V1").unwrap(),
            Choices::from([("president".to_string(), "C1".to_string())]),
        );
        let stored = ElectionBallot {
            election_id: ElectionId::new("E1").unwrap(),
            ballot: ballot.clone(),
        };
        let doc = bson::to_document(&stored).unwrap();
        assert_eq!(doc.get_str("election_id").unwrap(), "E1");
        assert_eq!(doc.get_str("id").unwrap(), "V1");
        assert_eq!(doc.get_document("votes").unwrap().get_str("president").unwrap(), "C1");
        assert_eq!(
            doc.get_str("timestamp").unwrap(),
            rocket::serde::json::serde_json::to_value(ballot.timestamp)
                .unwrap()
                .as_str()
                .unwrap()
        );

        let back: ElectionBallot = bson::from_document(doc).unwrap();
        assert_eq!(back.ballot, ballot);
    }
}
