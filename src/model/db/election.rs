use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{ElectionId, ElectionStatus, PositionId};

/// An office that can be contested in an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub title: String,
    /// Nomination fee for the position.
    pub price: f64,
    pub description: String,
    pub icon: String,
}

/// An election record, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    /// Positions in display order.
    pub positions: Vec<Position>,
    pub status: ElectionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Election {
    /// Is this election currently open for voting?
    ///
    /// Only the status is consulted. The schedule is informational and the
    /// administrative workflow is responsible for flipping the status.
    pub fn is_active(&self) -> bool {
        self.status.accepts_ballots()
    }
}
