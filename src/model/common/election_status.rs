use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
/// Transitions between them are administrative and never made by the voting core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Announced, but not yet open for voting.
    Upcoming,
    /// Open for voting. At most one election should be active at a time.
    Active,
    /// Voting has closed.
    Completed,
}

impl ElectionStatus {
    /// Can ballots be cast in this state?
    pub fn accepts_ballots(self) -> bool {
        self == Self::Active
    }
}
