mod election_status;
mod ids;

pub use election_status::ElectionStatus;
pub use ids::{CandidateId, ElectionId, PositionId, VoterId};
