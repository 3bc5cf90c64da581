pub mod auth;
pub mod vote;

pub use vote::{ErrorBody, VoteAccepted, VoteRequest, VoteSubmission};
