pub mod ballot;
pub mod election;

pub use ballot::{Ballot, Choices, ElectionBallot};
pub use election::{Election, Position};
