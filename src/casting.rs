//! The vote casting core.
//!
//! A voter moves from having no ballot in an election to having exactly one,
//! and never back. Every check and the ballot write happen inside one store
//! transaction, so two racing requests from the same voter cannot both
//! succeed: whichever commits second observes the first one's ballot.
//!
//! Positions and candidates named in a ballot are not checked against the
//! election, and any authenticated caller may vote. Both are deliberate
//! gaps that mirror the association's existing behaviour.

use crate::error::{Error, Result};
use crate::model::{
    api::{auth::Identity, VoteSubmission},
    common::ElectionId,
    db::Ballot,
};
use crate::store::{run_transaction, ElectionStore, PutOutcome, Transaction};

/// Cast `voter`'s ballot in an election, returning the stored ballot.
///
/// Fails with [`Error::ElectionNotActive`] if the election does not exist or
/// is not active, and with [`Error::DuplicateVote`] if the voter has already
/// voted in it. No ballot is written on any failure.
pub async fn cast_vote(
    store: &dyn ElectionStore,
    voter: &Identity,
    submission: VoteSubmission,
) -> Result<Ballot> {
    let VoteSubmission { election_id, votes } = submission;
    let voter_id = voter.id.clone();

    let cast = {
        let election_id = election_id.clone();
        run_transaction(store, move |txn| {
            let election_id = election_id.clone();
            let ballot = Ballot::new(voter_id.clone(), votes.clone());
            Box::pin(async move { cast_in(txn, &election_id, ballot).await })
        })
        .await
    };

    match &cast {
        Ok(_) => info!("Voter {} cast a ballot in election {election_id}", voter.id),
        Err(e @ (Error::DuplicateVote | Error::ElectionNotActive)) => {
            info!("Voter {} refused in election {election_id}: {e}", voter.id)
        }
        Err(e) => warn!("Voter {} failed to vote in election {election_id}: {e}", voter.id),
    }
    cast
}

/// The body of the vote casting transaction.
async fn cast_in(
    txn: &mut dyn Transaction,
    election_id: &ElectionId,
    ballot: Ballot,
) -> Result<Ballot> {
    let active = txn
        .get_election(election_id)
        .await?
        .map_or(false, |election| election.is_active());
    if !active {
        return Err(Error::ElectionNotActive);
    }

    if txn.has_ballot(election_id, &ballot.voter_id).await? {
        return Err(Error::DuplicateVote);
    }

    match txn.put_ballot_if_absent(election_id, &ballot).await? {
        PutOutcome::Created => Ok(ballot),
        PutOutcome::AlreadyExists => Err(Error::DuplicateVote),
    }
}
