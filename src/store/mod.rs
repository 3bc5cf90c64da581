//! Persistence of elections and ballots.
//!
//! The voting core only talks to the [`ElectionStore`] and [`Transaction`]
//! traits. Every ballot is written through [`run_transaction`], which gives
//! the read-check-write sequence a single atomic scope and retries it when
//! the underlying store reports a transient conflict.

use std::sync::Arc;

use mongodb::error::{Error as DbError, TRANSIENT_TRANSACTION_ERROR};
use rocket::futures::future::BoxFuture;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::{
    common::{ElectionId, VoterId},
    db::{Ballot, Election},
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// How many times a transaction is attempted before a transient failure is surfaced.
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;

/// The store as held in Rocket's managed state.
pub type Store = Arc<dyn ElectionStore>;

/// Failures of the underlying storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Transaction conflicted with a concurrent write")]
    Conflict,
    #[error("Transaction is no longer open")]
    Closed,
}

impl StoreError {
    /// Is it worth retrying the whole transaction?
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(e) => e.contains_label(TRANSIENT_TRANSACTION_ERROR),
            Self::Conflict => true,
            Self::Closed => false,
        }
    }
}

/// Result of a conditional ballot insert.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

/// A source of transactions over elections and their ballots.
#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> std::result::Result<Box<dyn Transaction>, StoreError>;

    /// Transaction attempts before a transient failure is surfaced.
    fn max_attempts(&self) -> u32;

    /// Read a voter's ballot outside of any transaction.
    async fn find_ballot(
        &self,
        election_id: &ElectionId,
        voter_id: &VoterId,
    ) -> std::result::Result<Option<Ballot>, StoreError>;
}

/// An open transaction with at least snapshot isolation.
///
/// Writes are invisible to other transactions until [`Transaction::commit`]
/// succeeds. Dropping a transaction without committing discards its writes.
#[rocket::async_trait]
pub trait Transaction: Send {
    async fn get_election(
        &mut self,
        election_id: &ElectionId,
    ) -> std::result::Result<Option<Election>, StoreError>;

    async fn has_ballot(
        &mut self,
        election_id: &ElectionId,
        voter_id: &VoterId,
    ) -> std::result::Result<bool, StoreError>;

    /// Insert the ballot unless the voter already has one in this election.
    async fn put_ballot_if_absent(
        &mut self,
        election_id: &ElectionId,
        ballot: &Ballot,
    ) -> std::result::Result<PutOutcome, StoreError>;

    async fn commit(&mut self) -> std::result::Result<(), StoreError>;

    async fn abort(&mut self) -> std::result::Result<(), StoreError>;
}

/// Run `body` inside a transaction and commit it.
///
/// If `body` fails the transaction is aborted and the error returned. A
/// transient store failure, from either `body` or the commit, re-runs the
/// whole transaction from scratch until the store's attempt limit is reached.
pub async fn run_transaction<T, F>(store: &dyn ElectionStore, mut body: F) -> Result<T>
where
    T: Send,
    F: for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, Result<T>> + Send,
{
    let attempts = store.max_attempts().max(1);
    let mut attempt = 1;
    loop {
        let mut txn = store.begin().await?;
        let outcome = match body(txn.as_mut()).await {
            Ok(value) => txn.commit().await.map(|()| value).map_err(Error::from),
            Err(e) => {
                if let Err(abort_err) = txn.abort().await {
                    warn!("Failed to abort transaction: {abort_err}");
                }
                Err(e)
            }
        };

        match outcome {
            Err(Error::Store(e)) if e.is_transient() && attempt < attempts => {
                debug!("Transient store failure on attempt {attempt}/{attempts}, retrying: {e}");
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}
