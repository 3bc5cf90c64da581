use std::collections::HashMap;
use std::sync::Arc;

use rocket::tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{
    common::{ElectionId, VoterId},
    db::{Ballot, Election},
};

use super::{ElectionStore, PutOutcome, StoreError, Transaction, DEFAULT_TRANSACTION_ATTEMPTS};

#[derive(Debug, Default)]
struct MemoryState {
    elections: HashMap<ElectionId, Election>,
    ballots: HashMap<ElectionId, HashMap<VoterId, Ballot>>,
    transactions_started: usize,
    /// Number of upcoming commits that will fail with a transient conflict.
    failing_commits: usize,
}

impl MemoryState {
    fn ballot(&self, election_id: &ElectionId, voter_id: &VoterId) -> Option<&Ballot> {
        self.ballots.get(election_id)?.get(voter_id)
    }
}

/// An in-process store.
///
/// Each transaction holds an exclusive lock over the whole store from
/// `begin` until it commits, aborts or is dropped, so transactions are
/// serializable. Clones share the same underlying data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    max_attempts: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_attempts(DEFAULT_TRANSACTION_ATTEMPTS)
    }
}

impl MemoryStore {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            state: Arc::default(),
            max_attempts,
        }
    }

    /// Add or replace an election record.
    pub async fn insert_election(&self, election: Election) {
        let mut state = self.state.lock().await;
        state.elections.insert(election.id.clone(), election);
    }

    /// All ballots committed for the given election, in no particular order.
    pub async fn ballots(&self, election_id: &ElectionId) -> Vec<Ballot> {
        let state = self.state.lock().await;
        state
            .ballots
            .get(election_id)
            .map(|ballots| ballots.values().cloned().collect())
            .unwrap_or_default()
    }

    /// How many transactions have been opened over the store's lifetime.
    pub async fn transactions_started(&self) -> usize {
        self.state.lock().await.transactions_started
    }

    /// Make the next `count` commits fail with [`StoreError::Conflict`].
    pub async fn fail_next_commits(&self, count: usize) {
        self.state.lock().await.failing_commits = count;
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let mut state = self.state.clone().lock_owned().await;
        state.transactions_started += 1;
        Ok(Box::new(MemoryTransaction {
            state: Some(state),
            pending: Vec::new(),
        }))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn find_ballot(
        &self,
        election_id: &ElectionId,
        voter_id: &VoterId,
    ) -> Result<Option<Ballot>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.ballot(election_id, voter_id).cloned())
    }
}

/// A transaction over a [`MemoryStore`]. Buffers its writes until commit.
struct MemoryTransaction {
    state: Option<OwnedMutexGuard<MemoryState>>,
    pending: Vec<(ElectionId, Ballot)>,
}

impl MemoryTransaction {
    fn state(&self) -> Result<&MemoryState, StoreError> {
        self.state.as_deref().ok_or(StoreError::Closed)
    }

    fn pending_ballot(&self, election_id: &ElectionId, voter_id: &VoterId) -> bool {
        self.pending
            .iter()
            .any(|(id, ballot)| id == election_id && &ballot.voter_id == voter_id)
    }
}

#[rocket::async_trait]
impl Transaction for MemoryTransaction {
    async fn get_election(
        &mut self,
        election_id: &ElectionId,
    ) -> Result<Option<Election>, StoreError> {
        Ok(self.state()?.elections.get(election_id).cloned())
    }

    async fn has_ballot(
        &mut self,
        election_id: &ElectionId,
        voter_id: &VoterId,
    ) -> Result<bool, StoreError> {
        let committed = self.state()?.ballot(election_id, voter_id).is_some();
        Ok(committed || self.pending_ballot(election_id, voter_id))
    }

    async fn put_ballot_if_absent(
        &mut self,
        election_id: &ElectionId,
        ballot: &Ballot,
    ) -> Result<PutOutcome, StoreError> {
        if self.has_ballot(election_id, &ballot.voter_id).await? {
            return Ok(PutOutcome::AlreadyExists);
        }
        self.pending.push((election_id.clone(), ballot.clone()));
        Ok(PutOutcome::Created)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.state.take().ok_or(StoreError::Closed)?;
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            self.pending.clear();
            return Err(StoreError::Conflict);
        }
        for (election_id, ballot) in self.pending.drain(..) {
            state
                .ballots
                .entry(election_id)
                .or_default()
                .insert(ballot.voter_id.clone(), ballot);
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), StoreError> {
        self.pending.clear();
        self.state.take().map(drop).ok_or(StoreError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{common::ElectionStatus, db::Choices};

    use super::*;

    fn ids() -> (ElectionId, VoterId) {
        (ElectionId::new("E1").unwrap(), VoterId::new("V1").unwrap())
    }

    fn ballot(voter_id: &VoterId) -> Ballot {
        Ballot::new(
            voter_id.clone(),
            Choices::from([("president".to_string(), "C1".to_string())]),
        )
    }

    #[rocket::async_test]
    async fn writes_are_invisible_until_commit() {
        let store = MemoryStore::default();
        let (election_id, voter_id) = ids();

        let mut txn = store.begin().await.unwrap();
        let outcome = txn
            .put_ballot_if_absent(&election_id, &ballot(&voter_id))
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Created);
        // Read-your-writes within the transaction.
        assert!(txn.has_ballot(&election_id, &voter_id).await.unwrap());
        txn.commit().await.unwrap();

        assert!(store
            .find_ballot(&election_id, &voter_id)
            .await
            .unwrap()
            .is_some());
    }

    #[rocket::async_test]
    async fn aborted_writes_are_discarded() {
        let store = MemoryStore::default();
        let (election_id, voter_id) = ids();

        let mut txn = store.begin().await.unwrap();
        txn.put_ballot_if_absent(&election_id, &ballot(&voter_id))
            .await
            .unwrap();
        txn.abort().await.unwrap();

        assert!(store.ballots(&election_id).await.is_empty());
        assert!(matches!(txn.commit().await, Err(StoreError::Closed)));
    }

    #[rocket::async_test]
    async fn dropped_transactions_release_the_store() {
        let store = MemoryStore::default();
        let (election_id, voter_id) = ids();
        {
            let mut txn = store.begin().await.unwrap();
            txn.put_ballot_if_absent(&election_id, &ballot(&voter_id))
                .await
                .unwrap();
        }
        assert!(store.ballots(&election_id).await.is_empty());
        assert_eq!(store.transactions_started().await, 1);
    }

    #[rocket::async_test]
    async fn second_insert_is_rejected() {
        let store = MemoryStore::default();
        let (election_id, voter_id) = ids();

        let mut txn = store.begin().await.unwrap();
        txn.put_ballot_if_absent(&election_id, &ballot(&voter_id))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        let outcome = txn
            .put_ballot_if_absent(&election_id, &ballot(&voter_id))
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::AlreadyExists);
    }

    #[rocket::async_test]
    async fn reads_elections() {
        let store = MemoryStore::default();
        store
            .insert_election(Election::example("E1", ElectionStatus::Upcoming))
            .await;
        let (election_id, _) = ids();

        let mut txn = store.begin().await.unwrap();
        let election = txn.get_election(&election_id).await.unwrap().unwrap();
        assert_eq!(election.status, ElectionStatus::Upcoming);
        let missing = ElectionId::new("E404").unwrap();
        assert!(txn.get_election(&missing).await.unwrap().is_none());
    }
}
