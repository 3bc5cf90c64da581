use mongodb::{
    bson::{doc, Document},
    error::UNKNOWN_TRANSACTION_COMMIT_RESULT,
    options::{Acknowledgment, ReadConcern, TransactionOptions, WriteConcern},
    Client, ClientSession, Database,
};

use crate::model::{
    common::{ElectionId, VoterId},
    db::{Ballot, Election, ElectionBallot},
    mongodb::{ensure_indexes_exist, is_duplicate_key_error, Coll},
};

use super::{ElectionStore, PutOutcome, StoreError, Transaction};

/// How many times an ambiguous commit is re-sent before giving up.
const COMMIT_ATTEMPTS: u32 = 3;

/// A store backed by a MongoDB replica set.
///
/// Transactions read from a snapshot and commit with majority write concern.
/// Two transactions racing to insert the same voter's ballot cannot both
/// commit: the loser either hits the unique ballot index or gets a transient
/// write conflict, and is retried by [`super::run_transaction`] until it
/// observes the winner's ballot.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    elections: Coll<Election>,
    ballots: Coll<ElectionBallot>,
    max_attempts: u32,
}

impl MongoStore {
    /// Wrap an existing connection.
    pub fn new(client: Client, db: &Database, max_attempts: u32) -> Self {
        Self {
            client,
            elections: Coll::from_db(db),
            ballots: Coll::from_db(db),
            max_attempts,
        }
    }

    /// Connect to the database and make sure the required indexes exist.
    pub async fn connect(db_uri: &str, db_name: &str, max_attempts: u32) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(db_uri).await?;
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        Ok(Self::new(client, &db, max_attempts))
    }
}

/// Filter matching a single voter's ballot in a single election.
fn ballot_filter(election_id: &ElectionId, voter_id: &VoterId) -> Document {
    doc! {
        "election_id": election_id,
        "id": voter_id,
    }
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let mut session = self.client.start_session(None).await?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await?;
        Ok(Box::new(MongoTransaction {
            session,
            elections: self.elections.clone(),
            ballots: self.ballots.clone(),
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
        let ballot = self
            .ballots
            .find_one(ballot_filter(election_id, voter_id), None)
            .await?;
        Ok(ballot.map(|stored| stored.ballot))
    }
}

struct MongoTransaction {
    session: ClientSession,
    elections: Coll<Election>,
    ballots: Coll<ElectionBallot>,
}

#[rocket::async_trait]
impl Transaction for MongoTransaction {
    async fn get_election(
        &mut self,
        election_id: &ElectionId,
    ) -> Result<Option<Election>, StoreError> {
        let election = self
            .elections
            .find_one_with_session(doc! { "_id": election_id }, None, &mut self.session)
            .await?;
        Ok(election)
    }

    async fn has_ballot(
        &mut self,
        election_id: &ElectionId,
        voter_id: &VoterId,
    ) -> Result<bool, StoreError> {
        let ballot = self
            .ballots
            .find_one_with_session(ballot_filter(election_id, voter_id), None, &mut self.session)
            .await?;
        Ok(ballot.is_some())
    }

    async fn put_ballot_if_absent(
        &mut self,
        election_id: &ElectionId,
        ballot: &Ballot,
    ) -> Result<PutOutcome, StoreError> {
        let stored = ElectionBallot {
            election_id: election_id.clone(),
            ballot: ballot.clone(),
        };
        match self
            .ballots
            .insert_one_with_session(stored, None, &mut self.session)
            .await
        {
            Ok(_) => Ok(PutOutcome::Created),
            Err(e) if is_duplicate_key_error(&e) => Ok(PutOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(e)
                    if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < COMMIT_ATTEMPTS =>
                {
                    warn!("Commit result unknown, re-sending commit: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn abort(&mut self) -> Result<(), StoreError> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use rocket::futures::future::join_all;

    use crate::casting::cast_vote;
    use crate::error::Error;
    use crate::model::{
        api::{auth::Identity, VoteSubmission},
        common::ElectionStatus,
        db::Choices,
    };
    use crate::store::run_transaction;

    use super::*;

    /// Connect to the replica set named by `ROCKET_DB_URI`, using a fresh database.
    async fn test_store() -> (MongoStore, Database) {
        let uri = env::var("ROCKET_DB_URI").expect("ROCKET_DB_URI must name a replica set");
        let db_name = format!("test{}", rand::random::<u32>());
        let store = MongoStore::connect(&uri, &db_name, 5).await.unwrap();
        let db = store.client.database(&db_name);
        (store, db)
    }

    #[rocket::async_test]
    #[ignore = "requires a MongoDB replica set at ROCKET_DB_URI"]
    async fn conditional_insert_against_mongodb() {
        let (store, db) = test_store().await;
        let election = Election::example("E1", ElectionStatus::Active);
        Coll::<Election>::from_db(&db)
            .insert_one(&election, None)
            .await
            .unwrap();

        let voter_id = VoterId::new("V1").unwrap();
        let ballot = Ballot::new(
            voter_id.clone(),
            Choices::from([("president".to_string(), "C1".to_string())]),
        );

        let first = run_transaction(&store, |txn| {
            let election_id = election.id.clone();
            let ballot = ballot.clone();
            Box::pin(async move {
                assert!(txn.get_election(&election_id).await?.is_some());
                Ok(txn.put_ballot_if_absent(&election_id, &ballot).await?)
            })
        })
        .await
        .unwrap();
        assert_eq!(first, PutOutcome::Created);

        let mut txn = store.begin().await.unwrap();
        assert!(txn.has_ballot(&election.id, &voter_id).await.unwrap());
        let second = txn
            .put_ballot_if_absent(&election.id, &ballot)
            .await
            .unwrap();
        assert_eq!(second, PutOutcome::AlreadyExists);
        let _ = txn.abort().await;

        let found = store.find_ballot(&election.id, &voter_id).await.unwrap();
        assert_eq!(found, Some(ballot));

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore = "requires a MongoDB replica set at ROCKET_DB_URI"]
    async fn racing_votes_against_mongodb() {
        let (store, db) = test_store().await;
        let election = Election::example("E3", ElectionStatus::Active);
        Coll::<Election>::from_db(&db)
            .insert_one(&election, None)
            .await
            .unwrap();
        let voter = Identity::example("V3");

        let attempts = (0..2).map(|i| {
            let store = store.clone();
            let voter = voter.clone();
            let submission = VoteSubmission {
                election_id: election.id.clone(),
                votes: Choices::from([("president".to_string(), format!("C{i}"))]),
            };
            rocket::tokio::spawn(async move { cast_vote(&store, &voter, submission).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let accepted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(accepted.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(Error::DuplicateVote))));

        let stored = Coll::<ElectionBallot>::from_db(&db)
            .count_documents(ballot_filter(&election.id, &voter.id), None)
            .await
            .unwrap();
        assert_eq!(stored, 1);
        let found = store.find_ballot(&election.id, &voter.id).await.unwrap();
        assert_eq!(found.as_ref(), Some(accepted[0]));

        db.drop(None).await.unwrap();
    }
}
