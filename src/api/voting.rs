use rocket::{
    serde::json::{self, Json},
    Route, State,
};

use crate::casting;
use crate::error::{Error, Result};
use crate::model::{
    api::{auth::Identity, VoteAccepted, VoteRequest, VoteSubmission},
    common::ElectionId,
    db::Ballot,
};
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![cast_vote, own_ballot]
}

#[post("/elections/vote", data = "<request>")]
pub async fn cast_vote(
    identity: Result<Identity>,
    request: std::result::Result<Json<VoteRequest>, json::Error<'_>>,
    store: &State<Store>,
) -> Result<Json<VoteAccepted>> {
    let voter = identity?;
    let submission: VoteSubmission = request
        .map_err(|e| Error::Validation(format!("Malformed request body: {e}")))?
        .into_inner()
        .try_into()?;

    casting::cast_vote(store.inner().as_ref(), &voter, submission).await?;

    Ok(Json(VoteAccepted::default()))
}

/// The caller's own ballot, so a client that lost the response to a cast can
/// tell whether its vote was recorded.
#[get("/elections/<election_id>/ballot")]
pub async fn own_ballot(
    identity: Result<Identity>,
    election_id: std::result::Result<ElectionId, &str>,
    store: &State<Store>,
) -> Result<Json<Ballot>> {
    let voter = identity?;
    let election_id =
        election_id.map_err(|_| Error::Validation("Election ID is required".to_string()))?;
    store
        .find_ballot(&election_id, &voter.id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("Ballot for election '{election_id}'")))
}
