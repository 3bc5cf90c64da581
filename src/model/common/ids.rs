use std::fmt::{Display, Formatter};
use std::ops::Deref;

use mongodb::bson::Bson;
use rocket::{request::FromParam, UriDisplayPath};
use serde::{Deserialize, Serialize};

/// Our position IDs are opaque strings chosen by the election's administrators.
pub type PositionId = String;
/// Our candidate IDs are the auth-provider user IDs of the candidates.
pub type CandidateId = String;

/// The identifier of an election document.
#[derive(
    Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, UriDisplayPath,
)]
#[serde(transparent)]
pub struct ElectionId(String);

/// The identifier of a voter, as issued by the auth provider.
/// Doubles as the key of the voter's ballot within an election.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);

macro_rules! impl_string_id {
    ($id:ident) => {
        impl $id {
            /// Wrap a raw identifier. Returns `None` if it is empty or all whitespace.
            pub fn new(raw: impl Into<String>) -> Option<Self> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    None
                } else {
                    Some(Self(raw))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $id {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Display for $id {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&$id> for Bson {
            fn from(id: &$id) -> Self {
                Bson::String(id.0.clone())
            }
        }
    };
}

impl_string_id!(ElectionId);
impl_string_id!(VoterId);

impl<'a> FromParam<'a> for ElectionId {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Self::new(param).ok_or(param)
    }
}
