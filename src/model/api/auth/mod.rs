mod identity;

pub use identity::{Identity, Role, AUTH_TOKEN_COOKIE};
