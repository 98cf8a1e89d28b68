//! OAuth 2.1 + PKCE + PAR + DPoP authorization-server logic for the account
//! engine (§4.5). Kept independent of the HTTP layer: `accteng-server`'s
//! `routes/oauth.rs` is a thin Axum binding over the functions here, the same
//! shape `routes/repo.rs` has over `accteng-repo`.

pub mod authorize;
pub mod client_metadata;
pub mod cleanup;
pub mod error;
pub mod par;
pub mod revoke;
pub mod token;
pub mod webauthn;

#[cfg(test)]
mod test_support;

pub use authorize::{AuthorizeOutcome, AuthorizeRequest, authorize};
pub use cleanup::CleanupWorker;
pub use client_metadata::resolve_client;
pub use error::{OAuthError, OAuthResult};
pub use par::{PushedAuthRequest, PushedAuthResponse, push_authorization_request};
pub use revoke::revoke;
pub use token::{TokenResponse, exchange_code, refresh};
