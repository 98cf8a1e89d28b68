pub mod auth;
pub mod error;
pub mod firehose;
pub mod lifecycle;
pub mod proxy;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedUser, JwtRefreshSecret, JwtSecret, OptionalAuth};
pub use firehose::relay::{RelayNotifier, RelayNotifierWorker};
pub use firehose::sequencer::Sequencer;
pub use lifecycle::ensure_account;
pub use routes::build_router;
pub use state::EngineState;
