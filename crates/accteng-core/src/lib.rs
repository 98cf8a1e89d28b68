pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use traits::{AccountStore, BlobStore, EventStore, OAuthStore, RepoStore};
pub use traits::event_store::PersistedEvent;
pub use types::{
    AccountStatus, AuthCode, BlobMeta, CommitDescriptor, EngineAccount, OAuthClientMeta,
    OAuthToken, ParRequest, PasskeyCredential, PasskeyToken, RefreshTokenRecord, RepoOpDescriptor,
    RepoState,
};
