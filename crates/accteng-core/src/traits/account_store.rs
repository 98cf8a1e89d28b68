use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{EngineAccount, RefreshTokenRecord};

/// Storage for the single account row and its refresh tokens. Narrowed from
/// a multi-tenant CRUD surface down to the operations a one-account engine
/// actually performs: load the account at lazy-init, flip its activation
/// flag, rotate its password hash, manage refresh tokens.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    async fn get_account(&self) -> EngineResult<Option<EngineAccount>>;
    async fn init_account(&self, account: &EngineAccount) -> EngineResult<()>;
    async fn update_password(&self, password_hash: &str) -> EngineResult<()>;
    async fn deactivate_account(&self) -> EngineResult<()>;
    async fn activate_account(&self) -> EngineResult<()>;
    async fn update_handle(&self, handle: &str) -> EngineResult<()>;
    /// Remove the account row and all its refresh tokens. The caller is
    /// responsible for clearing repo blocks and blobs separately.
    async fn delete_account(&self) -> EngineResult<()>;

    async fn create_refresh_token(&self, token: &RefreshTokenRecord) -> EngineResult<()>;
    async fn get_refresh_token(&self, id: &str) -> EngineResult<Option<RefreshTokenRecord>>;
    async fn delete_refresh_token(&self, id: &str) -> EngineResult<()>;
    async fn delete_all_refresh_tokens(&self) -> EngineResult<u64>;
}
