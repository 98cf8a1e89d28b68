use accteng_core::error::{EngineError, EngineResult};
use accteng_core::types::{AccountStatus, EngineAccount};

use crate::state::EngineState;

/// Lazily create the singleton account and its empty repo on first boot.
///
/// Idempotent: if `AccountStore::get_account` already returns a row, this is
/// a no-op. Takes `write_lock` so a racing second boot (e.g. two replicas
/// starting against the same database) can't both try to create the genesis
/// commit.
pub async fn ensure_account(state: &EngineState) -> EngineResult<()> {
    let _guard = state.write_lock.lock().await;

    if state.account_store.get_account().await?.is_some() {
        return Ok(());
    }

    let key_bytes = hex::decode(&state.config.signing_key)
        .map_err(|e| EngineError::InternalError(format!("invalid signing_key hex: {e}")))?;
    let signing_key = accteng_crypto::SigningKey::from_bytes("p256", &key_bytes)?;

    let status = if state.config.initial_active {
        AccountStatus::Active
    } else {
        AccountStatus::Deactivated
    };

    let account = EngineAccount {
        did: state.config.did.clone(),
        handle: state.config.handle.clone(),
        password_hash: state
            .config
            .password_hash
            .clone()
            .unwrap_or_else(|| "!".to_string()),
        signing_key: key_bytes,
        created_at: chrono::Utc::now(),
        status,
        deactivated_at: None,
    };
    state.account_store.init_account(&account).await?;

    let genesis = accteng_repo::create_repo(state.repo_store.clone(), &account.did, &signing_key).await?;
    state
        .repo_store
        .apply_commit(
            &account.did,
            &genesis.commit_cid,
            &genesis.rev,
            &genesis.new_blocks,
            &genesis.removed_cids,
        )
        .await?;
    state.repo_store.set_active(&account.did, status == AccountStatus::Active).await?;

    tracing::info!(did = %account.did, "initialized singleton account and genesis repo");
    Ok(())
}
