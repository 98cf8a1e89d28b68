use accteng_core::traits::AccountStore;
use accteng_core::types::{AccountStatus, EngineAccount, RefreshTokenRecord};
use accteng_storage_sqlite::SqliteAccountStore;
use tempfile::TempDir;

async fn setup() -> (SqliteAccountStore, TempDir) {
    let tempdir = TempDir::new().unwrap();
    let db_path = tempdir.path().join("test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let store = SqliteAccountStore::connect(&db_url).await.unwrap();
    (store, tempdir)
}

fn test_account() -> EngineAccount {
    EngineAccount {
        did: "did:web:example.com".to_string(),
        handle: "example.com".to_string(),
        password_hash: "$argon2id$v=19$m=65536,t=3,p=4$fakesalt$fakehash".to_string(),
        signing_key: vec![1, 2, 3, 4],
        created_at: chrono::Utc::now(),
        status: AccountStatus::Active,
        deactivated_at: None,
    }
}

#[tokio::test]
async fn init_and_get_account() {
    let (store, _dir) = setup().await;
    store.init_account(&test_account()).await.unwrap();

    let account = store.get_account().await.unwrap().unwrap();
    assert_eq!(account.did, "did:web:example.com");
    assert_eq!(account.status, AccountStatus::Active);
}

#[tokio::test]
async fn get_account_before_init_returns_none() {
    let (store, _dir) = setup().await;
    assert!(store.get_account().await.unwrap().is_none());
}

#[tokio::test]
async fn update_password() {
    let (store, _dir) = setup().await;
    store.init_account(&test_account()).await.unwrap();
    store.update_password("new-hash").await.unwrap();

    let account = store.get_account().await.unwrap().unwrap();
    assert_eq!(account.password_hash, "new-hash");
}

#[tokio::test]
async fn deactivate_and_activate() {
    let (store, _dir) = setup().await;
    store.init_account(&test_account()).await.unwrap();

    store.deactivate_account().await.unwrap();
    let account = store.get_account().await.unwrap().unwrap();
    assert_eq!(account.status, AccountStatus::Deactivated);
    assert!(account.deactivated_at.is_some());

    store.activate_account().await.unwrap();
    let account = store.get_account().await.unwrap().unwrap();
    assert_eq!(account.status, AccountStatus::Active);
    assert!(account.deactivated_at.is_none());
}

#[tokio::test]
async fn refresh_token_crud() {
    let (store, _dir) = setup().await;
    store.init_account(&test_account()).await.unwrap();

    let token = RefreshTokenRecord {
        id: "tok-1".to_string(),
        expires_at: chrono::Utc::now() + chrono::Duration::days(90),
        next_id: None,
    };
    store.create_refresh_token(&token).await.unwrap();

    let fetched = store.get_refresh_token("tok-1").await.unwrap();
    assert!(fetched.is_some());

    store.delete_refresh_token("tok-1").await.unwrap();
    assert!(store.get_refresh_token("tok-1").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_all_refresh_tokens() {
    let (store, _dir) = setup().await;
    store.init_account(&test_account()).await.unwrap();

    for i in 0..3 {
        let token = RefreshTokenRecord {
            id: format!("tok-{i}"),
            expires_at: chrono::Utc::now() + chrono::Duration::days(90),
            next_id: None,
        };
        store.create_refresh_token(&token).await.unwrap();
    }

    let deleted = store.delete_all_refresh_tokens().await.unwrap();
    assert_eq!(deleted, 3);
    assert!(store.get_refresh_token("tok-0").await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_token_get_nonexistent() {
    let (store, _dir) = setup().await;
    assert!(store.get_refresh_token("does-not-exist").await.unwrap().is_none());
}
