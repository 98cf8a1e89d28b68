use accteng_core::traits::EventStore;
use accteng_storage_sqlite::SqliteEventStore;
use tempfile::TempDir;

async fn setup() -> (SqliteEventStore, TempDir) {
    let tempdir = TempDir::new().unwrap();
    let db_path = tempdir.path().join("test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let store = SqliteEventStore::connect(&db_url).await.unwrap();
    (store, tempdir)
}

#[tokio::test]
async fn append_persists_the_given_seq() {
    let (store, _dir) = setup().await;
    store.append_event(1, "commit", b"payload1").await.unwrap();
    let events = store.get_events_after(0, 10).await.unwrap();
    assert_eq!(events[0].seq, 1);
}

#[tokio::test]
async fn sequential_seq() {
    let (store, _dir) = setup().await;
    store.append_event(1, "commit", b"p1").await.unwrap();
    store.append_event(2, "commit", b"p2").await.unwrap();
    store.append_event(3, "identity", b"p3").await.unwrap();

    let events = store.get_events_after(0, 100).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[1].seq > w[0].seq));
}

#[tokio::test]
async fn get_events_after() {
    let (store, _dir) = setup().await;
    store.append_event(1, "commit", b"p1").await.unwrap();
    store.append_event(2, "commit", b"p2").await.unwrap();
    store.append_event(3, "identity", b"p3").await.unwrap();

    let events = store.get_events_after(1, 100).await.unwrap();
    assert_eq!(events.len(), 2, "should get 2 events after seq1");
    assert_eq!(events[0].payload, b"p2");
    assert_eq!(events[1].payload, b"p3");
}

#[tokio::test]
async fn get_events_limit() {
    let (store, _dir) = setup().await;
    for i in 0..5 {
        store
            .append_event(i + 1, "commit", format!("p{i}").as_bytes())
            .await
            .unwrap();
    }

    let events = store.get_events_after(0, 2).await.unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn get_events_empty() {
    let (store, _dir) = setup().await;
    let events = store.get_events_after(0, 100).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn max_seq_initial() {
    let (store, _dir) = setup().await;
    let max = store.get_max_seq().await.unwrap();
    assert_eq!(max, 0);
}

#[tokio::test]
async fn max_seq_after_inserts() {
    let (store, _dir) = setup().await;
    store.append_event(1, "commit", b"p1").await.unwrap();
    store.append_event(2, "commit", b"p2").await.unwrap();
    let max = store.get_max_seq().await.unwrap();
    assert_eq!(max, 2);
}

#[tokio::test]
async fn prune_keeps_only_last_n() {
    let (store, _dir) = setup().await;
    for i in 0..5 {
        store
            .append_event(i + 1, "commit", format!("p{i}").as_bytes())
            .await
            .unwrap();
    }

    let removed = store.prune(2).await.unwrap();
    assert_eq!(removed, 3);
    assert_eq!(store.get_events_after(0, 100).await.unwrap().len(), 2);
}
