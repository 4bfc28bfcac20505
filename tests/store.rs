//! Conversation store integration tests
//!
//! Exercises a file-backed store through the connector with the production
//! pool size, including concurrent appends.

use chat_relay::{Identity, StoreConnector};
use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
use futures::future::join_all;

mod common;
use common::file_store_config;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_appends_for_one_identity_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut connector = StoreConnector::new(file_store_config(&dir.path().join("relay.db")));
    connector.connect().await.unwrap();
    let store = connector.conversations().unwrap();

    let identity = Identity::user_channel("u1", "c1");
    let base = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();

    let appends = (0..40).map(|i| {
        let store = store.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            store
                .append(
                    &identity,
                    &format!("question {i}"),
                    &format!("answer {i}"),
                    base + TimeDelta::seconds(i),
                )
                .await
        })
    });
    for result in join_all(appends).await {
        result.unwrap().unwrap();
    }

    let doc = store.fetch(&identity, None).await.unwrap();
    assert_eq!(doc.len(), 40);
    assert_eq!(doc.buckets.len(), 1);

    let mut messages: Vec<_> = doc.entries().map(|e| e.user_message.clone()).collect();
    messages.sort();
    messages.dedup();
    assert_eq!(messages.len(), 40);

    connector.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_appends_for_different_identities_stay_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut connector = StoreConnector::new(file_store_config(&dir.path().join("relay.db")));
    connector.connect().await.unwrap();
    let store = connector.conversations().unwrap();

    let u1 = Identity::user("u1");
    let u2 = Identity::user("u2");
    let now = Utc::now();

    let appends = (0..20).map(|i| {
        let store = store.clone();
        let identity = if i % 2 == 0 { u1.clone() } else { u2.clone() };
        tokio::spawn(async move {
            let tag = identity.user_id.clone();
            store
                .append(&identity, &format!("{tag} asks {i}"), "ok", now)
                .await
        })
    });
    for result in join_all(appends).await {
        result.unwrap().unwrap();
    }

    for identity in [&u1, &u2] {
        let doc = store.fetch(identity, None).await.unwrap();
        assert_eq!(doc.len(), 10);
        assert!(
            doc.entries()
                .all(|e| e.user_message.starts_with(&format!("{} asks", identity.user_id)))
        );
    }

    connector.close().await.unwrap();
}

#[tokio::test]
async fn append_then_fetch_yields_one_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let mut connector = StoreConnector::new(file_store_config(&dir.path().join("relay.db")));
    connector.connect().await.unwrap();
    let store = connector.conversations().unwrap();

    let identity = Identity::user_channel("u1", "c1");
    let ts = Utc.with_ymd_and_hms(2024, 1, 2, 23, 59, 59).unwrap();
    store.append(&identity, "hello", "hi", ts).await.unwrap();

    let doc = store.fetch(&identity, None).await.unwrap();
    assert_eq!(doc.identity, identity);
    assert_eq!(doc.buckets.len(), 1);
    assert_eq!(
        doc.buckets[0].date,
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    );
    assert_eq!(doc.buckets[0].entries[0].timestamp, ts);

    connector.close().await.unwrap();
}

#[tokio::test]
async fn day_filter_narrows_to_one_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let mut connector = StoreConnector::new(file_store_config(&dir.path().join("relay.db")));
    connector.connect().await.unwrap();
    let store = connector.conversations().unwrap();

    let identity = Identity::user("u1");
    let day_one = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    store.append(&identity, "a", "1", day_one).await.unwrap();
    store
        .append(&identity, "b", "2", day_one + TimeDelta::days(1))
        .await
        .unwrap();

    let doc = store
        .fetch(&identity, Some(day_one.date_naive()))
        .await
        .unwrap();
    assert_eq!(doc.buckets.len(), 1);
    assert_eq!(doc.len(), 1);

    let missing = NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
    assert!(
        store
            .fetch(&identity, Some(missing))
            .await
            .unwrap_err()
            .is_not_found()
    );

    connector.close().await.unwrap();
}

#[tokio::test]
async fn history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_store_config(&dir.path().join("nested").join("relay.db"));
    let identity = Identity::user_channel("u1", "c1");

    let mut connector = StoreConnector::new(config.clone());
    connector.connect().await.unwrap();
    connector
        .conversations()
        .unwrap()
        .append(&identity, "remember me", "noted", Utc::now())
        .await
        .unwrap();
    connector.close().await.unwrap();

    let mut reopened = StoreConnector::new(config);
    reopened.connect().await.unwrap();
    let doc = reopened
        .conversations()
        .unwrap()
        .fetch(&identity, None)
        .await
        .unwrap();
    assert_eq!(doc.len(), 1);
    reopened.close().await.unwrap();
}
