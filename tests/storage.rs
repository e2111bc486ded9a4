mod common;

use chrono::Utc;
use common::{comment_article, setup_store, topic_article};
use lornews::article::LorId;
use lornews::error::StoreError;
use lornews::overview::overview_record;
use lornews::storage::Mode;

const GROUP: &str = "lor.forum.talks";

/// `count`/`min`/`max` must describe exactly the live numbers.
async fn assert_invariants(store: &lornews::storage::Store) {
    let mut idx = store.open_index(GROUP, Mode::Read).await.unwrap().unwrap();
    let status = idx.status();
    let live = idx.scan(None).await.unwrap();
    assert_eq!(status.count, live.len() as u64, "count matches live keys");
    if status.count > 0 {
        assert_eq!(status.min, live[0], "min is the lowest live number");
        assert!(status.max >= *live.last().unwrap());
        assert!(status.max - status.min + 1 >= status.count);
    } else {
        assert_eq!(status.min, status.max + 1, "empty group has min == max+1");
    }
    idx.close().await.unwrap();
}

#[tokio::test]
async fn append_and_expire_keep_invariants() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);

    let mut idx = store.create_index(GROUP).await.unwrap();
    for topic in [100u64, 200, 300] {
        idx.append(
            &LorId::topic(topic),
            &topic_article(GROUP, topic, "subj", "body\n"),
        )
        .await
        .unwrap();
    }
    idx.close().await.unwrap();
    assert_invariants(&store).await;

    // expire everything, append again, expire again
    let mut idx = store.open_index(GROUP, Mode::ReadWrite).await.unwrap().unwrap();
    let deleted = idx.expire(None).await.unwrap();
    assert_eq!(deleted, 3);
    idx.close().await.unwrap();
    assert_invariants(&store).await;

    let mut idx = store.create_index(GROUP).await.unwrap();
    idx.append(
        &LorId::topic(400),
        &topic_article(GROUP, 400, "subj", "body\n"),
    )
    .await
    .unwrap();
    idx.close().await.unwrap();
    assert_invariants(&store).await;
}

#[tokio::test]
async fn numbering_is_monotone_and_never_reused() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);

    let mut idx = store.create_index(GROUP).await.unwrap();
    let n1 = idx
        .append(&LorId::topic(1), &topic_article(GROUP, 1, "a", "b\n"))
        .await
        .unwrap();
    let n2 = idx
        .append(&LorId::topic(2), &topic_article(GROUP, 2, "a", "b\n"))
        .await
        .unwrap();
    assert_eq!((n1, n2), (1, 2));
    idx.expire(None).await.unwrap();
    let n3 = idx
        .append(&LorId::topic(3), &topic_article(GROUP, 3, "a", "b\n"))
        .await
        .unwrap();
    assert_eq!(n3, 3, "expired numbers are never reassigned");
    let status = idx.status();
    assert_eq!((status.count, status.min, status.max), (1, 3, 3));
    idx.close().await.unwrap();
}

#[tokio::test]
async fn expiry_preserves_numbering() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);
    let now = Utc::now().timestamp();

    let mut idx = store.create_index(GROUP).await.unwrap();
    for (i, topic) in [10u64, 20, 30, 40, 50].iter().enumerate() {
        // the first three are ten days old, the last two fresh
        let age = if i < 3 { 10 * 86400 } else { 0 };
        idx.append_with_time(
            &LorId::topic(*topic),
            &topic_article(GROUP, *topic, "subj", "body\n"),
            now - age,
        )
        .await
        .unwrap();
    }
    let deleted = idx.expire(Some(now - 86400)).await.unwrap();
    assert_eq!(deleted, 3);
    let status = idx.status();
    assert_eq!((status.count, status.min, status.max), (2, 4, 5));
    assert_eq!(idx.scan(None).await.unwrap(), vec![4, 5]);

    let n = idx
        .append(&LorId::topic(60), &topic_article(GROUP, 60, "s", "b\n"))
        .await
        .unwrap();
    assert_eq!(n, 6);
    idx.close().await.unwrap();

    // the expired article files are gone, the live ones remain
    assert!(!tmp.path().join("news/lor/forum/talks/10").exists());
    assert!(tmp.path().join("news/lor/forum/talks/40/0").exists());
}

#[tokio::test]
async fn expire_stops_at_first_fresh_article() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);
    let now = Utc::now().timestamp();

    let mut idx = store.create_index(GROUP).await.unwrap();
    // old, fresh, old: the trailing old one survives because the walk
    // stops at the first fresh article
    for (topic, age) in [(1u64, 10 * 86400), (2, 0), (3, 10 * 86400)] {
        idx.append_with_time(
            &LorId::topic(topic),
            &topic_article(GROUP, topic, "s", "b\n"),
            now - age,
        )
        .await
        .unwrap();
    }
    let deleted = idx.expire(Some(now - 86400)).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(idx.scan(None).await.unwrap(), vec![2, 3]);
    assert_eq!(idx.status().min, 2);
    idx.close().await.unwrap();
}

#[tokio::test]
async fn topic_counter_tracks_live_articles() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);

    let mut idx = store.create_index(GROUP).await.unwrap();
    idx.append(
        &LorId::topic(12345),
        &topic_article(GROUP, 12345, "s", "b\n"),
    )
    .await
    .unwrap();
    idx.append(
        &LorId::comment(12345, 678),
        &comment_article(GROUP, 12345, 678, "Re: s", "r\n"),
    )
    .await
    .unwrap();
    assert_eq!(idx.topic_count(12345).await.unwrap(), 2);

    idx.expire(None).await.unwrap();
    assert_eq!(idx.topic_count(12345).await.unwrap(), 0);
    idx.close().await.unwrap();
    // freeing the last article removed the topic directory
    assert!(!tmp.path().join("news/lor/forum/talks/12345").exists());
}

#[tokio::test]
async fn message_id_lookup_agrees_with_number_lookup() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);

    let mut idx = store.create_index(GROUP).await.unwrap();
    let id = LorId::comment(12345, 678);
    idx.append(
        &LorId::topic(12345),
        &topic_article(GROUP, 12345, "s", "b\n"),
    )
    .await
    .unwrap();
    let n = idx
        .append(&id, &comment_article(GROUP, 12345, 678, "Re: s", "r\n"))
        .await
        .unwrap();
    let path_by_number = idx.article_path(n).await.unwrap().unwrap();
    idx.close().await.unwrap();

    let hit = store.find_message(&id).await.unwrap().unwrap();
    assert_eq!(hit.group, GROUP);
    assert_eq!(hit.number, n);
    assert_eq!(hit.path, path_by_number);

    assert!(
        store
            .find_message(&LorId::topic(99999))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn overview_regenerates_from_article_file() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);

    let mut idx = store.create_index(GROUP).await.unwrap();
    let article = topic_article(GROUP, 12345, "Тема с юникодом", "body line\nsecond\n");
    let n = idx.append(&LorId::topic(12345), &article).await.unwrap();
    let stored = idx.overview(n).await.unwrap().unwrap();
    let path = idx.article_path(n).await.unwrap().unwrap();
    idx.close().await.unwrap();

    let reread = store.read_article_at(&path).await.unwrap();
    assert_eq!(overview_record(&reread), stored);
}

#[tokio::test]
async fn never_pulled_group_reads_as_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);
    assert!(
        store
            .open_index(GROUP, Mode::Read)
            .await
            .unwrap()
            .is_none()
    );
    let status = store.group_status(GROUP).await.unwrap();
    assert_eq!((status.count, status.min, status.max), (0, 1, 0));
}

#[tokio::test]
async fn truncated_overview_record_is_corruption() {
    use sqlx::ConnectOptions;

    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);
    let mut idx = store.create_index(GROUP).await.unwrap();
    let n = idx
        .append(&LorId::topic(1), &topic_article(GROUP, 1, "s", "b\n"))
        .await
        .unwrap();
    idx.close().await.unwrap();

    // tear the record down to three fields behind the store's back
    let index_path = tmp.path().join("news/lor/forum/talks/index");
    let mut conn = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&index_path)
        .connect()
        .await
        .unwrap();
    sqlx::query("UPDATE kv SET v = 'a\tb\tc' WHERE k = ':1'")
        .execute(&mut conn)
        .await
        .unwrap();
    sqlx::Connection::close(conn).await.unwrap();

    let mut idx = store.open_index(GROUP, Mode::Read).await.unwrap().unwrap();
    let err = match idx.overview(n).await {
        Err(e) => e,
        Ok(_) => panic!("truncated overview should be reported corrupt"),
    };
    assert!(
        matches!(err, StoreError::CorruptOverview { number: 1, .. }),
        "{err}"
    );
    idx.close().await.unwrap();
}

#[tokio::test]
async fn corrupt_status_is_a_broken_index() {
    use sqlx::ConnectOptions;

    let tmp = tempfile::tempdir().unwrap();
    let store = setup_store(&tmp);
    let mut idx = store.create_index(GROUP).await.unwrap();
    idx.append(&LorId::topic(1), &topic_article(GROUP, 1, "s", "b\n"))
        .await
        .unwrap();
    idx.close().await.unwrap();

    // break count behind the store's back
    let index_path = tmp.path().join("news/lor/forum/talks/index");
    let mut conn = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&index_path)
        .connect()
        .await
        .unwrap();
    sqlx::query("UPDATE kv SET v = '7' WHERE k = 'count'")
        .execute(&mut conn)
        .await
        .unwrap();
    sqlx::Connection::close(conn).await.unwrap();

    let err = match store.open_index(GROUP, Mode::Read).await {
        Err(e) => e,
        Ok(_) => panic!("index should be reported broken"),
    };
    assert!(matches!(err, StoreError::BrokenIndex { .. }), "{err}");
}
