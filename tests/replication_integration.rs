//! End-to-end replication tests
//!
//! These tests require live PostgreSQL and SingleStore instances carrying
//! the analytics schema (source tables on PostgreSQL, target tables plus
//! `replication_meta` on SingleStore). They are `#[ignore]`d by default.
//!
//! Run explicitly with:
//!   cargo test --test replication_integration -- --ignored --test-threads=1
//!
//! Connection parameters come from the environment:
//!   CHAINSINK_TEST_PG_HOST / _PORT / _USER / _PASSWORD / _DATABASE
//!   CHAINSINK_TEST_SDB_HOST / _PORT / _USER / _PASSWORD / _DATABASE

use chainsink::config::ConnectionConfig;
use chainsink::height::BlockHeight;
use chainsink::progress::ProgressStore;
use chainsink::replicate;
use chainsink::runner;
use chainsink::source::Source;
use chainsink::target::Target;
use mysql_async::prelude::Queryable;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn postgres_config() -> ConnectionConfig {
    ConnectionConfig {
        host: env_or("CHAINSINK_TEST_PG_HOST", "127.0.0.1"),
        port: env_or("CHAINSINK_TEST_PG_PORT", "5432").parse().unwrap(),
        user: env_or("CHAINSINK_TEST_PG_USER", "postgres"),
        password: env_or("CHAINSINK_TEST_PG_PASSWORD", "postgres"),
        database: env_or("CHAINSINK_TEST_PG_DATABASE", "chainsink_test"),
    }
}

fn singlestore_config() -> ConnectionConfig {
    ConnectionConfig {
        host: env_or("CHAINSINK_TEST_SDB_HOST", "127.0.0.1"),
        port: env_or("CHAINSINK_TEST_SDB_PORT", "3306").parse().unwrap(),
        user: env_or("CHAINSINK_TEST_SDB_USER", "root"),
        password: env_or("CHAINSINK_TEST_SDB_PASSWORD", ""),
        database: env_or("CHAINSINK_TEST_SDB_DATABASE", "chainsink_test"),
    }
}

async fn connect() -> (Source, Target, ProgressStore) {
    let source = Source::connect(&postgres_config()).await.unwrap();
    let target = Target::connect(&singlestore_config()).await.unwrap();
    let progress = ProgressStore::new(&target);
    (source, target, progress)
}

async fn reset_progress(target: &Target, height: &str) {
    let mut conn = target.pool().get_conn().await.unwrap();
    conn.query_drop("DELETE FROM replication_meta").await.unwrap();
    conn.exec_drop("REPLACE INTO replication_meta VALUES (?)", (height,))
        .await
        .unwrap();
}

async fn count_rows(target: &Target, table: &str) -> u64 {
    let mut conn = target.pool().get_conn().await.unwrap();
    let count: Option<u64> = conn
        .query_first(format!("SELECT count(*) FROM {table}"))
        .await
        .unwrap();
    count.unwrap()
}

#[tokio::test]
#[ignore = "requires live PostgreSQL and SingleStore; run with --ignored"]
async fn test_progress_roundtrip() {
    let (_source, target, progress) = connect().await;
    reset_progress(&target, "0").await;

    let height: BlockHeight = "9000000000000000000000".parse().unwrap();
    progress.write_replicated_height(&height).await.unwrap();
    assert_eq!(progress.read_max_replicated_height().await.unwrap(), height);

    // last writer wins, including smaller heights
    let next = height.succ();
    progress.write_replicated_height(&next).await.unwrap();
    assert_eq!(progress.read_max_replicated_height().await.unwrap(), next);
}

#[tokio::test]
#[ignore = "requires live PostgreSQL and SingleStore; run with --ignored"]
async fn test_empty_batch_returns_none_and_keeps_progress() {
    let (source, target, progress) = connect().await;
    reset_progress(&target, "7").await;
    let before = progress.read_max_replicated_height().await.unwrap();

    // far past any seeded block
    let base: BlockHeight = "99999999999999999999".parse().unwrap();
    let replicated = replicate(&source, &target, &base, 100).await.unwrap();

    assert!(replicated.is_none());
    assert_eq!(progress.read_max_replicated_height().await.unwrap(), before);
}

#[tokio::test]
#[ignore = "requires live PostgreSQL and SingleStore; run with --ignored"]
async fn test_empty_batch_ticks_write_no_duplicate_watermark() {
    let (source, target, progress) = connect().await;
    reset_progress(&target, "7").await;
    let before = progress.read_max_replicated_height().await.unwrap();

    // Two consecutive ticks through the poll-loop path on an empty batch:
    // neither may observe a duration or touch the watermark.
    let base: BlockHeight = "99999999999999999999".parse().unwrap();
    for _ in 0..2 {
        let replicated = runner::poll_tick(&source, &target, &progress, &base, 100)
            .await
            .unwrap();
        assert!(replicated.is_none());
    }

    assert_eq!(progress.read_max_replicated_height().await.unwrap(), before);
}

#[tokio::test]
#[ignore = "requires live PostgreSQL and SingleStore; run with --ignored"]
async fn test_single_block_batch_replicates_closure() {
    let (source, target, progress) = connect().await;
    reset_progress(&target, "0").await;

    // Seed one block with one transaction, one receipt and one action.
    let client = source.client().await.unwrap();
    client
        .batch_execute(
            r#"
            TRUNCATE blocks, chunks, transactions, receipts, transaction_actions,
                     action_receipts, action_receipt_actions CASCADE;
            INSERT INTO blocks VALUES
                (500, 'b500', 'b499', 1600000000000000000, 1000000, 100, 'val.near');
            INSERT INTO transactions VALUES
                ('tx1', 'b500', 'c500', 0, 1600000000000000000, 'alice.near',
                 'ed25519:pk', 1, 'bob.near', 'sig', 'SUCCESS_VALUE', 'r1', 100, 100);
            INSERT INTO receipts VALUES
                ('r1', 'b500', 'c500', 0, 1600000000000000000, 'alice.near',
                 'bob.near', 'ACTION', 'tx1');
            INSERT INTO transaction_actions VALUES
                ('tx1', 0, 'TRANSFER', '{"deposit": "1"}');
            "#,
        )
        .await
        .unwrap();
    drop(client);

    let base: BlockHeight = "500".parse().unwrap();
    let replicated = replicate(&source, &target, &base, 100).await.unwrap();
    assert_eq!(replicated, Some("500".parse().unwrap()));

    assert_eq!(count_rows(&target, "blocks").await, 1);
    assert_eq!(count_rows(&target, "transactions").await, 1);
    assert_eq!(count_rows(&target, "receipts").await, 1);
    assert_eq!(count_rows(&target, "transaction_actions").await, 1);

    // replaying the same batch leaves the same rows (REPLACE semantics)
    let replayed = replicate(&source, &target, &base, 100).await.unwrap();
    assert_eq!(replayed, Some("500".parse().unwrap()));
    assert_eq!(count_rows(&target, "blocks").await, 1);
    assert_eq!(count_rows(&target, "transactions").await, 1);

    progress
        .write_replicated_height(&replicated.unwrap())
        .await
        .unwrap();
    assert_eq!(
        progress.read_max_replicated_height().await.unwrap(),
        "500".parse().unwrap()
    );
}

#[tokio::test]
#[ignore = "requires live PostgreSQL and SingleStore; run with --ignored"]
async fn test_failed_load_leaves_progress_unchanged() {
    let (source, target, progress) = connect().await;
    reset_progress(&target, "7").await;
    let before = progress.read_max_replicated_height().await.unwrap();

    // Break one fan-out table on the target; its LOAD session must fail and
    // the batch must be abandoned without touching the watermark.
    {
        let mut conn = target.pool().get_conn().await.unwrap();
        conn.query_drop("ALTER TABLE chunks RENAME TO chunks_broken")
            .await
            .unwrap();
    }

    let base: BlockHeight = "0".parse().unwrap();
    let result = replicate(&source, &target, &base, 10).await;

    {
        let mut conn = target.pool().get_conn().await.unwrap();
        conn.query_drop("ALTER TABLE chunks_broken RENAME TO chunks")
            .await
            .unwrap();
    }

    assert!(result.is_err());
    assert_eq!(progress.read_max_replicated_height().await.unwrap(), before);
}
