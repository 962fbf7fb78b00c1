//! Batch planner and driver
//!
//! One call to [`replicate`] produces at most `limit` blocks and every row
//! that depends on them, preserving referential closure at batch
//! granularity: blocks stream first while their hashes are captured, then
//! transactions and receipts stream serially because their keys feed the
//! remaining queries, then every other dependent table loads concurrently.
//!
//! The parent-child edges are domain facts and are spelled out verbatim in
//! the fan-out plan below; nothing is inferred.

use std::sync::Arc;

use futures_util::{pin_mut, TryStreamExt};
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::height::BlockHeight;
use crate::loader::Loader;
use crate::metrics::ReplicationMetrics;
use crate::models::{
    AccessKey, Account, AccountChange, ActionReceipt, ActionReceiptAction, ActionReceiptInputData,
    ActionReceiptOutputData, Block, Chunk, DataReceipt, Entity, ExecutionOutcome,
    ExecutionOutcomeReceipt, Receipt, Transaction, TransactionAction, REGISTRY,
};
use crate::source::Source;
use crate::target::Target;

/// Dependent tables loaded concurrently once the key sets are known
pub(crate) const FANOUT_TABLES: usize = 12;

const COUNT_BLOCKS: &str = "SELECT count(*) FROM blocks WHERE block_height >= $1::numeric";

// tokio-postgres wants an iterator of borrowed params for query_raw
fn slice_iter<'a>(
    s: &'a [&'a (dyn ToSql + Sync)],
) -> impl ExactSizeIterator<Item = &'a dyn ToSql> + 'a {
    s.iter().map(|s| *s as _)
}

/// SELECT over a table's registry columns with a predicate
fn select_query(table: &str, predicate: &str) -> String {
    let descriptor = REGISTRY.expect(table);
    format!(
        "SELECT {} FROM {} WHERE {}",
        descriptor.select_list(),
        table,
        predicate
    )
}

/// Stream one query's rows into the loader, optionally collecting keys for
/// a downstream pass
async fn copy_table<E: Entity>(
    loader: &Loader,
    source: &Source,
    collect_keys: bool,
    query: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<String>> {
    loader.touch(E::TABLE)?;

    let client = source.client().await?;
    let rows = client.query_raw(query, slice_iter(params)).await?;
    pin_mut!(rows);

    let mut keys = Vec::new();
    while let Some(row) = rows.try_next().await? {
        let entity = E::from_row(&row)?;
        loader.write_row(E::TABLE, entity.record()).await?;
        if collect_keys {
            keys.push(entity.key());
        }
        ReplicationMetrics::incr_replicated_rows();
    }
    Ok(keys)
}

enum FanParam {
    Height(String),
    Keys(Arc<Vec<String>>),
}

struct FanOut {
    loader: Arc<Loader>,
    source: Source,
    results: mpsc::Sender<(&'static str, Result<()>)>,
    launched: usize,
}

impl FanOut {
    /// Launch one dependent-table task; it publishes exactly one result
    fn spawn<E: Entity>(&mut self, predicate: &'static str, param: FanParam) {
        self.launched += 1;
        let query = select_query(E::TABLE, predicate);
        let loader = Arc::clone(&self.loader);
        let source = self.source.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            let outcome = match &param {
                FanParam::Height(height) => {
                    let params: [&(dyn ToSql + Sync); 1] = [height];
                    copy_table::<E>(&loader, &source, false, &query, &params).await
                }
                FanParam::Keys(keys) => {
                    let params: [&(dyn ToSql + Sync); 1] = [&**keys];
                    copy_table::<E>(&loader, &source, false, &query, &params).await
                }
            }
            .map(drop);
            let _ = results.send((E::TABLE, outcome)).await;
        });
    }
}

/// Replicate one batch starting at `base_height`.
///
/// Returns the highest block height handled, or `None` when the source has
/// no blocks at or above `base_height`. Progress is the caller's to persist;
/// on any error the batch is abandoned and the previous watermark stands.
pub async fn replicate(
    source: &Source,
    target: &Target,
    base_height: &BlockHeight,
    limit: i64,
) -> Result<Option<BlockHeight>> {
    let base = base_height.to_string();

    let client = source.client().await?;
    let row = client.query_one(COUNT_BLOCKS, &[&base]).await?;
    let block_count: i64 = row.try_get(0)?;
    if block_count == 0 {
        return Ok(None);
    }
    drop(client);

    let loader = Arc::new(Loader::new(target.pool(), &REGISTRY));

    // Root pass: stream blocks, capturing their hashes and the running
    // maximum height that becomes the new watermark on success.
    loader.touch(Block::TABLE)?;
    let blocks_query = format!(
        "{} ORDER BY block_height ASC LIMIT $2",
        select_query(Block::TABLE, "block_height >= $1::numeric")
    );
    let mut block_hashes = Vec::new();
    let mut max_height: Option<BlockHeight> = None;
    {
        let client = source.client().await?;
        let params: [&(dyn ToSql + Sync); 2] = [&base, &limit];
        let rows = client.query_raw(&blocks_query, slice_iter(&params)).await?;
        pin_mut!(rows);
        while let Some(row) = rows.try_next().await? {
            let block = Block::from_row(&row)?;
            loader.write_row(Block::TABLE, block.record()).await?;
            max_height = Some(block.block_height.parse()?);
            block_hashes.push(block.key());
            ReplicationMetrics::incr_replicated_rows();
            ReplicationMetrics::incr_replicated_blocks();
        }
    }

    ReplicationMetrics::set_batch_size(block_hashes.len());
    debug!(blocks = block_hashes.len(), base = %base_height, "streaming batch");

    let block_hashes = Arc::new(block_hashes);

    // Serial passes: transaction hashes and receipt ids parameterize the
    // fan-out, so these two cannot overlap with it.
    let transaction_hashes = {
        let params: [&(dyn ToSql + Sync); 1] = [&*block_hashes];
        copy_table::<Transaction>(
            &loader,
            source,
            true,
            &select_query(Transaction::TABLE, "included_in_block_hash = ANY($1)"),
            &params,
        )
        .await?
    };
    let receipt_ids = {
        let params: [&(dyn ToSql + Sync); 1] = [&*block_hashes];
        copy_table::<Receipt>(
            &loader,
            source,
            true,
            &select_query(Receipt::TABLE, "included_in_block_hash = ANY($1)"),
            &params,
        )
        .await?
    };

    let transaction_hashes = Arc::new(transaction_hashes);
    let receipt_ids = Arc::new(receipt_ids);

    // Fan-out: every remaining dependent table, one concurrent task each.
    let (results, mut outcomes) = mpsc::channel(FANOUT_TABLES);
    let mut fan_out = FanOut {
        loader: Arc::clone(&loader),
        source: source.clone(),
        results,
        launched: 0,
    };

    fan_out.spawn::<AccessKey>(
        "last_update_block_height >= $1::numeric",
        FanParam::Height(base.clone()),
    );
    fan_out.spawn::<AccountChange>(
        "changed_in_block_hash = ANY($1)",
        FanParam::Keys(Arc::clone(&block_hashes)),
    );
    fan_out.spawn::<Account>(
        "last_update_block_height >= $1::numeric",
        FanParam::Height(base.clone()),
    );
    fan_out.spawn::<ActionReceiptAction>(
        "receipt_id = ANY($1)",
        FanParam::Keys(Arc::clone(&receipt_ids)),
    );
    fan_out.spawn::<ActionReceiptInputData>(
        "input_to_receipt_id = ANY($1)",
        FanParam::Keys(Arc::clone(&receipt_ids)),
    );
    fan_out.spawn::<ActionReceiptOutputData>(
        "output_from_receipt_id = ANY($1)",
        FanParam::Keys(Arc::clone(&receipt_ids)),
    );
    fan_out.spawn::<ActionReceipt>(
        "receipt_id = ANY($1)",
        FanParam::Keys(Arc::clone(&receipt_ids)),
    );
    fan_out.spawn::<Chunk>(
        "included_in_block_hash = ANY($1)",
        FanParam::Keys(Arc::clone(&block_hashes)),
    );
    fan_out.spawn::<DataReceipt>(
        "receipt_id = ANY($1)",
        FanParam::Keys(Arc::clone(&receipt_ids)),
    );
    fan_out.spawn::<ExecutionOutcomeReceipt>(
        "executed_receipt_id = ANY($1) OR produced_receipt_id = ANY($1)",
        FanParam::Keys(Arc::clone(&receipt_ids)),
    );
    fan_out.spawn::<ExecutionOutcome>(
        "executed_in_block_hash = ANY($1)",
        FanParam::Keys(Arc::clone(&block_hashes)),
    );
    fan_out.spawn::<TransactionAction>(
        "transaction_hash = ANY($1)",
        FanParam::Keys(Arc::clone(&transaction_hashes)),
    );

    let launched = fan_out.launched;
    drop(fan_out);
    debug_assert_eq!(launched, FANOUT_TABLES);

    // Exactly one result per launched task; log every error, keep the last.
    let mut last_error = None;
    for _ in 0..launched {
        let (table, outcome) = outcomes
            .recv()
            .await
            .expect("fan-out task dropped its result sender - this is a bug");
        if let Err(e) = outcome {
            error!(table, error = %e, "failed to replicate table");
            last_error = Some(e);
        }
    }
    if let Some(e) = last_error {
        // The loader's streams are released when it drops; progress is not
        // advanced past a broken batch.
        return Err(e);
    }

    loader.close().await?;
    completeness_check(&loader)?;

    Ok(max_height)
}

/// Reject the batch when any declared table was never driven; committing
/// progress past it would silently stop replicating that table.
fn completeness_check(loader: &Loader) -> Result<()> {
    let untouched = loader.untouched_tables();
    if untouched.is_empty() {
        return Ok(());
    }

    Err(Error::IncompleteReplication {
        tables: untouched.iter().map(|t| t.to_string()).collect(),
    })
}
