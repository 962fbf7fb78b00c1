//! Poll-loop building blocks
//!
//! One tick is one [`replicate`] call plus the bookkeeping the loop owes
//! it: the duration histogram is observed and the watermark persisted only
//! when the batch was non-empty, and the base height advances one past the
//! new watermark. The binary drives [`poll_tick`] forever; the pieces live
//! here so they stay testable away from the process entrypoint.

use std::time::Instant;

use crate::error::{Error, Result};
use crate::height::BlockHeight;
use crate::metrics::ReplicationMetrics;
use crate::progress::ProgressStore;
use crate::replicate::replicate;
use crate::source::Source;
use crate::target::Target;

/// Resolve the height the loop starts at.
///
/// An explicit `--start-height` wins regardless of stored progress; `-1`
/// resumes one past the stored watermark and refuses a watermark of zero so
/// a mistyped flag cannot trigger a full replay.
pub fn resolve_start_height(start_height: &str, stored: &BlockHeight) -> Result<BlockHeight> {
    if start_height == "-1" {
        if stored.is_zero() {
            return Err(Error::ColdStartRefused);
        }
        return Ok(stored.succ());
    }

    start_height.parse()
}

/// Run one batch and, when it produced blocks, observe its duration and
/// persist the new watermark.
///
/// Returns the new watermark; `None` on an empty batch, which observes and
/// writes nothing.
pub async fn poll_tick(
    source: &Source,
    target: &Target,
    progress: &ProgressStore,
    height: &BlockHeight,
    batch_size: i64,
) -> Result<Option<BlockHeight>> {
    let started = Instant::now();

    let replicated = replicate(source, target, height, batch_size).await?;

    if let Some(max_height) = &replicated {
        // empty batches are not observed into the duration histogram
        ReplicationMetrics::observe_batch_duration(started.elapsed().as_secs_f64());
        progress.write_replicated_height(max_height).await?;
    }

    Ok(replicated)
}

/// Base height for the next tick: one past the new watermark, or unchanged
/// when the batch was empty
pub fn next_height(current: BlockHeight, replicated: Option<&BlockHeight>) -> BlockHeight {
    match replicated {
        Some(max_height) => max_height.succ(),
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_start_height_wins_over_progress() {
        let stored = BlockHeight::from(999);
        let resolved = resolve_start_height("500", &stored).unwrap();
        assert_eq!(resolved, BlockHeight::from(500));
    }

    #[test]
    fn test_explicit_zero_is_permitted() {
        let resolved = resolve_start_height("0", &BlockHeight::zero()).unwrap();
        assert!(resolved.is_zero());
    }

    #[test]
    fn test_resume_refuses_zero_watermark() {
        let err = resolve_start_height("-1", &BlockHeight::zero()).unwrap_err();
        assert!(matches!(err, Error::ColdStartRefused));
    }

    #[test]
    fn test_resume_starts_one_past_watermark() {
        let stored = BlockHeight::from(41);
        let resolved = resolve_start_height("-1", &stored).unwrap();
        assert_eq!(resolved, BlockHeight::from(42));
    }

    #[test]
    fn test_resume_handles_watermarks_past_u64() {
        let stored: BlockHeight = "340282366920938463463374607431768211456".parse().unwrap();
        let resolved = resolve_start_height("-1", &stored).unwrap();
        assert_eq!(resolved, stored.succ());
    }

    #[test]
    fn test_garbage_start_height_is_rejected() {
        assert!(resolve_start_height("abc", &BlockHeight::zero()).is_err());
        // -1 is the only accepted negative sentinel
        assert!(resolve_start_height("-2", &BlockHeight::zero()).is_err());
    }

    #[test]
    fn test_next_height_is_unchanged_on_empty_batch() {
        let current = BlockHeight::from(7);
        assert_eq!(next_height(current.clone(), None), current);
    }

    #[test]
    fn test_next_height_advances_past_watermark() {
        let max_height = BlockHeight::from(110);
        assert_eq!(
            next_height(BlockHeight::from(100), Some(&max_height)),
            BlockHeight::from(111)
        );
    }
}
