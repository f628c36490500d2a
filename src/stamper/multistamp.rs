//! Stamping many files in one invocation

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::quorum::{QuorumStamper, StampParams};
use crate::error::{OtsError, OtsResult};
use crate::ots::DetachedTimestampFile;

/// Result of stamping one file
#[derive(Debug)]
pub struct StampOutcome {
    pub name: String,
    pub result: OtsResult<DetachedTimestampFile>,
}

/// Stamp every file independently, at most `max_concurrent` at a time
///
/// Outcomes come back in input order once every file finished. Entries that
/// arrive as errors (e.g. unreadable files) are passed through untouched.
pub async fn multistamp(
    stamper: &QuorumStamper,
    files: Vec<(String, OtsResult<Vec<u8>>)>,
    params: &StampParams,
    max_concurrent: usize,
) -> Vec<StampOutcome> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let params = Arc::new(params.clone());
    let total = files.len();

    let mut names = Vec::with_capacity(total);
    let mut results: Vec<Option<OtsResult<DetachedTimestampFile>>> = Vec::with_capacity(total);
    let mut set = JoinSet::new();

    for (index, (name, contents)) in files.into_iter().enumerate() {
        names.push(name.clone());
        let data = match contents {
            Ok(data) => data,
            Err(e) => {
                results.push(Some(Err(e)));
                continue;
            }
        };
        results.push(None);

        let stamper = stamper.clone();
        let params = Arc::clone(&params);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    tracing::debug!(file = %name, "Stamping file");
                    stamper.stamp_file(&data, &params).await
                }
                Err(_) => Err(OtsError::Internal("stamping limiter closed".into())),
            };
            (index, result)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                match &result {
                    Ok(_) => tracing::info!(file = %names[index], "File stamped"),
                    Err(e) => tracing::warn!(file = %names[index], error = %e, "File not stamped"),
                }
                results[index] = Some(result);
            }
            Err(e) => tracing::error!(error = %e, "Stamping task failed"),
        }
    }

    names
        .into_iter()
        .zip(results)
        .map(|(name, result)| StampOutcome {
            name,
            result: result
                .unwrap_or_else(|| Err(OtsError::Internal("stamping task did not complete".into()))),
        })
        .collect()
}
