use patchwork_core::DocUrl;
use patchwork_derive::{ChangeGroup, Datatype};
use patchwork_ledger::DocHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::completion::TextCompletion;
use crate::populate::populate_change_group_summaries;

/// Default quiet period before a scheduled summarization starts.
pub const DEFAULT_QUIET: Duration = Duration::from_secs(5);

/// Live task per document: its id and cancellation token.
type Pending = Mutex<HashMap<DocUrl, (u64, CancellationToken)>>;

/// Debounced background summarization, at most one live task per document.
///
/// Scheduling a document cancels whatever was pending or running for it.
/// A task waits for the quiet period, then summarizes the groups it was
/// given and writes the results back into the document. A finished task
/// drops its own entry; it never touches the entry of a task that
/// superseded it.
pub struct SummaryScheduler {
    completion: Arc<dyn TextCompletion>,
    datatype: Arc<dyn Datatype>,
    quiet: Duration,
    next_id: AtomicU64,
    pending: Arc<Pending>,
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, HashMap<DocUrl, (u64, CancellationToken)>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Remove `url`'s entry if it still belongs to task `id`.
fn release(pending: &Pending, url: &str, id: u64) {
    let mut pending = lock(pending);
    if pending.get(url).is_some_and(|(current, _)| *current == id) {
        pending.remove(url);
    }
}

impl SummaryScheduler {
    pub fn new(completion: Arc<dyn TextCompletion>, datatype: Arc<dyn Datatype>, quiet: Duration) -> Self {
        Self {
            completion,
            datatype,
            quiet,
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a debounced summarization of `groups` for `handle`.
    /// Must be called from within a tokio runtime. The task yields the
    /// number of summaries written.
    pub fn schedule(&self, handle: DocHandle, groups: Vec<ChangeGroup>, force: bool) -> JoinHandle<usize> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = lock(&self.pending).insert(handle.url().to_string(), (id, token.clone()));
        if let Some((_, previous)) = previous {
            tracing::debug!(doc = %handle.url(), "superseding pending summarization");
            previous.cancel();
        }

        let completion = Arc::clone(&self.completion);
        let datatype = Arc::clone(&self.datatype);
        let pending = Arc::clone(&self.pending);
        let quiet = self.quiet;
        tokio::spawn(async move {
            let cancelled = tokio::select! {
                _ = token.cancelled() => true,
                _ = tokio::time::sleep(quiet) => false,
            };
            let written = if cancelled {
                0
            } else {
                let result = populate_change_group_summaries(
                    &groups,
                    &handle,
                    datatype.as_ref(),
                    completion.as_ref(),
                    force,
                    &token,
                )
                .await;
                match result {
                    Ok(n) => {
                        tracing::debug!(doc = %handle.url(), written = n, "summaries updated");
                        n
                    }
                    Err(e) => {
                        tracing::warn!(doc = %handle.url(), error = %e, "failed to store change group summaries");
                        0
                    }
                }
            };
            release(&pending, handle.url(), id);
            written
        })
    }

    /// Whether a task for `url` is waiting or running.
    pub fn is_pending(&self, url: &str) -> bool {
        lock(&self.pending).contains_key(url)
    }

    /// Cancel the pending or running task for `url`, if any.
    pub fn cancel(&self, url: &str) -> bool {
        match lock(&self.pending).remove(url) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, (_, token)) in lock(&self.pending).drain() {
            token.cancel();
        }
    }
}

impl Drop for SummaryScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
