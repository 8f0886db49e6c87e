use patchwork_derive::{group_changes, EssayDatatype};
use patchwork_summary::{HttpCompletion, SummaryScheduler, TextCompletion};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::cmd_history::grouping_options;
use crate::workspace::Workspace;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_KEY_ENV: &str = "PATCHWORK_API_KEY";

fn completion_from_settings(ws: &Workspace) -> anyhow::Result<HttpCompletion> {
    let s = &ws.settings;
    let Some(endpoint) = s.summary_endpoint.as_deref() else {
        anyhow::bail!("no summary endpoint configured. Run `patchwork config set summary.endpoint <url>`.");
    };
    let key_env = s.summary_api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
    let api_key = std::env::var(key_env).ok();
    if api_key.is_none() {
        tracing::warn!(env = key_env, "no API key in environment; sending unauthenticated requests");
    }
    HttpCompletion::new(
        endpoint,
        s.summary_model.as_deref().unwrap_or(DEFAULT_MODEL),
        api_key,
    )
}

/// Summarize the current document's change groups with `completion` and
/// save. Returns the number of summaries written. Cancelling `shutdown`
/// stops the run; summaries already written are kept.
fn summarize_with(
    ws: &mut Workspace,
    rt: &Runtime,
    completion: Arc<dyn TextCompletion>,
    force: bool,
    shutdown: &CancellationToken,
) -> anyhow::Result<usize> {
    let doc = ws.head()?;
    let options = grouping_options(ws, &doc, None, None, None)?;
    let groups = group_changes(&*doc.read(), &options).change_groups;
    if groups.is_empty() {
        return Ok(0);
    }

    let scheduler = SummaryScheduler::new(completion, Arc::new(EssayDatatype), ws.settings.summary_quiet());
    let written = rt.block_on(async {
        let mut task = scheduler.schedule(doc.clone(), groups, force);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::warn!(doc = %doc.url(), "interrupted; keeping summaries written so far");
                scheduler.cancel_all();
                (&mut task).await
            }
            written = &mut task => written,
        }
    })?;
    if written > 0 {
        ws.save()?;
    }
    Ok(written)
}

/// `patchwork summarize [--force]`
pub fn execute(repo_root: &Path, force: bool) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let completion = Arc::new(completion_from_settings(&ws)?);
    let rt = Runtime::new()?;
    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    let written = summarize_with(&mut ws, &rt, completion, force, &shutdown)?;
    println!("Wrote {written} summar{}", if written == 1 { "y" } else { "ies" });
    Ok(())
}
