//! `rehttp get <url>`: resumable download to a file or stdout.

use super::request_options;
use crate::cli::sink::{BodySink, Summary};
use anyhow::{bail, Context, Result};
use rehttp_core::config::ClientConfig;
use rehttp_core::{
    AbortController, CurlDispatcher, Dispatch, Method, RequestError, RetryAgent,
};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GetArgs {
    pub url: String,
    pub output: Option<PathBuf>,
    pub headers: Vec<String>,
    pub max_retries: Option<u32>,
    pub sha256: bool,
}

fn fetch(cfg: &ClientConfig, args: &GetArgs, controller: &AbortController) -> Result<Summary> {
    let mut retry = cfg.retry_configuration();
    if let Some(n) = args.max_retries {
        retry.max_retries = n;
    }
    let agent = RetryAgent::new(CurlDispatcher::from_config(cfg), retry);
    let opts = request_options(Method::Get, &args.url, &args.headers)?.signal(controller.signal());

    let mut sink = BodySink::open(args.output.as_deref(), args.sha256)?;
    agent.dispatch(opts, &mut sink);
    sink.finish()
}

pub async fn run_get(cfg: &ClientConfig, args: GetArgs) -> Result<()> {
    let controller = AbortController::new();
    let ctrl_c = tokio::spawn({
        let controller = controller.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.abort(RequestError::aborted("interrupted"));
            }
        }
    });

    let summary = tokio::task::spawn_blocking({
        let cfg = cfg.clone();
        let args = args.clone();
        move || fetch(&cfg, &args, &controller)
    })
    .await
    .context("get task join")?;
    ctrl_c.abort();
    let summary = summary?;

    match &args.output {
        Some(path) => eprintln!(
            "HTTP {}  {} bytes -> {}",
            summary.status,
            summary.bytes,
            path.display()
        ),
        None => eprintln!("HTTP {}  {} bytes", summary.status, summary.bytes),
    }
    if let Some(digest) = &summary.sha256 {
        let name = args
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}", digest, name);
    }
    if summary.status >= 400 {
        bail!("{} returned HTTP {}", args.url, summary.status);
    }
    Ok(())
}
