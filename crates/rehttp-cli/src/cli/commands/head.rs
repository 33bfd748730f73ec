//! `rehttp head <url>`

use super::request_options;
use crate::cli::sink::BodySink;
use anyhow::{Context, Result};
use rehttp_core::config::ClientConfig;
use rehttp_core::{CurlDispatcher, Dispatch, Method, RetryAgent};

pub async fn run_head(cfg: &ClientConfig, url: &str, headers: &[String]) -> Result<()> {
    let opts = request_options(Method::Head, url, headers)?;
    let agent = RetryAgent::new(CurlDispatcher::from_config(cfg), cfg.retry_configuration());

    let summary = tokio::task::spawn_blocking(move || {
        let mut sink = BodySink::discard();
        agent.dispatch(opts, &mut sink);
        sink.finish()
    })
    .await
    .context("head task join")??;

    println!("HTTP {}", summary.status);
    for (name, value) in summary.headers.iter() {
        println!("{}: {}", name, value);
    }
    Ok(())
}
