use anyhow::Result;
use rehttp_core::config::{self, ClientConfig};

/// Print the config file path and the effective settings.
pub fn run_config(cfg: &ClientConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    println!("connect_timeout_secs = {}", cfg.connect_timeout_secs);
    println!("low_speed_limit_bytes = {}", cfg.low_speed_limit_bytes);
    println!("low_speed_time_secs = {}", cfg.low_speed_time_secs);
    println!("user_agent = {:?}", cfg.user_agent);
    let retry = cfg.retry_configuration();
    println!();
    println!("[retry]{}", if cfg.retry.is_none() { "  # built-in defaults" } else { "" });
    println!("max_retries = {}", retry.max_retries);
    println!("min_timeout_ms = {}", retry.min_timeout.as_millis());
    println!("max_timeout_ms = {}", retry.max_timeout.as_millis());
    println!("timeout_factor = {}", retry.timeout_factor);
    println!(
        "methods = [{}]",
        retry
            .retryable_methods
            .iter()
            .map(|m| format!("{:?}", m.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("status_codes = {:?}", retry.retryable_status_codes);
    println!(
        "error_codes = [{}]",
        retry
            .retryable_error_codes
            .iter()
            .map(|k| format!("{:?}", k.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("retry_after = {}", retry.use_retry_after_header);
    Ok(())
}
