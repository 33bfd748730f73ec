//! CLI command handlers, one file per command.

mod config;
mod get;
mod head;

pub use config::run_config;
pub use get::{run_get, GetArgs};
pub use head::run_head;

use anyhow::{bail, Result};
use rehttp_core::{DispatchOptions, Method};

/// Parse a `Name: value` header argument.
pub(crate) fn parse_header_arg(arg: &str) -> Result<(String, String)> {
    match arg.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("invalid header {:?}, expected 'Name: value'", arg),
    }
}

/// Request options with the user's extra headers.
pub(crate) fn request_options(method: Method, url: &str, headers: &[String]) -> Result<DispatchOptions> {
    let mut opts = DispatchOptions::new(method, url)?;
    for arg in headers {
        let (name, value) = parse_header_arg(arg)?;
        opts = opts.header(name, value);
    }
    Ok(opts)
}
