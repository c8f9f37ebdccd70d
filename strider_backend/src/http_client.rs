use std::time::Duration;

use anyhow::{Context, Result};

pub fn build_http_client(user_agent: &str, timeout: Option<Duration>) -> Result<reqwest::Client> {
    let allow_system_proxy = std::env::var("STRIDER_ENABLE_SYSTEM_PROXY")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if allow_system_proxy {
        match attempt_build(user_agent, timeout, false) {
            Ok(client) => return Ok(client),
            Err(e) => tracing::warn!(
                "HTTP client with system proxy discovery failed ({}); retrying with no_proxy",
                e
            ),
        }
    }

    attempt_build(user_agent, timeout, true).context("Failed to initialize HTTP client")
}

fn attempt_build(
    user_agent: &str,
    timeout: Option<Duration>,
    no_proxy: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().user_agent(user_agent);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if no_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}
