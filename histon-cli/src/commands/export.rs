//! `histon export` command handler
//!
//! Thin client for `GET /export`: builds the query string from flags,
//! optionally attaches a bearer API key, and streams the response body
//! to stdout.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::cli::ExportArgs;
use crate::error::CliError;

/// Execute the `export` command.
pub async fn execute(args: ExportArgs, _config_path: &Path) -> Result<(), CliError> {
    if args.grep.len() > 3 {
        return Err(CliError::Config(
            "--grep can be given at most 3 times".to_owned(),
        ));
    }

    let url = build_url(&args)?;
    debug!(%url, "export request");

    let client = reqwest::Client::new();
    let mut request = client.get(url);
    if let Some(api_key) = &args.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| CliError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CliError::Http(format!(
            "{status}: {}",
            body.trim_end_matches('\n')
        )));
    }

    let mut response = response;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| CliError::Http(e.to_string()))?
    {
        handle.write_all(&chunk)?;
    }
    handle.flush()?;

    Ok(())
}

fn build_url(args: &ExportArgs) -> Result<reqwest::Url, CliError> {
    let base = args.server.trim_end_matches('/');
    let mut url = reqwest::Url::parse(&format!("{base}/export"))
        .map_err(|e| CliError::Config(format!("invalid --server: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        for (i, pattern) in args.grep.iter().enumerate() {
            query.append_pair(&format!("grep{}", i + 1), pattern);
        }
        if let Some(session) = &args.session {
            query.append_pair("session", session);
        }
        if let Some(order) = &args.order {
            query.append_pair("order", order);
        }
        if let Some(color) = &args.color {
            query.append_pair("color", color);
        }
        if let Some(limit) = args.limit {
            query.append_pair("limit", &limit.to_string());
        }
    }

    Ok(url)
}
