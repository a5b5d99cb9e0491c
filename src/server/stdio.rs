//! Line-delimited duplex transport.
//!
//! Reads one JSON message per line from stdin and writes one response per
//! line to stdout. Notifications produce no output. EOF ends the transport.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::server::{dispatch_message, rpc_codes, rpc_error, ToolRegistry};

pub async fn run_line_transport(registry: Arc<ToolRegistry>) -> anyhow::Result<()> {
    tracing::info!("line transport ready on stdio");

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(message) => dispatch_message(&registry, &message).await,
            Err(_) => Some(rpc_error(
                Value::Null,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON",
            )),
        };

        if let Some(response) = response {
            let mut serialized = response.to_string();
            serialized.push('\n');
            stdout.write_all(serialized.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdin closed, line transport exiting");
    Ok(())
}
