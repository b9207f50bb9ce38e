//! JSON-lines request loop over stdin/stdout.

use std::sync::Arc;

use proto::{ToolError, ToolResult};
use runtime::ToolRegistry;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// One tool invocation read from the input stream.
#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: serde_json::Value,
    tool: String,
    #[serde(default = "empty_arguments")]
    arguments: serde_json::Value,
}

fn empty_arguments() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Result line written for every request, echoing its id.
#[derive(Debug, Serialize)]
struct Response {
    id: serde_json::Value,
    result: ToolResult,
}

fn invalid_request(reason: impl std::fmt::Display) -> Response {
    Response {
        id: serde_json::Value::Null,
        result: ToolResult::from_error(ToolError::invalid(format!("Invalid request: {reason}"))),
    }
}

/// Parses one input line; malformed input becomes a ready validation response.
fn parse_request(line: &str) -> Result<Request, Response> {
    serde_json::from_str(line).map_err(invalid_request)
}

/// Serves requests until `input` ends and every in-flight call has answered.
///
/// Calls run concurrently; each tool serializes its own invocations.
/// Responses are written in completion order.
pub async fn serve<R, W>(
    registry: Arc<ToolRegistry>,
    mut input: R,
    output: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let (tx, mut rx) = mpsc::channel::<Response>(RESPONSE_CHANNEL_CAPACITY);
    let mut tx = Some(tx);
    let mut served = 0usize;

    info!(tools = ?registry.names(), "Serving tool calls on stdin");

    loop {
        tokio::select! {
            read = input.read_until(b'\n', &mut buf), if tx.is_some() => {
                if read? == 0 {
                    debug!("Input closed, draining in-flight calls");
                    tx = None;
                    continue;
                }
                let raw = std::mem::take(&mut buf);
                let Some(sender) = tx.clone() else {
                    continue;
                };
                let parsed = match String::from_utf8(raw) {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => parse_request(line.trim()),
                    Err(e) => Err(invalid_request(e)),
                };
                match parsed {
                    Ok(request) => {
                        served += 1;
                        let registry = registry.clone();
                        tokio::spawn(async move {
                            debug!(id = %request.id, tool = %request.tool, "Dispatching call");
                            let result = registry.run(&request.tool, request.arguments).await;
                            let response = Response { id: request.id, result };
                            if sender.send(response).await.is_err() {
                                warn!("Response dropped, writer is gone");
                            }
                        });
                    }
                    Err(response) => {
                        warn!("Rejected malformed request line");
                        write_response(output, &response).await?;
                    }
                }
            }
            Some(response) = rx.recv() => {
                write_response(output, &response).await?;
            }
            else => break,
        }
    }

    info!(served, "Tool server stopped");
    Ok(())
}

async fn write_response<W>(output: &mut W, response: &Response) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
