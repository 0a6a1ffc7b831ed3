//! JSON-lines transport: one request object per input line, one response
//! object per output line, in order.

use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::{Api, Request, Response};

/// Serve requests from `reader` until EOF. Returns the number handled.
///
/// Blank lines are skipped; a line that is not a valid request gets a 400
/// response and the loop carries on.
pub async fn serve_lines<R, W>(api: &Api, reader: R, mut writer: W) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0u64;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<Request>(line) {
            Ok(req) => api.handle(req).await,
            Err(e) => {
                warn!(error = %e, "malformed request line");
                Response {
                    status: 400,
                    body: json!({ "detail": format!("invalid request: {e}") }),
                }
            }
        };
        let mut out = serde_json::to_vec(&resp)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        handled += 1;
    }
    info!(handled, "input closed");
    Ok(handled)
}
