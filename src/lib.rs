pub mod parse;
pub use parse::{Command, Range, parse_command, parse_datetime, parse_range};

pub mod article;
pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod overview;
pub mod poster;
pub mod puller;
pub mod responses;
pub mod server;
pub mod session;
pub mod storage;
pub mod wildmat;

pub use article::{Article, LorId};

use crate::error::StoreError;
use crate::handlers::{HandlerContext, dispatch_command};
use crate::session::Session;
use crate::storage::Store;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

/// Handle a client connection.
///
/// The worker recovers from protocol errors with a 4xx/5xx response and
/// keeps going; a broken index or an I/O error on the client socket ends
/// the connection.
///
/// # Errors
///
/// Returns an error on client socket I/O failure or a fatal store error.
pub async fn handle_client<S>(socket: S, store: Arc<Store>, post_command: Arc<str>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    use crate::responses::*;

    let (read_half, write_half) = io::split(socket);
    let reader = BufReader::new(read_half);

    let mut ctx = HandlerContext {
        reader: Box::pin(reader),
        writer: Box::pin(write_half),
        store,
        session: Session::new(),
        post_command,
    };

    ctx.writer.write_all(RESP_200_GREETING.as_bytes()).await?;

    let mut line = String::new();
    loop {
        line.clear();
        let n = ctx.reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        let Ok((_, cmd)) = parse_command(trimmed) else {
            ctx.writer.write_all(RESP_500_UNKNOWN_CMD.as_bytes()).await?;
            continue;
        };

        debug!("command" = %cmd.name);

        // QUIT breaks the loop, so it is handled outside the dispatch table
        if cmd.name.as_str() == "QUIT" {
            ctx.writer.write_all(RESP_205_CLOSING.as_bytes()).await?;
            break;
        }

        if let Err(e) = dispatch_command(&mut ctx, &cmd).await {
            if matches!(
                e.downcast_ref::<StoreError>(),
                Some(StoreError::BrokenIndex { .. } | StoreError::CorruptOverview { .. })
            ) {
                return Err(e);
            }
            if e.downcast_ref::<std::io::Error>().is_some() {
                return Err(e);
            }
            debug!("Command {} failed: {}", cmd.name, e);
        }
    }

    Ok(())
}
