//! Information command handlers (DATE, HELP, CAPABILITIES, MODE).

use super::utils::write_simple;
use super::{CommandHandler, HandlerContext, HandlerResult};
use crate::responses::*;
use tokio::io::AsyncWriteExt;

/// Handler for the DATE command.
pub struct DateHandler;

impl CommandHandler for DateHandler {
    async fn handle(ctx: &mut HandlerContext, _args: &[String]) -> HandlerResult {
        use chrono::Utc;
        let now = Utc::now().format("%Y%m%d%H%M%S");
        write_simple(&mut ctx.writer, &format!("111 {now}\r\n")).await
    }
}

/// Handler for the HELP command.
pub struct HelpHandler;

impl CommandHandler for HelpHandler {
    async fn handle(ctx: &mut HandlerContext, _args: &[String]) -> HandlerResult {
        ctx.writer
            .write_all(RESP_100_HELP_FOLLOWS.as_bytes())
            .await?;
        ctx.writer.write_all(RESP_HELP_TEXT.as_bytes()).await?;
        ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        Ok(())
    }
}

/// Handler for the CAPABILITIES command.
pub struct CapabilitiesHandler;

impl CommandHandler for CapabilitiesHandler {
    async fn handle(ctx: &mut HandlerContext, _args: &[String]) -> HandlerResult {
        ctx.writer
            .write_all(RESP_101_CAPABILITIES.as_bytes())
            .await?;
        ctx.writer.write_all(RESP_CAP_VERSION.as_bytes()).await?;
        ctx.writer
            .write_all(RESP_CAP_IMPLEMENTATION.as_bytes())
            .await?;
        ctx.writer.write_all(RESP_CAP_READER.as_bytes()).await?;
        ctx.writer.write_all(RESP_CAP_NEWNEWS.as_bytes()).await?;
        ctx.writer.write_all(RESP_CAP_LIST.as_bytes()).await?;
        ctx.writer.write_all(RESP_CAP_OVER.as_bytes()).await?;
        ctx.writer.write_all(RESP_CAP_POST.as_bytes()).await?;
        ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        Ok(())
    }
}

/// Handler for the MODE command; only `MODE READER` exists here.
pub struct ModeHandler;

impl CommandHandler for ModeHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        match args.first() {
            Some(mode) if mode.eq_ignore_ascii_case("READER") => {
                write_simple(&mut ctx.writer, RESP_200_POSTING_ALLOWED).await
            }
            _ => write_simple(&mut ctx.writer, RESP_501_SYNTAX).await,
        }
    }
}
