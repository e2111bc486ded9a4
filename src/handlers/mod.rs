//! NNTP command handlers module.
//!
//! One handler per command, organized by category, dispatched off the
//! uppercased command name.

pub mod article;
pub mod group;
pub mod info;
pub mod post;
pub mod utils;

use crate::Command;
use crate::session::Session;
use crate::storage::Store;
use anyhow::Result;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};

/// Type-erased async buffered reader
pub type DynReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Type-erased async writer
pub type DynWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Result type for command handlers.
pub type HandlerResult = Result<()>;

/// Context passed to command handlers.
pub struct HandlerContext {
    pub reader: DynReader,
    pub writer: DynWriter,
    pub store: Arc<Store>,
    pub session: Session,
    /// Command line spawned to deliver a POSTed article.
    pub post_command: Arc<str>,
}

/// Trait for command handlers.
#[allow(async_fn_in_trait)]
pub trait CommandHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult;
}

/// Dispatch a command to the appropriate handler.
pub async fn dispatch_command(ctx: &mut HandlerContext, cmd: &Command) -> HandlerResult {
    match cmd.name.as_str() {
        // Article retrieval commands
        "ARTICLE" => article::ArticleHandler::handle(ctx, &cmd.args).await,
        "HEAD" => article::HeadHandler::handle(ctx, &cmd.args).await,
        "BODY" => article::BodyHandler::handle(ctx, &cmd.args).await,
        "STAT" => article::StatHandler::handle(ctx, &cmd.args).await,
        "OVER" | "XOVER" => article::OverHandler::handle(ctx, &cmd.args).await,

        // Group and navigation commands
        "GROUP" => group::GroupHandler::handle(ctx, &cmd.args).await,
        "LIST" => group::ListHandler::handle(ctx, &cmd.args).await,
        "LISTGROUP" => group::ListGroupHandler::handle(ctx, &cmd.args).await,
        "NEXT" => group::NextHandler::handle(ctx, &cmd.args).await,
        "LAST" => group::LastHandler::handle(ctx, &cmd.args).await,
        "NEWGROUPS" => group::NewGroupsHandler::handle(ctx, &cmd.args).await,
        "NEWNEWS" => group::NewNewsHandler::handle(ctx, &cmd.args).await,

        // Posting
        "POST" => post::PostHandler::handle(ctx, &cmd.args).await,

        // Information commands
        "CAPABILITIES" => info::CapabilitiesHandler::handle(ctx, &cmd.args).await,
        "DATE" => info::DateHandler::handle(ctx, &cmd.args).await,
        "HELP" => info::HelpHandler::handle(ctx, &cmd.args).await,
        "MODE" => info::ModeHandler::handle(ctx, &cmd.args).await,

        // Unknown command
        _ => {
            use crate::responses::RESP_500_UNKNOWN_CMD;
            utils::write_simple(&mut ctx.writer, RESP_500_UNKNOWN_CMD).await
        }
    }
}
