//! Article retrieval command handlers.

use super::utils::{
    ArticleQueryError, handle_article_error, resolve_article, send_body, send_headers,
    write_simple,
};
use super::{CommandHandler, HandlerContext, HandlerResult};
use crate::overview::decode_record;
use crate::parse::{Range, parse_range};
use crate::responses::*;
use crate::storage::Mode;
use tokio::io::AsyncWriteExt;

/// What ARTICLE/HEAD/BODY/STAT send after the status line.
#[derive(Debug, Clone, Copy)]
enum ArticleOperation {
    Full,
    Headers,
    Body,
    Stat,
}

impl ArticleOperation {
    fn response_code(self) -> u16 {
        match self {
            ArticleOperation::Full => 220,
            ArticleOperation::Headers => 221,
            ArticleOperation::Body => 222,
            ArticleOperation::Stat => 223,
        }
    }

    fn response_suffix(self) -> &'static str {
        match self {
            ArticleOperation::Full => "article follows",
            ArticleOperation::Headers => "article headers follow",
            ArticleOperation::Body => "article body follows",
            ArticleOperation::Stat => "article exists",
        }
    }
}

async fn handle_article_operation(
    ctx: &mut HandlerContext,
    args: &[String],
    operation: ArticleOperation,
) -> HandlerResult {
    if args.len() > 1 {
        return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
    }
    let resolved = resolve_article(
        &ctx.store,
        &mut ctx.session,
        args.first().map(String::as_str),
    )
    .await?;
    let resolved = match resolved {
        Ok(r) => r,
        Err(e) => return handle_article_error(&mut ctx.writer, e).await,
    };

    let status = format!(
        "{} {} {} {}\r\n",
        operation.response_code(),
        resolved.number,
        resolved.id,
        operation.response_suffix()
    );
    ctx.writer.write_all(status.as_bytes()).await?;

    match operation {
        ArticleOperation::Full => {
            send_headers(&mut ctx.writer, &resolved.article).await?;
            ctx.writer.write_all(RESP_CRLF.as_bytes()).await?;
            send_body(&mut ctx.writer, &resolved.article.body).await?;
            ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        }
        ArticleOperation::Headers => {
            send_headers(&mut ctx.writer, &resolved.article).await?;
            ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        }
        ArticleOperation::Body => {
            send_body(&mut ctx.writer, &resolved.article.body).await?;
            ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        }
        ArticleOperation::Stat => {}
    }
    Ok(())
}

macro_rules! article_handler {
    ($name:ident, $operation:expr) => {
        pub struct $name;

        impl CommandHandler for $name {
            async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
                handle_article_operation(ctx, args, $operation).await
            }
        }
    };
}

article_handler!(ArticleHandler, ArticleOperation::Full);
article_handler!(HeadHandler, ArticleOperation::Headers);
article_handler!(BodyHandler, ArticleOperation::Body);
article_handler!(StatHandler, ArticleOperation::Stat);

/// Handler for OVER and XOVER.
pub struct OverHandler;

impl CommandHandler for OverHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        if args.len() > 1 {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        }
        let range = match args.first() {
            Some(arg) if arg.starts_with('<') => {
                return write_simple(&mut ctx.writer, RESP_503_NO_OVER_BY_ID).await;
            }
            Some(arg) => match parse_range(arg) {
                Ok(range) => Some(range),
                Err(_) => return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await,
            },
            None => None,
        };

        let Some(group) = ctx.session.current_group().map(str::to_string) else {
            return write_simple(&mut ctx.writer, RESP_412_NO_GROUP).await;
        };
        let range = match range {
            Some(r) => r,
            None => match ctx.session.current_article() {
                Some(n) => Range::single(n),
                None => return write_simple(&mut ctx.writer, RESP_420_NO_CURRENT).await,
            },
        };

        let mut records = Vec::new();
        if let Some(mut idx) = ctx.store.open_index(&group, Mode::Read).await? {
            for n in idx.scan(Some(range)).await? {
                if let Some(record) = idx.overview(n).await? {
                    records.push((n, decode_record(&record)));
                }
            }
            idx.close().await?;
        }
        if records.is_empty() {
            return write_simple(&mut ctx.writer, RESP_423_NO_ARTICLE_NUM).await;
        }

        ctx.writer.write_all(RESP_224_OVERVIEW.as_bytes()).await?;
        for (n, record) in records {
            ctx.writer
                .write_all(format!("{n}\t{record}\r\n").as_bytes())
                .await?;
        }
        ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        Ok(())
    }
}
