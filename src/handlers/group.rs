//! Group and listing command handlers.

use super::utils::write_simple;
use super::{CommandHandler, HandlerContext, HandlerResult};
use crate::article::LorId;
use crate::overview::OVERVIEW_FORMAT;
use crate::parse::{parse_datetime, parse_range};
use crate::responses::*;
use crate::storage::Mode;
use crate::wildmat::Pattern;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

/// Handler for the GROUP command.
pub struct GroupHandler;

impl CommandHandler for GroupHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        let [group_name] = args else {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        };
        if !ctx.store.catalog().contains(group_name) {
            return write_simple(&mut ctx.writer, RESP_411_NO_SUCH_GROUP).await;
        }
        let status = ctx.store.group_status(group_name).await?;
        let first = (status.count > 0).then_some(status.min);
        ctx.session.select_group(group_name.clone(), first);
        write_simple(
            &mut ctx.writer,
            &format!(
                "211 {} {} {} {}\r\n",
                status.count, status.min, status.max, group_name
            ),
        )
        .await
    }
}

/// Handler for the LISTGROUP command.
pub struct ListGroupHandler;

impl CommandHandler for ListGroupHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        if args.len() > 2 {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        }
        let range = match args.get(1) {
            Some(spec) => match parse_range(spec) {
                Ok(range) => Some(range),
                Err(_) => return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await,
            },
            None => None,
        };
        let group_name = match args.first() {
            Some(name) => {
                if !ctx.store.catalog().contains(name) {
                    return write_simple(&mut ctx.writer, RESP_411_NO_SUCH_GROUP).await;
                }
                name.clone()
            }
            None => match ctx.session.current_group() {
                Some(current) => current.to_string(),
                None => return write_simple(&mut ctx.writer, RESP_412_NO_GROUP).await,
            },
        };

        let mut numbers = Vec::new();
        let status = match ctx.store.open_index(&group_name, Mode::Read).await? {
            Some(mut idx) => {
                numbers = idx.scan(range).await?;
                let status = idx.status();
                idx.close().await?;
                status
            }
            None => crate::storage::GroupStatus::empty(),
        };
        if args.first().is_some() {
            let first = (status.count > 0).then_some(status.min);
            ctx.session.select_group(group_name.clone(), first);
        }

        write_simple(
            &mut ctx.writer,
            &format!(
                "211 {} {} {} {} list follows\r\n",
                status.count, status.min, status.max, group_name
            ),
        )
        .await?;
        for n in numbers {
            ctx.writer.write_all(format!("{n}\r\n").as_bytes()).await?;
        }
        ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        Ok(())
    }
}

/// Seek direction shared by LAST and NEXT.
async fn seek(ctx: &mut HandlerContext, forward: bool) -> HandlerResult {
    let Some(group) = ctx.session.current_group().map(str::to_string) else {
        return write_simple(&mut ctx.writer, RESP_412_NO_GROUP).await;
    };
    let Some(current) = ctx.session.current_article() else {
        return write_simple(&mut ctx.writer, RESP_420_NO_CURRENT).await;
    };
    let miss = if forward {
        RESP_421_NO_NEXT
    } else {
        RESP_422_NO_PREV
    };

    let Some(mut idx) = ctx.store.open_index(&group, Mode::Read).await? else {
        return write_simple(&mut ctx.writer, RESP_420_NO_CURRENT).await;
    };
    let found = if forward {
        idx.next_after(current).await?
    } else {
        idx.prev_before(current).await?
    };
    let location = match found {
        Some(n) => idx.article_location(n).await?.map(|loc| (n, loc)),
        None => None,
    };
    idx.close().await?;

    match location.and_then(|(n, loc)| LorId::from_location(&loc).map(|id| (n, id))) {
        Some((n, id)) => {
            ctx.session.set_current_article(n);
            write_simple(&mut ctx.writer, &format!("223 {n} {id} article exists\r\n")).await
        }
        None => write_simple(&mut ctx.writer, miss).await,
    }
}

/// Handler for the NEXT command.
pub struct NextHandler;

impl CommandHandler for NextHandler {
    async fn handle(ctx: &mut HandlerContext, _args: &[String]) -> HandlerResult {
        seek(ctx, true).await
    }
}

/// Handler for the LAST command.
pub struct LastHandler;

impl CommandHandler for LastHandler {
    async fn handle(ctx: &mut HandlerContext, _args: &[String]) -> HandlerResult {
        seek(ctx, false).await
    }
}

/// Parse the `date time [GMT]` tail of NEWGROUPS and NEWNEWS.
fn parse_since(args: &[String]) -> Option<DateTime<Utc>> {
    let (date, time, gmt) = match args {
        [date, time] => (date, time, false),
        [date, time, gmt] if gmt.eq_ignore_ascii_case("GMT") => (date, time, true),
        _ => return None,
    };
    parse_datetime(date, time, gmt).ok()
}

/// Handler for the NEWGROUPS command.
pub struct NewGroupsHandler;

impl CommandHandler for NewGroupsHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        let Some(since) = parse_since(args) else {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        };
        ctx.writer.write_all(RESP_231_NEWGROUPS.as_bytes()).await?;
        if ctx.store.creation_date() >= since {
            let groups: Vec<String> = ctx
                .store
                .catalog()
                .iter()
                .map(|e| e.name.clone())
                .collect();
            for name in groups {
                let status = ctx.store.group_status(&name).await?;
                ctx.writer
                    .write_all(
                        format!("{} {} {} y\r\n", name, status.max, status.min).as_bytes(),
                    )
                    .await?;
            }
        }
        ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        Ok(())
    }
}

/// Handler for the NEWNEWS command.
pub struct NewNewsHandler;

impl CommandHandler for NewNewsHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        let Some((pattern_spec, rest)) = args.split_first() else {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        };
        let Ok(pattern) = Pattern::parse(pattern_spec) else {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        };
        let Some(since) = parse_since(rest) else {
            return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
        };
        let since = since.timestamp();

        let groups: Vec<String> = ctx
            .store
            .catalog()
            .iter()
            .map(|e| e.name.clone())
            .filter(|name| pattern.matches(name))
            .collect();
        ctx.writer.write_all(RESP_230_NEWNEWS.as_bytes()).await?;
        for name in groups {
            let Some(mut idx) = ctx.store.open_index(&name, Mode::Read).await? else {
                continue;
            };
            for n in idx.scan(None).await? {
                let new_enough = idx.timestamp(n).await?.is_some_and(|t| t >= since);
                if !new_enough {
                    continue;
                }
                if let Some(id) = idx
                    .article_location(n)
                    .await?
                    .as_deref()
                    .and_then(LorId::from_location)
                {
                    ctx.writer
                        .write_all(format!("{id}\r\n").as_bytes())
                        .await?;
                }
            }
            idx.close().await?;
        }
        ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
        Ok(())
    }
}

/// Handler for the LIST command.
pub struct ListHandler;

impl CommandHandler for ListHandler {
    async fn handle(ctx: &mut HandlerContext, args: &[String]) -> HandlerResult {
        match args.first().map(|s| s.to_ascii_uppercase()) {
            None => list_active(ctx, None).await,
            Some(keyword) => match keyword.as_str() {
                "ACTIVE" => list_active(ctx, args.get(1)).await,
                "NEWSGROUPS" => list_newsgroups(ctx, args.get(1)).await,
                "OVERVIEW.FMT" => list_overview_fmt(ctx).await,
                _ => write_simple(&mut ctx.writer, RESP_501_SYNTAX).await,
            },
        }
    }
}

fn parse_list_pattern(spec: Option<&String>) -> Result<Option<Pattern>, ()> {
    match spec {
        None => Ok(None),
        Some(spec) => Pattern::parse(spec).map(Some).map_err(|_| ()),
    }
}

async fn list_active(ctx: &mut HandlerContext, pattern: Option<&String>) -> HandlerResult {
    let Ok(pattern) = parse_list_pattern(pattern) else {
        return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
    };
    let groups: Vec<String> = ctx
        .store
        .catalog()
        .iter()
        .map(|e| e.name.clone())
        .filter(|name| pattern.as_ref().is_none_or(|p| p.matches(name)))
        .collect();
    ctx.writer.write_all(RESP_215_LIST_FOLLOWS.as_bytes()).await?;
    for name in groups {
        let status = ctx.store.group_status(&name).await?;
        ctx.writer
            .write_all(format!("{} {} {} y\r\n", name, status.max, status.min).as_bytes())
            .await?;
    }
    ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
    Ok(())
}

async fn list_newsgroups(ctx: &mut HandlerContext, pattern: Option<&String>) -> HandlerResult {
    let Ok(pattern) = parse_list_pattern(pattern) else {
        return write_simple(&mut ctx.writer, RESP_501_SYNTAX).await;
    };
    ctx.writer
        .write_all(RESP_215_DESCRIPTIONS.as_bytes())
        .await?;
    for entry in ctx.store.catalog().iter() {
        if pattern.as_ref().is_none_or(|p| p.matches(&entry.name)) {
            ctx.writer
                .write_all(format!("{} {}\r\n", entry.name, entry.description).as_bytes())
                .await?;
        }
    }
    ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
    Ok(())
}

async fn list_overview_fmt(ctx: &mut HandlerContext) -> HandlerResult {
    ctx.writer
        .write_all(RESP_215_OVERVIEW_FMT.as_bytes())
        .await?;
    for field in OVERVIEW_FORMAT {
        ctx.writer
            .write_all(format!("{field}\r\n").as_bytes())
            .await?;
    }
    ctx.writer.write_all(RESP_DOT_CRLF.as_bytes()).await?;
    Ok(())
}
