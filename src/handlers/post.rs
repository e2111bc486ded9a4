//! The POST command: buffer the article, hand it to the poster subprocess.
//!
//! The article is read to completion before the subprocess starts, so a
//! dropped connection mid-POST never leaves a half-submitted message. The
//! poster's exit status decides between `240` and `441`; its last stderr
//! line becomes the `441` text.

use super::utils::{read_message, write_simple};
use super::{CommandHandler, HandlerContext, HandlerResult};
use crate::responses::*;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Handler for the POST command.
pub struct PostHandler;

impl CommandHandler for PostHandler {
    async fn handle(ctx: &mut HandlerContext, _args: &[String]) -> HandlerResult {
        write_simple(&mut ctx.writer, RESP_340_SEND_ARTICLE).await?;
        let message = read_message(&mut ctx.reader).await?;

        match deliver(&ctx.post_command, &message).await {
            Ok(()) => write_simple(&mut ctx.writer, RESP_240_POSTED).await,
            Err(reason) => {
                debug!(%reason, "posting failed");
                write_simple(&mut ctx.writer, &format!("441 {reason}\r\n")).await
            }
        }
    }
}

/// Run the poster with the buffered article on its stdin. `Err` carries the
/// text for the `441` response.
async fn deliver(post_command: &str, message: &str) -> Result<(), String> {
    let mut parts = post_command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(RESP_441_FALLBACK.to_string());
    };

    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("cannot run {program}: {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        // the poster may exit before draining its input; its exit status
        // decides the outcome, not the pipe
        let _ = stdin.write_all(message.as_bytes()).await;
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("cannot wait for {program}: {e}"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .next_back()
        .unwrap_or(RESP_441_FALLBACK)
        .to_string();
    Err(reason)
}

#[cfg(test)]
mod tests {
    use super::deliver;

    #[tokio::test]
    async fn successful_command_posts() {
        assert!(deliver("true", "Subject: x\n\nbody\n").await.is_ok());
    }

    #[tokio::test]
    async fn failing_command_reports_fallback() {
        let err = deliver("false", "x").await.unwrap_err();
        assert_eq!(err, "Something failed");
    }

    #[tokio::test]
    async fn stderr_last_line_is_captured() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho first >&2\necho bad password >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let err = deliver(script.to_str().unwrap(), "x").await.unwrap_err();
        assert_eq!(err, "bad password");
    }
}
