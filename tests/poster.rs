mod common;

use lornews::config::Config;
use lornews::poster;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type RequestLog = Arc<Mutex<Vec<(String, String)>>>;

/// A stub Forum that logs every request and answers the login and
/// submission endpoints. `error_page` makes submissions fail.
async fn spawn_forum(log: RequestLog, error_page: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = listener.accept().await.unwrap();
            let log = log.clone();
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut chunk = vec![0u8; 1024];
                let header_end = loop {
                    let n = sock.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break None;
                    }
                    raw.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else { return };
                let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
                let content_length: usize = head
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:")
                        .map(|v| v.trim().parse().unwrap_or(0)))
                    .unwrap_or(0);
                while raw.len() < header_end + content_length {
                    let n = sock.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&raw[header_end..]).to_string();
                let path = head
                    .lines()
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                log.lock().unwrap().push((path.clone(), body));

                let (extra, page) = if path.starts_with("/login.jsp") {
                    (
                        "Set-Cookie: JSESSIONID=SESS1; Max-Age=3600; Path=/\r\n",
                        "<html><head><title>linux.org.ru</title></head><body></body></html>",
                    )
                } else if error_page && path.starts_with("/add") {
                    (
                        "",
                        "<html><head><title>linux.org.ru</title></head>\
                         <body><div class=\"error\">Сообщение слишком длинное</div></body></html>",
                    )
                } else {
                    (
                        "",
                        "<html><head><title>linux.org.ru</title></head><body>ok</body></html>",
                    )
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n{}\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    extra,
                    page.len(),
                    page
                );
                let _ = sock.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}")
}

fn setup_user(tmp: &tempfile::TempDir) -> Config {
    let cfg = Config::with_root(tmp.path());
    std::fs::create_dir_all(cfg.user_dir("nick")).unwrap();
    std::fs::write(cfg.catalog_path(), common::CATALOG).unwrap();
    std::fs::write(cfg.cdate_path(), common::CDATE).unwrap();
    std::fs::write(cfg.passwd_path("nick"), "secret\n").unwrap();
    cfg
}

const COMMENT: &str = "From: nick <nick@linux.org.ru>\n\
    Newsgroups: lor.forum.talks\n\
    Subject: Re: Test topic\n\
    References: <lor12345@linux.org.ru>\n\
    \n\
    .Hello\n";

#[tokio::test]
async fn first_post_logs_in_second_reuses_session() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup_user(&tmp);
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let base = spawn_forum(log.clone(), false).await;
    // the client reaches the stub instead of the Forum
    let run = |cfg: Config, base: String| async move {
        poster::run_with_base(&cfg, COMMENT, Duration::from_secs(20), Some(base)).await
    };

    run(cfg.clone(), base.clone()).await.unwrap();
    {
        let log = log.lock().unwrap();
        let paths: Vec<&str> = log.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, ["/login.jsp", "/add_comment.jsp"]);
        assert!(log[0].1.contains("nick=nick"));
        assert!(log[0].1.contains("passwd=secret"));
        let form = &log[1].1;
        assert!(form.contains("session=SESS1"), "{form}");
        assert!(form.contains("topic=12345"));
        assert!(form.contains("replyto="));
        assert!(form.contains("mode=ntobrq"));
        assert!(form.contains("autourl=1"));
    }

    // the session cookie survived the process; no second login
    log.lock().unwrap().clear();
    run(cfg, base).await.unwrap();
    {
        let log = log.lock().unwrap();
        let paths: Vec<&str> = log.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, ["/", "/add_comment.jsp"]);
    }
}

#[tokio::test]
async fn submission_error_is_surfaced() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup_user(&tmp);
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let base = spawn_forum(log, true).await;

    let err = poster::run_with_base(&cfg, COMMENT, Duration::from_secs(20), Some(base))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("слишком длинное"), "{err}");
}

#[tokio::test]
async fn missing_password_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config::with_root(tmp.path());
    std::fs::create_dir_all(cfg.root()).unwrap();
    std::fs::write(cfg.catalog_path(), common::CATALOG).unwrap();
    std::fs::write(cfg.cdate_path(), common::CDATE).unwrap();

    let err = poster::run_with_base(&cfg, COMMENT, Duration::from_secs(20), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no password stored for nick"), "{err}");
}

#[tokio::test]
async fn unknown_group_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup_user(&tmp);
    let article = COMMENT.replace("lor.forum.talks", "lor.nowhere");
    let err = poster::run_with_base(&cfg, &article, Duration::from_secs(20), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no such newsgroup"), "{err}");
}
