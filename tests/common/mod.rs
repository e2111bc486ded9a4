use lornews::article::{Article, LorId};
use lornews::config::Config;
use lornews::handle_client;
use lornews::storage::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const CATALOG: &str = "\
lor.forum.talks 42 Talks about everything
lor.forum.general 4 General
lor.linux.hardware 7 Hardware
";

pub const CDATE: &str = "20250101000000\n";

/// A store rooted in a fresh tempdir with the test catalog.
pub fn setup_store(tmp: &TempDir) -> Store {
    let cfg = Config::with_root(tmp.path());
    std::fs::create_dir_all(cfg.root()).unwrap();
    std::fs::write(cfg.catalog_path(), CATALOG).unwrap();
    std::fs::write(cfg.cdate_path(), CDATE).unwrap();
    Store::open(cfg).unwrap()
}

/// A topic article the way the puller would emit it.
pub fn topic_article(group: &str, topic: u64, subject: &str, body: &str) -> Article {
    let id = LorId::topic(topic);
    let mut article = Article {
        headers: Vec::new(),
        body: body.to_string(),
    };
    article.push_header("Newsgroups", group);
    article.push_header("Subject", subject);
    article.push_header("From", "author <author@linux.org.ru>");
    article.push_header("Date", "Fri, 1 Aug 2025 10:00:00 +0000");
    article.push_header("Message-ID", id.to_string());
    article.push_header("MIME-Version", "1.0");
    article.push_header("Content-Type", "text/plain; charset=utf-8");
    article.push_header("Content-Transfer-Encoding", "8bit");
    article.push_header("Injection-Date", "Fri, 1 Aug 2025 10:00:00 +0000");
    article.push_header("Path", "linux.org.ru!not-for-mail");
    article
}

/// A first-level comment article referencing its topic.
pub fn comment_article(
    group: &str,
    topic: u64,
    comment: u64,
    subject: &str,
    body: &str,
) -> Article {
    let id = LorId::comment(topic, comment);
    let mut article = Article {
        headers: Vec::new(),
        body: body.to_string(),
    };
    article.push_header("Newsgroups", group);
    article.push_header("Subject", subject);
    article.push_header("From", "poster <poster@linux.org.ru>");
    article.push_header("Date", "Fri, 1 Aug 2025 11:00:00 +0000");
    article.push_header("Message-ID", id.to_string());
    article.push_header("References", LorId::topic(topic).to_string());
    article.push_header("MIME-Version", "1.0");
    article.push_header("Content-Type", "text/plain; charset=utf-8");
    article.push_header("Content-Transfer-Encoding", "8bit");
    article.push_header("Injection-Date", "Fri, 1 Aug 2025 11:00:00 +0000");
    article.push_header("Path", "linux.org.ru!not-for-mail");
    article
}

/// Ingest thread 12345 with comment 678 into lor.forum.talks.
pub async fn seed_topic_and_comment(store: &Store) {
    let mut idx = store.create_index("lor.forum.talks").await.unwrap();
    idx.append(
        &LorId::topic(12345),
        &topic_article("lor.forum.talks", 12345, "Test topic", "topic body\n"),
    )
    .await
    .unwrap();
    idx.append(
        &LorId::comment(12345, 678),
        &comment_article("lor.forum.talks", 12345, 678, "Re: Test topic", "reply\n"),
    )
    .await
    .unwrap();
    idx.close().await.unwrap();
}

/// Spawn an accept loop over the store; returns the bound address.
pub async fn serve(store: Store, post_command: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = Arc::new(store);
    let post_command: Arc<str> = post_command.into();
    tokio::spawn(async move {
        loop {
            let (sock, _) = listener.accept().await.unwrap();
            let store = store.clone();
            let post_command = post_command.clone();
            tokio::spawn(async move {
                let _ = handle_client(sock, store, post_command).await;
            });
        }
    });
    addr
}

pub async fn connect(
    addr: SocketAddr,
) -> (
    BufReader<tokio::net::tcp::OwnedReadHalf>,
    tokio::net::tcp::OwnedWriteHalf,
) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (r, w) = stream.into_split();
    let mut reader = BufReader::new(r);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();
    assert!(greeting.starts_with("200 lord/"), "{greeting}");
    (reader, w)
}

/// Read one status line.
pub async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end().to_string()
}

/// Read a dot-terminated multi-line block (without the dot).
pub async fn read_block(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "." {
            break;
        }
        lines.push(trimmed.to_string());
    }
    lines
}
