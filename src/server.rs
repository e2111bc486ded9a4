//! The NNTP accept loop.
//!
//! One listener, one task per accepted connection, nothing shared between
//! peers but the store. There is no graceful shutdown: the loop runs until
//! a fatal error.

use crate::handle_client;
use crate::storage::Store;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 5119;

pub async fn run(store: Store, port: u16, post_command: String) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "lord listening");
    let store = Arc::new(store);
    let post_command: Arc<str> = post_command.into();

    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "connection accepted");
        let store = store.clone();
        let post_command = post_command.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, store, post_command).await {
                debug!(%peer, error = %e, "connection ended");
            }
        });
    }
}
