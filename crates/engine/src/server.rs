// RDB - Remote Program Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Connection coordinator: accepts TCP connections and runs one handling
//! loop per connection.
//!
//! The wire protocol is newline-terminated UTF-8 text, one response per
//! request. Transport failures are fatal only for the affected connection;
//! whatever ends the loop, the session's attachment is released so its
//! program becomes attachable again.

use std::{net::SocketAddr, sync::Arc};

use eyre::Result;
use rdb_common::SessionId;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tracing::{debug, info, warn};

use crate::CommandDispatcher;

/// Handle to the running debug server
#[derive(Debug)]
pub struct ServerHandle {
    /// Address the server is listening on
    pub addr: SocketAddr,
    /// Shutdown signal
    shutdown_tx: oneshot::Sender<()>,
}

impl ServerHandle {
    /// Get the server address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Gracefully shut down the accept loop. Connections already accepted
    /// run to completion of their own loops.
    pub fn shutdown(self) -> Result<()> {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Debug server already shut down");
        }
        Ok(())
    }
}

/// The debug server: owns the dispatcher and spawns one task per
/// connection.
#[derive(Debug)]
pub struct DebugServer {
    dispatcher: Arc<CommandDispatcher>,
}

impl DebugServer {
    /// Create a server around an already-wired dispatcher.
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher: Arc::new(dispatcher) }
    }

    /// Bind `addr` and start accepting connections. Returns once the
    /// listener is live; the accept loop runs in a background task until
    /// the returned handle is shut down.
    pub async fn serve(self, addr: SocketAddr) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let dispatcher = self.dispatcher;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                let dispatcher = dispatcher.clone();
                                tokio::spawn(async move {
                                    handle_connection(dispatcher, stream, peer).await;
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to accept connection");
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Debug server shutting down");
                        break;
                    }
                }
            }
        });

        info!("Debug server started on {}", actual_addr);
        Ok(ServerHandle { addr: actual_addr, shutdown_tx })
    }
}

/// One handling loop: read a line, dispatch, write response + newline,
/// repeat until the peer closes or a transport error occurs. On exit, for
/// any reason, the session's attachment is released.
async fn handle_connection(
    dispatcher: Arc<CommandDispatcher>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let session = SessionId::next();
    info!(%session, %peer, "Connected");

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(%session, "Peer closed connection");
                break;
            }
            Err(e) => {
                warn!(%session, error = %e, "Transport error, dropping connection");
                break;
            }
        };

        let response = dispatcher.dispatch(session, &line).await;
        debug!(%session, request = %line, response_len = response.len(), "Handled command");

        if let Err(e) = write_half.write_all(format!("{response}\n").as_bytes()).await {
            warn!(%session, error = %e, "Failed to write response, dropping connection");
            break;
        }
    }

    dispatcher.attachments().release(session);
    info!(%session, %peer, "Disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<CommandDispatcher>>();
        assert_send_sync::<DebugServer>();
    }
}
