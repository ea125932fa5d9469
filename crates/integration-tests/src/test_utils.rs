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

//! Test utilities: spawning a real debug server on an ephemeral port and a
//! minimal line-protocol client to drive it.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use eyre::Result;
use once_cell::sync::Lazy;
use rdb_engine::{
    CommandDispatcher, DebugServer, MiniInterpreter, ProgramCatalog, ServerHandle,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};

static INIT_TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
});

/// Initialize tracing once per test binary.
pub fn init_test_environment() {
    Lazy::force(&INIT_TRACING);
}

/// Spawn a debug server on an ephemeral localhost port, loaded with the
/// given `(name, source)` programs.
pub async fn spawn_server(programs: &[(&str, &str)]) -> Result<ServerHandle> {
    init_test_environment();

    let mut catalog = ProgramCatalog::new();
    for (name, source) in programs {
        catalog.insert(*name, source);
    }

    let dispatcher = CommandDispatcher::new(catalog, Arc::new(MiniInterpreter::new()));
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    DebugServer::new(dispatcher).serve(addr).await
}

/// Minimal line-protocol client: one request out, one response line back.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect to a running debug server.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self { reader: BufReader::new(read_half), writer: write_half })
    }

    /// Send one command and read the one-line response.
    pub async fn send(&mut self, command: &str) -> Result<String> {
        self.writer.write_all(format!("{command}\n").as_bytes()).await?;
        let mut response = String::new();
        let n = self.reader.read_line(&mut response).await?;
        if n == 0 {
            eyre::bail!("server closed the connection");
        }
        Ok(response.trim_end_matches('\n').to_string())
    }

    /// Retry `attach` until it succeeds or `attempts` runs out. Used after
    /// dropping another client, since the server releases that session's
    /// attachment asynchronously with respect to the TCP close.
    pub async fn attach_with_retry(&mut self, program: &str, attempts: usize) -> Result<String> {
        let expected = format!("Attached to '{program}'");
        let mut last = String::new();
        for _ in 0..attempts {
            last = self.send(&format!("attach {program}")).await?;
            if last == expected {
                return Ok(last);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(last)
    }
}
