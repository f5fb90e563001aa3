//! # Windows Named Pipe Listener
//!
//! File: cli/src/server/pipe.rs
//! Author: Christi Mahu
//!
//! Adapts Tokio's named pipe server to `axum::serve`. A named pipe accepts one client
//! per instance, so after every connection a fresh instance is created under the
//! same name to wait for the next client.
//!
use axum::serve::Listener;
use std::io;
use std::time::Duration;
use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};
use tracing::error;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct PipeListener {
    name: String,
    next: NamedPipeServer,
}

impl PipeListener {
    /// Creates the first pipe instance. Fails if another process already owns `name`.
    pub fn bind(name: &str) -> io::Result<Self> {
        let next = ServerOptions::new()
            .first_pipe_instance(true)
            .create(name)?;
        Ok(Self {
            name: name.to_string(),
            next,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Listener for PipeListener {
    type Io = NamedPipeServer;
    type Addr = String;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            if let Err(e) = self.next.connect().await {
                error!("Named pipe {} failed to accept: {}", self.name, e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
            match ServerOptions::new().create(&self.name) {
                Ok(fresh) => {
                    let connected = std::mem::replace(&mut self.next, fresh);
                    return (connected, self.name.clone());
                }
                Err(e) => {
                    error!("Could not create next instance of {}: {}", self.name, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.name.clone())
    }
}
