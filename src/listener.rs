//! Outbound mode: accept connections from FreeSWITCH's `socket` application

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::{
    connection::{EslConnectOptions, EslConnection},
    error::EslResult,
};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP listener handing each accepted session to its own task.
///
/// FreeSWITCH connects to us (`<action application="socket"
/// data="127.0.0.1:8040 async full"/>`), so no password exchange takes
/// place; the first command a handler usually sends is
/// [`connect_session`](EslConnection::connect_session).
///
/// ```rust,no_run
/// use freeswitch_eventsocket::{EslConnection, EslListener, EslError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), EslError> {
///     let listener = EslListener::bind("0.0.0.0:8040").await?;
///     listener
///         .serve(|conn: EslConnection| async move {
///             if let Ok(channel) = conn.connect_session().await {
///                 println!("call {}", channel.unique_id().unwrap_or("?"));
///             }
///         })
///         .await
/// }
/// ```
#[derive(Debug)]
pub struct EslListener {
    listener: TcpListener,
    options: EslConnectOptions,
}

impl EslListener {
    /// Bind a listening socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> EslResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("[ACCEPT] Listening on {:?}", listener.local_addr());
        Ok(Self {
            listener,
            options: EslConnectOptions::default(),
        })
    }

    /// Options applied to every accepted connection.
    pub fn with_options(mut self, options: EslConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> EslResult<SocketAddr> {
        Ok(self
            .listener
            .local_addr()?)
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> EslResult<EslConnection> {
        let (stream, peer) = self
            .listener
            .accept()
            .await?;
        info!("[ACCEPT] Accepted connection from {}", peer);
        Ok(EslConnection::from_tcp(stream, self.options.clone()))
    }

    /// Accept forever, running `handler` on a new task per connection.
    ///
    /// Accept errors are logged and the loop continues.
    pub async fn serve<F, Fut>(self, handler: F) -> EslResult<()>
    where
        F: Fn(EslConnection) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.serve_with_shutdown(handler, std::future::pending::<()>())
            .await
    }

    /// Like [`serve`](Self::serve), returning once `shutdown` completes.
    ///
    /// Handlers already running are left to finish on their own.
    pub async fn serve_with_shutdown<F, Fut, S>(self, handler: F, shutdown: S) -> EslResult<()>
    where
        F: Fn(EslConnection) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[ACCEPT] Shutdown requested, no longer accepting");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("[ACCEPT] Accepted connection from {}", peer);
                        let conn = EslConnection::from_tcp(stream, self.options.clone());
                        tokio::spawn(handler(conn));
                    }
                    Err(e) => {
                        warn!("[ACCEPT] Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        debug!("[ACCEPT] Resuming accept loop");
                    }
                },
            }
        }
    }
}

/// Bind `addr` and [`serve`](EslListener::serve) `handler` forever.
///
/// Only a bind failure makes this return.
pub async fn listen_and_serve<F, Fut>(addr: impl ToSocketAddrs, handler: F) -> EslResult<()>
where
    F: Fn(EslConnection) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    EslListener::bind(addr)
        .await?
        .serve(handler)
        .await
}
