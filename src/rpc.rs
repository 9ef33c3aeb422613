//! RPC control protocol over TCP.
//!
//! Structured request/response records, JSON-encoded behind a 4-byte
//! little-endian length prefix. Each connection carries exactly one call:
//! read the request, write the reply, close. The accept loop serves one
//! connection fully before accepting the next, which enforces global
//! single-flight benchmark execution at the transport layer.
//!
//! A [`Client`] helper (connect, one call, decode) ships here for external
//! drivers and the integration tests.

use std::io::Write as _;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::options::Options;
use crate::results::RunResult;
use crate::server::{ControlState, RunRequest};

/// Upper bound on a single frame. Requests and replies are small records;
/// anything near this size is a broken or hostile peer.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Wire-level failures on one connection. Never fatal to the server.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    /// All registered benchmark names, unordered.
    List,
    /// Replace the server's options wholesale.
    Set(Options),
    /// Execute one benchmark run.
    Run(RunRequest),
    /// Terminate the server process.
    Kill,
}

/// Reply envelope shared by every method.
///
/// Exactly one payload field is set for a successful call; `error` rides
/// alongside `result` only for the parallelism-leak condition, where the
/// result is reported and the caller is warned in the same reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    fn error(message: String) -> Self {
        Reply {
            error: Some(message),
            ..Default::default()
        }
    }
}

/// Read one length-prefixed frame.
pub async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed frame and flush it.
pub async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    stream.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Bind the control listener with its socket options applied.
pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .context("creating listener socket")?;
    socket
        .set_reuse_address(true)
        .context("setting SO_REUSEADDR")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("binding {}", addr))?;
    socket.listen(16).context("listening")?;
    socket
        .set_nonblocking(true)
        .context("setting listener non-blocking")?;
    TcpListener::from_std(socket.into()).context("registering listener with the runtime")
}

/// Serve RPC calls on `listener` until killed.
///
/// Prints the resolved listen address as a single line on stdout once the
/// listener is live; a supervisor that piped the child's stdout reads it as
/// the readiness signal and learns the port when `:0` was requested. An
/// accept failure is fatal and propagates to the caller; per-connection
/// failures are logged and the loop keeps accepting.
pub async fn serve(state: &mut ControlState, listener: TcpListener) -> Result<()> {
    let local = listener.local_addr().context("reading listener address")?;

    // Ready line. Stdout carries nothing else in RPC mode.
    println!("{}", local);
    std::io::stdout().flush().context("flushing ready line")?;
    info!("benchmark control server listening on {}", local);

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        debug!("serving connection from {}", peer);
        if let Err(e) = serve_connection(state, stream).await {
            warn!("connection from {} failed: {}", peer, e);
        }
    }
}

/// Serve exactly one call on an accepted connection.
async fn serve_connection(state: &mut ControlState, mut stream: TcpStream) -> Result<(), FrameError> {
    stream.set_nodelay(true)?;

    let payload = read_frame(&mut stream).await?;
    let request: Request = match serde_json::from_slice(&payload) {
        Ok(request) => request,
        Err(e) => {
            // Undecodable requests get an error envelope while the
            // connection is still writable, then the connection closes.
            warn!("undecodable request: {}", e);
            let reply = Reply::error(format!("malformed request: {}", e));
            write_frame(&mut stream, &serde_json::to_vec(&reply)?).await?;
            return Ok(());
        }
    };

    let kill = matches!(request, Request::Kill);
    let reply = dispatch(state, request).await;
    write_frame(&mut stream, &serde_json::to_vec(&reply)?).await?;

    if kill {
        // The acknowledgement is already flushed; shut the stream down so
        // the peer sees a clean close before the process goes away.
        info!("kill requested, shutting down");
        let _ = stream.shutdown().await;
        std::process::exit(0);
    }
    Ok(())
}

async fn dispatch(state: &mut ControlState, request: Request) -> Reply {
    match request {
        Request::List => Reply {
            names: Some(state.list()),
            ..Default::default()
        },
        Request::Set(options) => {
            state.set_options(options);
            Reply::default()
        }
        Request::Run(run) => match state.run(&run).await {
            Ok(outcome) => Reply {
                result: Some(outcome.result),
                // A leak warns in the same reply that carries the result.
                error: outcome.leak.map(|degree| {
                    format!(
                        "{} left parallelism set to {}",
                        outcome.display_name, degree
                    )
                }),
                ..Default::default()
            },
            // Both user errors and run failures travel as the envelope's
            // error string; the text distinguishes them.
            Err(e) => Reply::error(e.to_string()),
        },
        Request::Kill => Reply::default(),
    }
}

/// Minimal driver-side client: one connection per call.
#[derive(Debug, Clone, Copy)]
pub struct Client {
    addr: SocketAddr,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Issue one call and decode the reply envelope.
    pub async fn call(&self, request: &Request) -> Result<Reply> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("connecting to {}", self.addr))?;
        stream.set_nodelay(true).context("setting TCP_NODELAY")?;

        write_frame(&mut stream, &serde_json::to_vec(request)?)
            .await
            .context("sending request")?;
        let payload = read_frame(&mut stream).await.context("reading reply")?;
        serde_json::from_slice(&payload).context("decoding reply")
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let reply = self.call(&Request::List).await?;
        if let Some(error) = reply.error {
            anyhow::bail!(error);
        }
        reply.names.context("List reply carried no names")
    }

    pub async fn set(&self, options: Options) -> Result<()> {
        let reply = self.call(&Request::Set(options)).await?;
        if let Some(error) = reply.error {
            anyhow::bail!(error);
        }
        Ok(())
    }

    /// Run a benchmark. On success returns the result and, when the body
    /// leaked the parallelism degree, the leak warning that came with it.
    pub async fn run(&self, request: RunRequest) -> Result<(RunResult, Option<String>)> {
        let reply = self.call(&Request::Run(request)).await?;
        match (reply.result, reply.error) {
            (Some(result), warning) => Ok((result, warning)),
            (None, Some(error)) => anyhow::bail!(error),
            (None, None) => anyhow::bail!("Run reply carried neither result nor error"),
        }
    }

    pub async fn kill(&self) -> Result<()> {
        let reply = self.call(&Request::Kill).await?;
        if let Some(error) = reply.error {
            anyhow::bail!(error);
        }
        Ok(())
    }
}
