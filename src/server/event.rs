//! Event-loop serving: one tokio runtime owns every connection and, when the
//! registry needs it, the cooperative scheduler as well.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{Response, StatusCode};
use crate::scheduler::JobQueue;
use crate::session::SessionHandler;

use super::ServerError;
use super::dispatch::{Dispatcher, Framing, INITIAL_BUF_SIZE, frame_request};

/// Runs the accept loop on a fresh multi-thread runtime until process exit.
///
/// The scheduler queue, when present, is consumed as a task on this same
/// runtime: the loop that serves requests is the loop that resumes
/// cooperative apps, and no extra thread exists in this mode.
pub(crate) fn serve<H>(
    listener: std::net::TcpListener,
    dispatcher: Arc<Dispatcher<H>>,
    jobs: Option<JobQueue>,
) -> Result<(), ServerError>
where
    H: SessionHandler,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        if let Some(queue) = jobs {
            tokio::spawn(queue.drive());
        }

        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        info!(address = %listener.local_addr()?, mode = "event-loop", "gantry serving");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer, "connection accepted");
            let dispatcher = Arc::clone(&dispatcher);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, dispatcher).await {
                    warn!(peer = %peer, error = %e, "connection closed with error");
                }
            });
        }
    })
}

/// One connection's lifetime: frame, dispatch, write, repeat while
/// keep-alive holds.
///
/// Already-buffered requests are drained before the next read, so pipelined
/// requests are answered without waiting for more bytes. The session handler
/// is synchronous, so each complete request runs on the blocking pool; a
/// dispatch that panics outside the bridge surfaces as a join error and
/// answers 500 without touching the accept loop.
async fn handle_connection<H>(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher<H>>,
) -> Result<(), std::io::Error>
where
    H: SessionHandler,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        match frame_request(&buf, dispatcher.max_request_bytes()) {
            Framing::Partial => {
                let bytes_read = stream.read_buf(&mut buf).await?;
                if bytes_read == 0 {
                    debug!(peer = %peer, "connection closed by peer");
                    break;
                }
            }
            Framing::Reject(response) => {
                warn!(peer = %peer, status = %response.status(), "rejecting request");
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
            Framing::Complete(request, consumed) => {
                let keep_alive = request.is_keep_alive() && dispatcher.keep_alive_enabled();
                let request = request.with_peer(peer);

                let worker = Arc::clone(&dispatcher);
                let response =
                    match tokio::task::spawn_blocking(move || worker.dispatch(request)).await {
                        Ok(response) => response,
                        Err(e) => {
                            error!(peer = %peer, error = %e, "request dispatch failed");
                            Response::new(StatusCode::InternalServerError)
                                .body("Internal Server Error")
                        }
                    };

                stream
                    .write_all(&response.keep_alive(keep_alive).into_bytes())
                    .await?;
                stream.flush().await?;

                let _ = buf.split_to(consumed);

                if !keep_alive {
                    debug!(peer = %peer, "Connection: close — shutting down");
                    break;
                }
            }
        }
    }

    Ok(())
}
