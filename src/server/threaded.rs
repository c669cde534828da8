//! Threaded serving: the blocking mirror of the event loop, one OS thread
//! per connection.
//!
//! Cooperative apps cannot resume on request threads; when the registry
//! needs a scheduler, the bootstrap starts the single background scheduler
//! thread before this loop begins accepting. Request handling here calls
//! the dispatcher inline, since blocking is exactly what these threads are
//! for.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, error, info, warn};

use crate::session::SessionHandler;

use super::ServerError;
use super::dispatch::{Dispatcher, Framing, INITIAL_BUF_SIZE, frame_request};

/// Idle keep-alive sockets release their thread after this long.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn serve<H>(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<H>>,
) -> Result<(), ServerError>
where
    H: SessionHandler,
{
    info!(address = %listener.local_addr()?, mode = "threaded", "gantry serving");

    loop {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };

        debug!(peer = %peer, "connection accepted");
        let dispatcher = Arc::clone(&dispatcher);
        let spawned = std::thread::Builder::new()
            .name("gantry-conn".to_owned())
            .spawn(move || {
                if let Err(e) = handle_connection(stream, peer, dispatcher) {
                    warn!(peer = %peer, error = %e, "connection closed with error");
                }
            });

        if let Err(e) = spawned {
            error!(peer = %peer, error = %e, "failed to spawn connection thread");
        }
    }
}

fn handle_connection<H>(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher<H>>,
) -> Result<(), io::Error>
where
    H: SessionHandler,
{
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut chunk = [0u8; INITIAL_BUF_SIZE];

    loop {
        match frame_request(&buf, dispatcher.max_request_bytes()) {
            Framing::Partial => {
                let bytes_read = match stream.read(&mut chunk) {
                    Ok(n) => n,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) =>
                    {
                        debug!(peer = %peer, "idle connection timed out");
                        break;
                    }
                    Err(e) => return Err(e),
                };
                if bytes_read == 0 {
                    debug!(peer = %peer, "connection closed by peer");
                    break;
                }
                buf.extend_from_slice(&chunk[..bytes_read]);
            }
            Framing::Reject(response) => {
                warn!(peer = %peer, status = %response.status(), "rejecting request");
                stream.write_all(&response.into_bytes())?;
                break;
            }
            Framing::Complete(request, consumed) => {
                let keep_alive = request.is_keep_alive() && dispatcher.keep_alive_enabled();
                let response = dispatcher.dispatch(request.with_peer(peer));

                stream.write_all(&response.keep_alive(keep_alive).into_bytes())?;
                stream.flush()?;

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
