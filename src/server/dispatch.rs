//! The request pipeline shared by both serving loops.
//!
//! Framing ([`frame_request`]) cuts one complete request out of a read
//! buffer, or says why it cannot. Dispatch ([`Dispatcher`]) runs a framed
//! request through the host check, the access log, and the route table.
//! Keeping both here means the event-loop and threaded servers differ only
//! in how they move bytes and where the session handler runs.

use tracing::{debug, info, warn};

use crate::assets::StaticFiles;
use crate::context::ServerContext;
use crate::http::request::RequestError;
use crate::http::{Request, Response, StatusCode};
use crate::session::{Bridge, SessionHandler};

use super::ServerSettings;
use super::routes::{RouteTable, RouteTarget};

/// Initial read buffer capacity per connection.
pub(crate) const INITIAL_BUF_SIZE: usize = 4096;

/// Outcome of trying to cut one complete request out of the buffer.
pub(crate) enum Framing {
    /// Head or body still incomplete; read more bytes.
    Partial,
    /// One complete request and the byte count it consumed.
    Complete(Request, usize),
    /// Protocol failure; answer this and close the connection.
    Reject(Response),
}

/// Frames the next request in `buf`.
///
/// The size cap applies to the whole buffered request, head and body. The
/// declared `Content-Length` decides completeness; this engine does not
/// accept chunked uploads. A declared length past the cap is rejected as
/// soon as the head parses, before any body bytes are buffered.
pub(crate) fn frame_request(buf: &[u8], max_request_bytes: usize) -> Framing {
    if buf.len() > max_request_bytes {
        return too_large();
    }

    match Request::parse(buf) {
        Ok((request, body_offset)) => {
            // The declared length is untrusted; the sum may not fit a usize.
            let total = body_offset.saturating_add(request.content_length().unwrap_or(0));
            if total > max_request_bytes {
                too_large()
            } else if buf.len() < total {
                Framing::Partial
            } else {
                Framing::Complete(request, total)
            }
        }
        Err(RequestError::Incomplete) => Framing::Partial,
        Err(e) => Framing::Reject(
            Response::new(StatusCode::BadRequest)
                .body(format!("Bad Request: {e}"))
                .keep_alive(false),
        ),
    }
}

fn too_large() -> Framing {
    Framing::Reject(
        Response::new(StatusCode::PayloadTooLarge)
            .body("Request entity too large")
            .keep_alive(false),
    )
}

/// Per-request pipeline shared by both serving loops.
pub(crate) struct Dispatcher<H> {
    bridge: Bridge<H>,
    routes: RouteTable,
    assets: StaticFiles,
    settings: ServerSettings,
}

impl<H: SessionHandler> Dispatcher<H> {
    pub(crate) fn new(
        bridge: Bridge<H>,
        routes: RouteTable,
        assets: StaticFiles,
        settings: ServerSettings,
    ) -> Self {
        Self {
            bridge,
            routes,
            assets,
            settings,
        }
    }

    pub(crate) fn max_request_bytes(&self) -> usize {
        self.settings.max_request_bytes
    }

    pub(crate) fn keep_alive_enabled(&self) -> bool {
        self.settings.keep_alive
    }

    /// Runs one framed request through the route table.
    ///
    /// Blocks for as long as the session handler does; the event loop calls
    /// this through its blocking pool. Never panics outward: the bridge
    /// confines handler panics to the request.
    pub(crate) fn dispatch(&self, request: Request) -> Response {
        let host = request.headers().get("host");
        if !self.settings.host_policy.permits(host) {
            warn!(host = host.unwrap_or("<missing>"), "rejected disallowed Host header");
            return Response::new(StatusCode::BadRequest).body("Bad Request: disallowed Host header");
        }

        if self.settings.debug {
            info!(method = %request.method(), path = request.path(), peer = ?request.peer_addr(), "request");
        } else {
            debug!(method = %request.method(), path = request.path(), peer = ?request.peer_addr(), "request");
        }

        match self.routes.resolve(request.path()) {
            Some(RouteTarget::Session) => self.bridge.dispatch(ServerContext::new(request)),
            Some(RouteTarget::Assets) => self.assets.respond(request.path()),
            None => Response::new(StatusCode::NotFound).body("Not Found"),
        }
    }
}
