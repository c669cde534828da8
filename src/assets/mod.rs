//! Static asset responder behind the wildcard route.
//!
//! Everything that is not the session endpoint resolves here: front-end
//! bundles, stylesheets, fonts. Request paths are percent-decoded and must
//! consist of plain name components; anything else answers 404 without
//! touching the filesystem.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use tracing::warn;

use crate::http::{Response, StatusCode};

/// Directory-rooted file responder.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Creates a responder rooted at `root`. The directory does not need to
    /// exist yet; missing files simply answer 404.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured asset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Answers one asset request for the URL `path`.
    ///
    /// Missing or denied paths answer 404; an unreadable file that does
    /// exist answers 500 and is logged, since that points at a deployment
    /// problem rather than a client mistake.
    pub fn respond(&self, path: &str) -> Response {
        let Some(relative) = sanitize(path) else {
            return not_found();
        };

        let target = self.root.join(relative);
        if !target.is_file() {
            return not_found();
        }

        match std::fs::read(&target) {
            Ok(bytes) => Response::new(StatusCode::Ok)
                .header("Content-Type", content_type_for(&target))
                .body_bytes(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => not_found(),
            Err(e) => {
                warn!(path = %target.display(), error = %e, "failed to read static asset");
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }
        }
    }
}

fn not_found() -> Response {
    Response::new(StatusCode::NotFound).body("Not Found")
}

/// Decodes the URL path and confines it below the root.
///
/// Returns `None` unless every component is a plain name: no parent or
/// current-directory steps, no absolute prefixes, no invalid UTF-8 in the
/// percent-encoding.
fn sanitize(raw: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let relative = Path::new(trimmed);
    if relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        Some(relative.to_owned())
    } else {
        None
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(OsStr::to_str) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
