//! A small long-polling echo server exercising both execution modes.
//!
//! Run on the default event loop:
//!
//! ```sh
//! cargo run --example long_poll
//! ```
//!
//! Or thread-per-connection with the background scheduler thread:
//!
//! ```sh
//! GANTRY_THREADED_SERVER=1 cargo run --example long_poll
//! ```
//!
//! Then poll a session:
//!
//! ```sh
//! curl 'http://127.0.0.1:8080/?app=echo'
//! curl -d '{"text":"hi"}' 'http://127.0.0.1:8080/?app=echo'
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use gantry::{
    AppEntry, Applications, Content, HttpContext, ServerConfig, SessionConfig, SessionHandler,
    StatusCode,
};

#[derive(Debug, Deserialize)]
struct ClientMessage {
    text: String,
}

/// Echoes poll bodies back and pushes a delayed job per message onto the
/// scheduler, so both modes demonstrably resume cooperative work.
struct EchoSessions {
    config: SessionConfig,
}

impl SessionHandler for EchoSessions {
    fn handle_request(&self, ctx: &mut dyn HttpContext) {
        let app = ctx.url_parameter_or("app", "echo").to_owned();
        if !self.config.registry.contains(&app) {
            ctx.set_status(StatusCode::NotFound);
            ctx.set_content(Content::from(format!("no app named {app}")));
            return;
        }

        let message = ctx
            .json_body()
            .and_then(|body| serde_json::from_value::<ClientMessage>(body).ok());

        if let (Some(message), Some(scheduler)) = (&message, &self.config.scheduler) {
            let text = message.text.clone();
            let queued = scheduler.spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                tracing::info!(text, "echo job ran");
            });
            if queued.is_err() {
                ctx.set_status(StatusCode::ServiceUnavailable);
                ctx.set_content(Content::from("scheduler is gone"));
                return;
            }
        }

        let reply = json!({
            "app": app,
            "method": ctx.method(),
            "echo": message.map(|m| m.text),
        });
        if ctx.set_json(&reply).is_err() {
            ctx.set_status(StatusCode::InternalServerError);
            ctx.set_content(Content::from("reply serialization failed"));
        }
    }
}

fn main() -> Result<(), gantry::ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "long_poll=info,gantry=info".into()),
        )
        .init();

    let apps = Applications::named([
        ("echo", AppEntry::synchronous(|| {})),
        (
            "ticker",
            AppEntry::cooperative(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }),
        ),
    ]);

    let config = ServerConfig::new(apps)
        .host("127.0.0.1")
        .port(8080)
        .cdn(false)
        .allow_origin("http://localhost:*");

    gantry::start_server(config, |config| EchoSessions { config })
}
