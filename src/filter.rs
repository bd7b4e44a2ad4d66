//! Request-pipeline gate: refresh before serve.
//!
//! Installed as an axum middleware layer, [`watch_filter`] runs a full
//! refresh cycle before each request reaches the inner service. A failed
//! refresh short-circuits the stack and renders the error instead, so the
//! browser shows the broken build rather than the output of an older one.

use std::error::Error;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};

use crate::watcher::{RefreshError, RefreshWatcher};

/// Middleware state: the coordinator, if the application installed one.
///
/// Deployments with watching disabled share the same router wiring by
/// passing `None`, which turns the filter into a pass-through.
pub type InstalledWatcher = Option<Arc<RefreshWatcher>>;

/// Run a refresh cycle, then hand the request to the inner service.
///
/// The refresh error, when there is one, is the listener's own; it is
/// rendered verbatim with its source chain. The inner service is never
/// invoked for a failed cycle.
pub async fn watch_filter(
    State(watcher): State<InstalledWatcher>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(watcher) = &watcher {
        if let Err(err) = watcher.notify().await {
            return render_refresh_error(&err);
        }
    }
    next.run(request).await
}

/// Render a refresh failure as a minimal HTML error page.
///
/// Always HTML: this is a development surface and the audience is a
/// person with a browser open, not an API client.
pub fn render_refresh_error(err: &RefreshError) -> Response {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str("\ncaused by: ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Refresh failed</title></head>\n<body>\n\
         <h1>Refresh failed</h1>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(&detail)
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Html(body)).into_response()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
