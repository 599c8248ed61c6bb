//! Server-rendered HTML: the public index, the admin key table and the
//! admin error page, plus the static assets they load.

use {
    askama::Template,
    axum::{
        http::{StatusCode, header},
        response::{Html, IntoResponse, Response},
    },
    chatbridge_protocol::ChannelName,
    tracing::error,
};

use crate::error::ApiError;

pub const SCRIPT_JS: &str = include_str!("assets/script.js");
pub const STYLE_CSS: &str = include_str!("assets/style.css");

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage<'a> {
    pub name: &'a str,
    /// Trusted operator-supplied HTML.
    pub contact: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    pub key: String,
    pub channel: String,
    pub connected: bool,
}

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminPage {
    pub rows: Vec<KeyRow>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage<'a> {
    pub status: u16,
    pub message: &'a str,
}

/// Table rows for the admin page: connected channels first, each group in
/// key order.
pub fn key_rows<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    connected: &[ChannelName],
) -> Vec<KeyRow> {
    let (mut online, offline): (Vec<_>, Vec<_>) = entries
        .map(|(key, channel)| KeyRow {
            key: key.to_string(),
            channel: channel.to_string(),
            connected: connected.contains(&ChannelName::new(channel)),
        })
        .partition(|row| row.connected);
    online.extend(offline);
    online
}

/// Render a template, answering 500 when rendering fails.
pub fn render(template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

/// HTML rendition of an admin gate failure.
pub fn error_page(err: &ApiError) -> Response {
    let message = err.to_string();
    let page = ErrorPage {
        status: err.status().as_u16(),
        message: &message,
    };
    (err.status(), render(&page)).into_response()
}

pub async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        SCRIPT_JS,
    )
}

pub async fn style() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLE_CSS)
}
