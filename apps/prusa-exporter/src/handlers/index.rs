//! 首页与健康检查。
//!
//! - GET /
//! - GET /health

use api_contract::HealthDto;
use axum::{Json, extract::State, response::Html, response::IntoResponse};

use crate::AppState;

pub async fn health() -> impl IntoResponse {
    Json(HealthDto { ok: true })
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>prusa_exporter</title></head>\n\
         <body>\n\
         <h1>prusa_exporter</h1>\n\
         <p>Syslog server running at - <b>{}</b></p>\n\
         <p><a href=\"{}\">UDP Metrics</a></p>\n\
         </body>\n\
         </html>",
        escape_html(&state.syslog_addr),
        escape_html(&state.udp_metrics_path),
    ))
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
