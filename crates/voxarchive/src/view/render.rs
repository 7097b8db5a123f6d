//! Server-side HTML for the dashboard.

use std::fmt::Write;

use reqwest::Url;

use super::archive::DayLog;
use crate::sync::SyncReport;

/// Everything the dashboard page shows.
pub struct DashboardView<'a> {
    pub days: &'a [DayLog],
    pub running: bool,
    pub last_run: Option<&'a SyncReport>,
    /// Token to carry into the control forms, if the page was opened with one.
    pub token: Option<&'a str>,
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:60rem;margin:2rem auto;padding:0 1rem}\
.day{border-top:1px solid #ccc;margin-top:1.5rem}\
.msg{margin:.75rem 0}.meta{color:#666;font-size:.85rem}\
.status{padding:.5rem;border-radius:.25rem;background:#f3f3f3}\
form{display:inline}";

/// Render the full dashboard page.
pub fn render_dashboard(view: &DashboardView<'_>) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    html.push_str("<title>Voice archive</title><style>");
    html.push_str(STYLE);
    html.push_str("</style></head><body>\n<h1>Voice archive</h1>\n");

    render_controls(&mut html, view);

    if view.days.is_empty() {
        html.push_str("<p>No conversations archived yet.</p>\n");
    }
    for day in view.days {
        let _ = write!(
            html,
            "<section class=\"day\"><h2>Date: {}</h2>\n",
            escape_html(&day.date)
        );
        for msg in &day.messages {
            let _ = write!(
                html,
                "<div class=\"msg\"><div class=\"meta\">{} &middot; {}</div><div>{}</div>",
                escape_html(&msg.sender),
                escape_html(&msg.timestamp),
                escape_html(&msg.text)
            );
            if let Some(ref audio) = msg.audio_path {
                let _ = write!(
                    html,
                    "<audio controls preload=\"none\" src=\"/data/{}\"></audio>",
                    escape_html(audio)
                );
            }
            html.push_str("</div>\n");
        }
        html.push_str("</section>\n");
    }

    html.push_str("</body></html>\n");
    html
}

fn render_controls(html: &mut String, view: &DashboardView<'_>) {
    let state = if view.running { "running" } else { "idle" };
    let _ = write!(html, "<p class=\"status\">Sync is <strong>{state}</strong>");
    if let Some(report) = view.last_run {
        let _ = write!(
            html,
            " &middot; last run finished {} ({} saved, {} skipped, {} failed)",
            escape_html(&report.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            report.saved,
            report.skipped,
            report.failed
        );
        if report.outcome.is_failure() {
            html.push_str(" &middot; <em>ended with an error, see logs</em>");
        }
    }
    html.push_str("</p>\n");

    let _ = write!(
        html,
        "<form method=\"post\" action=\"{}\"><button{}>Sync now</button></form>\n",
        escape_html(&with_token("/sync", view.token)),
        if view.running { " disabled" } else { "" }
    );
    let _ = write!(
        html,
        "<form method=\"post\" action=\"{}\"><button{}>Stop</button></form>\n",
        escape_html(&with_token("/stop", view.token)),
        if view.running { "" } else { " disabled" }
    );
}

/// `path` with the token appended as a query parameter.
pub fn with_token(path: &str, token: Option<&str>) -> String {
    let Some(token) = token else {
        return path.to_string();
    };
    let Ok(mut url) = Url::parse("http://localhost") else {
        return path.to_string();
    };
    url.set_path(path);
    url.query_pairs_mut().append_pair("token", token);
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
