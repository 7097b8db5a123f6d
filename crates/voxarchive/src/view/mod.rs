//! Read-only view over the archive: directory scan and dashboard HTML.

mod archive;
mod render;

pub use archive::{DayLog, MessageView, scan_archive};
pub use render::{DashboardView, escape_html, render_dashboard, with_token};
