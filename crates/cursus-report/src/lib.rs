//! cursus-report: self-contained HTML rendering of deliberation reports.

pub mod html;

pub use html::{generate_html, write_html_report};
