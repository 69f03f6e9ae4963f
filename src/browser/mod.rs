//! 浏览器自动化（起始附件发现用）

pub mod connection;
pub mod discover;

pub use connection::connect_to_browser_and_page;
pub use discover::discover_start_url;
