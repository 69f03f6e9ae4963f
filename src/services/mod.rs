//! 业务能力层（Services）
//!
//! 每个服务只描述一种能力，不关心批次顺序：
//! - `fetcher` - 把一个 URL 下载到一个路径（带重试）
//! - `vision` - 识别一张图片（带重试）
//! - `report_writer` - 追加一个报告条目

pub mod fetcher;
pub mod report_writer;
pub mod vision;

pub use fetcher::{AttachmentFetcher, Fetch, SessionCookies};
pub use report_writer::{derive_report_name, ReportBody, ReportWriter, DEFAULT_REPORT_FILE};
pub use vision::{ExtractAnswer, VisionService};
