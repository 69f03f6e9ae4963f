//! # Download Image QA
//!
//! 论坛附件批量下载 + 多模态 LLM 题目答案提取
//!
//! ## 架构设计
//!
//! 两条管线共用同一个模式（迭代 → 尝试 → 重试 → 记录），按三层组织：
//!
//! ### ① 基础模块
//! - `url_pattern` - 从一个示例 URL 推断整个附件序列
//! - `retry` - 固定间隔重试组合子（两条管线共用）
//! - `progress` - 进度事件通道 + 取消令牌（核心不直接打印）
//! - `credential` - 单行凭证文件的读写与作废
//!
//! ### ② 业务能力层（Services）
//! - `services::fetcher` - 下载一个 URL 到一个路径（带重试）
//! - `services::vision` - 识别一张图片（带重试）
//! - `services::report_writer` - 追加一个报告条目（只追加，从不截断）
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator::download_batch` - 顺序下载循环（跳过已存在 = 幂等续传）
//! - `orchestrator::extract_batch` - 字典序提取循环（每图一个报告条目）
//!
//! 浏览器自动化（`browser`）只负责发现起始附件 URL，是下载管线的
//! 可选前置步骤。

pub mod app;
pub mod browser;
pub mod config;
pub mod credential;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod services;
pub mod url_pattern;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use credential::CredentialStore;
pub use error::{AppError, AppResult};
pub use orchestrator::{BatchResult, DownloadBatch, ExtractBatch, ExtractStats};
pub use progress::{CancelToken, Pipeline, ProgressEvent, ProgressSink};
pub use retry::retry_with_fixed_delay;
pub use services::{
    AttachmentFetcher, ExtractAnswer, Fetch, ReportWriter, SessionCookies, VisionService,
};
pub use url_pattern::SequenceDescriptor;
