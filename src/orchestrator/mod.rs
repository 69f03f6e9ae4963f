//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 驱动两条严格顺序的批次循环，做调度和统计，不做具体业务判断：
//!
//! ### `download_batch` - 下载批次
//! - 逐项生成 URL / 本地文件名（迭代 → 尝试 → 重试 → 记录）
//! - 已存在的文件直接跳过（幂等续传）
//! - 汇总 `BatchResult`（成功 / 跳过 / 失败 URL 列表）
//!
//! ### `extract_batch` - 提取批次
//! - 字典序遍历图片目录，过滤扩展名白名单
//! - 每张图片恰好追加一个报告条目
//! - 汇总 `ExtractStats`
//!
//! ## 层次关系
//!
//! ```text
//! app (管线接线)
//!     ↓
//! orchestrator (批次循环 + 统计)
//!     ↓
//! services (能力层：fetcher / vision / report_writer)
//! ```

pub mod download_batch;
pub mod extract_batch;

pub use download_batch::{BatchResult, DownloadBatch};
pub use extract_batch::{ExtractBatch, ExtractStats};
