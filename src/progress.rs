//! 进度事件与观察者通道
//!
//! 核心逻辑不直接打印：每次重试和每个批次里程碑都作为结构化事件发到
//! 一条 mpsc 通道上，终端（tracing 消费者）或将来的 UI 日志面板都只是
//! 这条通道的消费者。事件按管线身份打标签，两条管线可以共用一个通道。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

/// 事件所属的管线
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// 附件批量下载
    Downloader,
    /// 图片答案提取
    Extractor,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Downloader => write!(f, "DOWNLOADER"),
            Pipeline::Extractor => write!(f, "PROCESSOR"),
        }
    }
}

/// 进度事件
///
/// `Display` 输出沿用命令行版的格式（`[SUCCESS]`、`[ATTEMPT a/m]` 等），
/// 消费者可以直接逐行展示。
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// URL 模式解析成功
    PatternResolved { prefix: String, start_index: u64 },
    /// 开始下载某个文件
    DownloadStarted { filename: String, url: String },
    /// 单次尝试失败（下载或识别，重试前）
    AttemptFailed {
        pipeline: Pipeline,
        name: String,
        attempt: usize,
        max_attempts: usize,
        error: String,
    },
    /// 文件下载成功
    Downloaded { filename: String },
    /// 文件已存在，跳过
    Skipped { filename: String },
    /// 重试耗尽，文件下载失败
    DownloadFailed { filename: String, max_attempts: usize },
    /// 下载批次结束
    DownloadSummary {
        successful: usize,
        skipped: usize,
        failed: usize,
        total: usize,
    },
    /// 开始识别某张图片
    ExtractStarted { filename: String },
    /// 图片识别成功
    Extracted { filename: String },
    /// 图片识别失败（已写入报告错误行）
    ExtractFailed { filename: String, error: String },
    /// 提取批次结束
    ExtractSummary {
        extracted: usize,
        failed: usize,
        report_path: String,
    },
    /// 批次被取消
    Cancelled { pipeline: Pipeline },
}

impl ProgressEvent {
    /// 事件所属的管线
    pub fn pipeline(&self) -> Pipeline {
        match self {
            ProgressEvent::PatternResolved { .. }
            | ProgressEvent::DownloadStarted { .. }
            | ProgressEvent::Downloaded { .. }
            | ProgressEvent::Skipped { .. }
            | ProgressEvent::DownloadFailed { .. }
            | ProgressEvent::DownloadSummary { .. } => Pipeline::Downloader,
            ProgressEvent::ExtractStarted { .. }
            | ProgressEvent::Extracted { .. }
            | ProgressEvent::ExtractFailed { .. }
            | ProgressEvent::ExtractSummary { .. } => Pipeline::Extractor,
            ProgressEvent::AttemptFailed { pipeline, .. }
            | ProgressEvent::Cancelled { pipeline } => *pipeline,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::PatternResolved {
                prefix,
                start_index,
            } => write!(f, "Parsed URL. Base name: {}, Start ID: {}", prefix, start_index),
            ProgressEvent::DownloadStarted { filename, url } => {
                write!(f, "Downloading {} from {}", filename, url)
            }
            ProgressEvent::AttemptFailed {
                name,
                attempt,
                max_attempts,
                error,
                ..
            } => write!(
                f,
                "[ATTEMPT {}/{}] Failed for {}. Error: {}",
                attempt, max_attempts, name, error
            ),
            ProgressEvent::Downloaded { filename } => {
                write!(f, "[SUCCESS] Downloaded {}", filename)
            }
            ProgressEvent::Skipped { filename } => {
                write!(f, "[SKIPPED] {} already exists.", filename)
            }
            ProgressEvent::DownloadFailed {
                filename,
                max_attempts,
            } => write!(
                f,
                "[FAILURE] All {} attempts failed for {}.",
                max_attempts, filename
            ),
            ProgressEvent::DownloadSummary {
                successful,
                skipped,
                failed,
                total,
            } => write!(
                f,
                "Summary: {} downloaded, {} skipped, {} failed (out of {} total).",
                successful, skipped, failed, total
            ),
            ProgressEvent::ExtractStarted { filename } => {
                write!(f, "Processing image: {}...", filename)
            }
            ProgressEvent::Extracted { filename } => write!(f, "[SUCCESS] {}", filename),
            ProgressEvent::ExtractFailed { filename, error } => {
                write!(f, "[ERROR] {}: {}", filename, error)
            }
            ProgressEvent::ExtractSummary {
                extracted,
                failed,
                report_path,
            } => write!(
                f,
                "Batch complete: {} extracted, {} failed. Results appended to '{}'.",
                extracted, failed, report_path
            ),
            ProgressEvent::Cancelled { pipeline } => {
                write!(f, "[CANCELLED] {} batch stopped between items.", pipeline)
            }
        }
    }
}

/// 进度事件发送端
///
/// 可以随意克隆；接收端关闭后发送会被静默丢弃（核心逻辑不因没人看
/// 进度而失败）。
#[derive(Clone)]
pub struct ProgressSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    /// 创建通道，返回发送端和裸接收端（UI 消费用）
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 创建一个把事件写入 tracing 日志的发送端
    ///
    /// 在后台任务里消费通道，每个事件一行，带管线标签。
    pub fn tracing() -> Self {
        let (sink, mut rx) = Self::channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                info!("{}: {}", event.pipeline(), event);
            }
        });
        sink
    }

    /// 发送一个事件
    pub fn emit(&self, event: ProgressEvent) {
        // 接收端可能已经关闭，忽略发送错误
        let _ = self.tx.send(event);
    }
}

/// 协作式取消令牌
///
/// 批次循环在相邻条目之间检查它；进行中的单个条目不会被打断。
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消，下一次条目间检查时生效
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display_matches_cli_lines() {
        let event = ProgressEvent::AttemptFailed {
            pipeline: Pipeline::Downloader,
            name: "foo_bar.199272.webp".to_string(),
            attempt: 2,
            max_attempts: 4,
            error: "超时".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "[ATTEMPT 2/4] Failed for foo_bar.199272.webp. Error: 超时"
        );

        let event = ProgressEvent::Skipped {
            filename: "foo_bar.199272.webp".to_string(),
        };
        assert_eq!(event.to_string(), "[SKIPPED] foo_bar.199272.webp already exists.");
    }

    #[test]
    fn test_event_pipeline_tag() {
        let event = ProgressEvent::Downloaded {
            filename: "a.webp".to_string(),
        };
        assert_eq!(event.pipeline(), Pipeline::Downloader);
        assert_eq!(event.pipeline().to_string(), "DOWNLOADER");

        let event = ProgressEvent::ExtractStarted {
            filename: "a.webp".to_string(),
        };
        assert_eq!(event.pipeline(), Pipeline::Extractor);
        assert_eq!(event.pipeline().to_string(), "PROCESSOR");
    }

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.emit(ProgressEvent::Skipped {
            filename: "1.webp".to_string(),
        });
        sink.emit(ProgressEvent::Downloaded {
            filename: "2.webp".to_string(),
        });
        drop(sink);

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(event.to_string());
        }
        assert_eq!(names.len(), 2);
        assert!(names[0].contains("1.webp"));
        assert!(names[1].contains("2.webp"));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
