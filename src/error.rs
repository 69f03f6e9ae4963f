//! 应用程序错误类型
//!
//! 错误分为两类：
//! - 致命错误：在任何网络活动开始之前就终止运行（`PatternNotMatched`、`InvalidInput`）
//! - 单项错误：只影响批次中的单个条目，记录后继续（`NetworkFailure`、`InferenceFailure`）

use thiserror::Error;

/// 应用程序错误
#[derive(Debug, Error)]
pub enum AppError {
    /// 示例 URL 无法解析出附件序列模式（致命，发生在任何下载之前）
    #[error("无法解析 URL 模式: {url}（应形如 '.../some-filename.123456/'）")]
    PatternNotMatched { url: String },

    /// 下载失败（重试耗尽后记录为批次级失败，不会中断批次）
    #[error("下载失败 ({url}): {source}")]
    NetworkFailure {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 图片识别失败（重试耗尽后写入报告错误行，不会中断批次）
    #[error("图片识别失败 ({image}): {message}")]
    InferenceFailure { image: String, message: String },

    /// 输入无效（致命，在任何工作开始之前报告）
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// LLM 服务拒绝了 API 凭证（本地保存的凭证应当作废）
    #[error("API 凭证无效: {0}")]
    CredentialInvalid(String),

    /// 文件操作错误
    #[error("文件操作失败: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// 创建网络失败错误
    pub fn network_failure(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::NetworkFailure {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// 该错误是否会终止整个运行
    ///
    /// 单项错误（下载失败、识别失败）只记录不终止。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::PatternNotMatched { .. } | AppError::InvalidInput(_)
        )
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
