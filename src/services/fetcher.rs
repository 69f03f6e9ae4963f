//! 附件下载服务 - 业务能力层
//!
//! 只负责"把一个 URL 下载到一个路径"的能力，带固定间隔重试：
//! - 不做存在性检查（跳过是编排层的职责，这里保持可复用）
//! - 响应体按块流式写盘；中途失败时残留的半截文件不清理
//!   （与历史行为一致；半截文件会被下次运行当作已完成而跳过，属于已知缺陷）

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::COOKIE;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::progress::{Pipeline, ProgressEvent, ProgressSink};
use crate::retry::retry_with_fixed_delay;

/// XenForo 会话 cookie 对
#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub xf_user: String,
    pub xf_session: String,
}

impl SessionCookies {
    /// 组装成 `Cookie` 请求头的值
    pub fn header_value(&self) -> String {
        format!("xf_user={}; xf_session={}", self.xf_user, self.xf_session)
    }
}

/// 下载能力（trait 作为编排层的测试接缝）
pub trait Fetch {
    /// 下载 `url` 到 `dest`
    ///
    /// 共尝试 `max_attempts` 次，间隔固定 `delay`；每次失败发一个进度
    /// 事件。全部失败返回 `NetworkFailure`，携带最后一次的错误。
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        max_attempts: usize,
        delay: Duration,
        sink: &ProgressSink,
    ) -> impl std::future::Future<Output = AppResult<()>>;
}

/// 基于 reqwest 的附件下载器
pub struct AttachmentFetcher {
    client: reqwest::Client,
    cookie_header: String,
}

impl AttachmentFetcher {
    /// 创建下载器
    ///
    /// 固定 User-Agent 和 30 秒超时；cookie 随每个请求发送。
    pub fn new(config: &Config, cookies: &SessionCookies) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::InvalidInput(format!("构建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            cookie_header: cookies.header_value(),
        })
    }

    /// 单次下载尝试：GET → 按块流式写盘
    async fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .get(url)
            .header(COOKIE, &self.cookie_header)
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        debug!("已写入 {}", dest.display());
        Ok(())
    }
}

impl Fetch for AttachmentFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        max_attempts: usize,
        delay: Duration,
        sink: &ProgressSink,
    ) -> AppResult<()> {
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string());
        let filename = filename.as_str();

        let result = retry_with_fixed_delay(max_attempts, delay, |attempt| async move {
            match self.fetch_once(url, dest).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    sink.emit(ProgressEvent::AttemptFailed {
                        pipeline: Pipeline::Downloader,
                        name: filename.to_string(),
                        attempt,
                        max_attempts,
                        error: e.to_string(),
                    });
                    Err(e)
                }
            }
        })
        .await;

        match result {
            Ok(()) => {
                sink.emit(ProgressEvent::Downloaded {
                    filename: filename.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                sink.emit(ProgressEvent::DownloadFailed {
                    filename: filename.to_string(),
                    max_attempts,
                });
                Err(AppError::NetworkFailure {
                    url: url.to_string(),
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_value() {
        let cookies = SessionCookies {
            xf_user: "12345,abc".to_string(),
            xf_session: "deadbeef".to_string(),
        };
        assert_eq!(
            cookies.header_value(),
            "xf_user=12345,abc; xf_session=deadbeef"
        );
    }
}
