//! 下载批次编排 - 编排层
//!
//! 驱动严格顺序的下载循环：逐项计算 URL 和本地文件名，已存在的直接
//! 跳过（幂等续传，不发任何网络请求），其余交给下载服务重试，结果
//! 汇总到 `BatchResult`。顺序循环是有意的限速手段，不做并发扇出。

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::progress::{CancelToken, Pipeline, ProgressEvent, ProgressSink};
use crate::services::Fetch;
use crate::url_pattern::SequenceDescriptor;

/// 一次下载批次的汇总结果
///
/// 运行期间由编排层独占持有，循环结束后原样返回。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: usize,
    pub skipped: usize,
    /// 重试耗尽的 URL，按遇到的顺序
    pub failed_urls: Vec<String>,
}

/// 下载批次编排器
pub struct DownloadBatch<'a, F: Fetch> {
    fetcher: &'a F,
    sink: &'a ProgressSink,
    cancel: CancelToken,
    attachment_base_url: String,
    download_dir: PathBuf,
    max_attempts: usize,
    retry_delay: Duration,
    item_delay: Duration,
}

impl<'a, F: Fetch> DownloadBatch<'a, F> {
    pub fn new(
        config: &Config,
        fetcher: &'a F,
        sink: &'a ProgressSink,
        cancel: CancelToken,
    ) -> Self {
        Self {
            fetcher,
            sink,
            cancel,
            attachment_base_url: config.attachment_base_url.clone(),
            download_dir: PathBuf::from(&config.download_dir),
            max_attempts: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            item_delay: Duration::from_millis(config.item_delay_ms),
        }
    }

    /// 执行批次
    ///
    /// 单项失败不会中断批次；只有前置校验会提前返回错误。
    pub async fn run(
        &self,
        descriptor: &SequenceDescriptor,
        total_count: usize,
    ) -> AppResult<BatchResult> {
        if total_count == 0 {
            return Err(AppError::InvalidInput(
                "要下载的图片总数必须大于 0".to_string(),
            ));
        }
        std::fs::create_dir_all(&self.download_dir)?;

        self.sink.emit(ProgressEvent::PatternResolved {
            prefix: descriptor.prefix().to_string(),
            start_index: descriptor.start_index(),
        });
        info!(
            "开始批量下载: 前缀 {}，起始 ID {}，共 {} 个",
            descriptor.prefix(),
            descriptor.start_index(),
            total_count
        );

        let mut result = BatchResult::default();

        for i in 0..total_count as u64 {
            if self.cancel.is_cancelled() {
                warn!("收到取消请求，批次在条目之间停止");
                self.sink.emit(ProgressEvent::Cancelled {
                    pipeline: Pipeline::Downloader,
                });
                break;
            }

            let filename = descriptor.filename_at(i);
            let filepath = self.download_dir.join(&filename);

            // 整文件存在即视为完成，不发任何网络请求
            if filepath.exists() {
                self.sink.emit(ProgressEvent::Skipped {
                    filename: filename.clone(),
                });
                result.skipped += 1;
                continue;
            }

            let url = descriptor.url_at(&self.attachment_base_url, i);
            self.sink.emit(ProgressEvent::DownloadStarted {
                filename: filename.clone(),
                url: url.clone(),
            });

            match self
                .fetcher
                .fetch(&url, &filepath, self.max_attempts, self.retry_delay, self.sink)
                .await
            {
                Ok(()) => result.successful += 1,
                Err(_) => result.failed_urls.push(url),
            }

            // 无论成败，都在实际发起过请求的条目之后限速
            sleep(self.item_delay).await;
        }

        self.sink.emit(ProgressEvent::DownloadSummary {
            successful: result.successful,
            skipped: result.skipped,
            failed: result.failed_urls.len(),
            total: total_count,
        });

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 记录调用并可选地失败的下载器
    struct MockFetcher {
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
        always_fail: bool,
    }

    impl MockFetcher {
        fn new(always_fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
                always_fail,
            }
        }
    }

    impl Fetch for MockFetcher {
        async fn fetch(
            &self,
            url: &str,
            dest: &Path,
            _max_attempts: usize,
            _delay: Duration,
            _sink: &ProgressSink,
        ) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            if self.always_fail {
                Err(AppError::network_failure(
                    url,
                    std::io::Error::new(std::io::ErrorKind::Other, "模拟失败"),
                ))
            } else {
                std::fs::write(dest, b"webp-bytes")?;
                Ok(())
            }
        }
    }

    fn test_config(dir_name: &str) -> Config {
        let dir = std::env::temp_dir().join(format!(
            "dlqa_batch_{}_{}",
            std::process::id(),
            dir_name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        Config {
            download_dir: dir.to_string_lossy().into_owned(),
            item_delay_ms: 0,
            retry_delay_secs: 0,
            ..Config::default()
        }
    }

    fn descriptor() -> SequenceDescriptor {
        SequenceDescriptor::resolve("https://x/attachments/foo_bar.199272/", "webp").unwrap()
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let config = test_config("idempotent");
        let fetcher = MockFetcher::new(false);
        let (sink, _rx) = ProgressSink::channel();
        let batch = DownloadBatch::new(&config, &fetcher, &sink, CancelToken::new());

        let first = batch.run(&descriptor(), 3).await.unwrap();
        assert_eq!(first.successful, 3);
        assert_eq!(first.skipped, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

        // 第二次运行：全部跳过，零网络调用
        let second = batch.run(&descriptor(), 3).await.unwrap();
        assert_eq!(second.skipped, 3);
        assert_eq!(second.successful, 0);
        assert!(second.failed_urls.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

        let _ = std::fs::remove_dir_all(&config.download_dir);
    }

    #[tokio::test]
    async fn test_urls_are_consecutive_and_failures_ordered() {
        let config = test_config("failures");
        let fetcher = MockFetcher::new(true);
        let (sink, _rx) = ProgressSink::channel();
        let batch = DownloadBatch::new(&config, &fetcher, &sink, CancelToken::new());

        let result = batch.run(&descriptor(), 3).await.unwrap();
        assert_eq!(result.successful, 0);
        assert_eq!(result.skipped, 0);
        assert_eq!(
            result.failed_urls,
            vec![
                "https://fuoverflow.com/attachments/foo_bar.199272/",
                "https://fuoverflow.com/attachments/foo_bar.199273/",
                "https://fuoverflow.com/attachments/foo_bar.199274/",
            ]
        );

        let _ = std::fs::remove_dir_all(&config.download_dir);
    }

    #[tokio::test]
    async fn test_zero_total_is_invalid_input() {
        let config = test_config("zero");
        let fetcher = MockFetcher::new(false);
        let (sink, _rx) = ProgressSink::channel();
        let batch = DownloadBatch::new(&config, &fetcher, &sink, CancelToken::new());

        let result = batch.run(&descriptor(), 0).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_batch_does_no_work() {
        let config = test_config("cancel");
        let fetcher = MockFetcher::new(false);
        let (sink, _rx) = ProgressSink::channel();
        let cancel = CancelToken::new();
        cancel.cancel();
        let batch = DownloadBatch::new(&config, &fetcher, &sink, cancel);

        let result = batch.run(&descriptor(), 3).await.unwrap();
        assert_eq!(result, BatchResult::default());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

        let _ = std::fs::remove_dir_all(&config.download_dir);
    }
}
