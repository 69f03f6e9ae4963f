//! 提取批次编排 - 编排层
//!
//! 按字典序遍历图片目录，逐张交给识别服务，每张图片恰好追加一个
//! 报告条目（成功是回答正文，失败是错误行）。单项失败不中断批次；
//! 凭证被拒时额外作废本地凭证文件，让下次运行重新要求提供。

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::credential::CredentialStore;
use crate::error::{AppError, AppResult};
use crate::progress::{CancelToken, Pipeline, ProgressEvent, ProgressSink};
use crate::services::report_writer::{ReportBody, ReportWriter};
use crate::services::ExtractAnswer;

/// 可识别的图片扩展名（其余文件静默跳过）
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// 一次提取批次的汇总结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStats {
    pub extracted: usize,
    pub failed: usize,
}

/// 提取批次编排器
pub struct ExtractBatch<'a, E: ExtractAnswer> {
    extractor: &'a E,
    writer: &'a ReportWriter,
    sink: &'a ProgressSink,
    cancel: CancelToken,
    /// 凭证被拒时作废用；无凭证文件的场合可以不传
    credentials: Option<&'a CredentialStore>,
    instruction: String,
    item_delay: Duration,
}

impl<'a, E: ExtractAnswer> ExtractBatch<'a, E> {
    pub fn new(
        config: &Config,
        extractor: &'a E,
        writer: &'a ReportWriter,
        sink: &'a ProgressSink,
        cancel: CancelToken,
        credentials: Option<&'a CredentialStore>,
    ) -> Self {
        Self {
            extractor,
            writer,
            sink,
            cancel,
            credentials,
            instruction: config.instruction.clone(),
            item_delay: Duration::from_secs(config.extract_item_delay_secs),
        }
    }

    /// 执行批次
    pub async fn run(&self, image_dir: &Path) -> AppResult<ExtractStats> {
        if !image_dir.is_dir() {
            return Err(AppError::InvalidInput(format!(
                "图片目录不存在或不是目录: {}",
                image_dir.display()
            )));
        }

        let filenames = list_image_filenames(image_dir)?;
        info!(
            "开始识别: 目录 {}，共 {} 张图片，报告 {}",
            image_dir.display(),
            filenames.len(),
            self.writer.path().display()
        );

        let mut stats = ExtractStats::default();

        for filename in &filenames {
            if self.cancel.is_cancelled() {
                warn!("收到取消请求，批次在条目之间停止");
                self.sink.emit(ProgressEvent::Cancelled {
                    pipeline: Pipeline::Extractor,
                });
                break;
            }

            self.sink.emit(ProgressEvent::ExtractStarted {
                filename: filename.clone(),
            });
            let image_path = image_dir.join(filename);

            match self
                .extractor
                .extract(&image_path, &self.instruction, self.sink)
                .await
            {
                Ok(answer) => {
                    self.writer
                        .append_entry(filename, &ReportBody::Answer(answer))?;
                    self.sink.emit(ProgressEvent::Extracted {
                        filename: filename.clone(),
                    });
                    stats.extracted += 1;
                }
                Err(error) => {
                    if matches!(error, AppError::CredentialInvalid(_)) {
                        if let Some(store) = self.credentials {
                            store.invalidate();
                        }
                    }
                    let message =
                        format!("An error occurred while processing {}: {}", filename, error);
                    self.writer
                        .append_entry(filename, &ReportBody::Error(message.clone()))?;
                    self.sink.emit(ProgressEvent::ExtractFailed {
                        filename: filename.clone(),
                        error: message,
                    });
                    stats.failed += 1;
                }
            }

            sleep(self.item_delay).await;
        }

        self.sink.emit(ProgressEvent::ExtractSummary {
            extracted: stats.extracted,
            failed: stats.failed,
            report_path: self.writer.path().display().to_string(),
        });

        Ok(stats)
    }
}

/// 列出目录里的图片文件名，按字典序排序（保证报告输出稳定）
fn list_image_filenames(image_dir: &Path) -> AppResult<Vec<String>> {
    let mut filenames: Vec<String> = std::fs::read_dir(image_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| has_image_extension(name))
        .collect();
    filenames.sort();
    Ok(filenames)
}

fn has_image_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|ext| {
            let lowered = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&lowered.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按文件名返回固定回答或失败的识别器
    struct MockExtractor {
        calls: AtomicUsize,
        fail_on: Option<String>,
        credential_rejected: bool,
    }

    impl MockExtractor {
        fn answering() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
                credential_rejected: false,
            }
        }
    }

    impl ExtractAnswer for MockExtractor {
        async fn extract(
            &self,
            image_path: &Path,
            _instruction: &str,
            _sink: &ProgressSink,
        ) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let filename = image_path.file_name().unwrap().to_string_lossy().into_owned();
            if self.credential_rejected {
                return Err(AppError::CredentialInvalid("401".to_string()));
            }
            if self.fail_on.as_deref() == Some(filename.as_str()) {
                return Err(AppError::InferenceFailure {
                    image: filename,
                    message: "模拟失败".to_string(),
                });
            }
            Ok(format!("answer for {}\n", filename))
        }
    }

    struct TestDirs {
        image_dir: PathBuf,
        report_path: PathBuf,
    }

    fn setup(name: &str, files: &[&str]) -> TestDirs {
        let image_dir =
            std::env::temp_dir().join(format!("dlqa_extract_{}_{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&image_dir);
        std::fs::create_dir_all(&image_dir).unwrap();
        for file in files {
            std::fs::write(image_dir.join(file), b"img").unwrap();
        }
        let report_path = image_dir.join("report.txt");
        TestDirs {
            image_dir,
            report_path,
        }
    }

    fn test_config() -> Config {
        Config {
            extract_item_delay_secs: 0,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_lexicographic_order_and_allow_list() {
        let dirs = setup("order", &["b.webp", "a.PNG", "notes.txt", "c.jpeg", "x.gif"]);
        let config = test_config();
        let extractor = MockExtractor::answering();
        let writer = ReportWriter::new(&dirs.report_path);
        let (sink, _rx) = ProgressSink::channel();
        let batch = ExtractBatch::new(&config, &extractor, &writer, &sink, CancelToken::new(), None);

        let stats = batch.run(&dirs.image_dir).await.unwrap();
        // .txt 和 .gif 被静默跳过
        assert_eq!(stats, ExtractStats { extracted: 3, failed: 0 });

        let content = std::fs::read_to_string(&dirs.report_path).unwrap();
        let pos_a = content.find("Question Source: a.PNG").unwrap();
        let pos_b = content.find("Question Source: b.webp").unwrap();
        let pos_c = content.find("Question Source: c.jpeg").unwrap();
        assert!(pos_a < pos_b && pos_b < pos_c);
        assert!(!content.contains("notes.txt"));

        let _ = std::fs::remove_dir_all(&dirs.image_dir);
    }

    #[tokio::test]
    async fn test_failure_writes_error_entry_and_continues() {
        let dirs = setup("failure", &["a.webp", "b.webp"]);
        let config = test_config();
        let extractor = MockExtractor {
            fail_on: Some("a.webp".to_string()),
            ..MockExtractor::answering()
        };
        let writer = ReportWriter::new(&dirs.report_path);
        let (sink, _rx) = ProgressSink::channel();
        let batch = ExtractBatch::new(&config, &extractor, &writer, &sink, CancelToken::new(), None);

        let stats = batch.run(&dirs.image_dir).await.unwrap();
        assert_eq!(stats, ExtractStats { extracted: 1, failed: 1 });

        let content = std::fs::read_to_string(&dirs.report_path).unwrap();
        assert!(content.contains("An error occurred while processing a.webp"));
        assert!(content.contains("answer for b.webp"));

        let _ = std::fs::remove_dir_all(&dirs.image_dir);
    }

    #[tokio::test]
    async fn test_two_runs_append_two_full_sets() {
        let dirs = setup("accumulate", &["a.webp"]);
        let config = test_config();
        let extractor = MockExtractor::answering();
        let writer = ReportWriter::new(&dirs.report_path);
        let (sink, _rx) = ProgressSink::channel();
        let batch = ExtractBatch::new(&config, &extractor, &writer, &sink, CancelToken::new(), None);

        batch.run(&dirs.image_dir).await.unwrap();
        batch.run(&dirs.image_dir).await.unwrap();

        let content = std::fs::read_to_string(&dirs.report_path).unwrap();
        assert_eq!(content.matches("--- Question Source: a.webp ---").count(), 2);

        let _ = std::fs::remove_dir_all(&dirs.image_dir);
    }

    #[tokio::test]
    async fn test_missing_directory_is_invalid_input() {
        let config = test_config();
        let extractor = MockExtractor::answering();
        let writer = ReportWriter::new("unused_report.txt");
        let (sink, _rx) = ProgressSink::channel();
        let batch = ExtractBatch::new(&config, &extractor, &writer, &sink, CancelToken::new(), None);

        let result = batch.run(Path::new("/nonexistent/dlqa_dir")).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_credential_invalidates_store() {
        let dirs = setup("credential", &["a.webp"]);
        let config = test_config();
        let extractor = MockExtractor {
            credential_rejected: true,
            ..MockExtractor::answering()
        };
        let writer = ReportWriter::new(&dirs.report_path);
        let (sink, _rx) = ProgressSink::channel();

        let credential_path = dirs.image_dir.join("config.txt");
        let store = CredentialStore::new(&credential_path);
        store.save("bad-key").unwrap();

        let batch = ExtractBatch::new(
            &config,
            &extractor,
            &writer,
            &sink,
            CancelToken::new(),
            Some(&store),
        );
        let stats = batch.run(&dirs.image_dir).await.unwrap();

        assert_eq!(stats.failed, 1);
        // 凭证文件被作废
        assert!(store.load().is_none());

        let _ = std::fs::remove_dir_all(&dirs.image_dir);
    }
}
