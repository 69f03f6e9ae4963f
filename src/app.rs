//! 应用接线
//!
//! 把配置、进度通道和两条管线装配起来。两条管线相互独立：配置了
//! 起始 URL（或论坛 URL）就跑下载，配置了图片目录就跑提取，顺序
//! 执行，各自用各自的目录和文件，互不干扰。
//!
//! 错误传播策略：前置校验失败和 URL 模式解析失败是致命的，在任何
//! 工作开始之前报告一次并终止；批次内的单项失败只记录和汇总。

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::credential::CredentialStore;
use crate::error::AppError;
use crate::orchestrator::{DownloadBatch, ExtractBatch};
use crate::progress::{CancelToken, ProgressSink};
use crate::services::report_writer::derive_report_name;
use crate::services::{AttachmentFetcher, ReportWriter, SessionCookies, VisionService};
use crate::url_pattern::SequenceDescriptor;

/// 应用主结构
pub struct App {
    config: Config,
    cancel: CancelToken,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// 取消令牌（给信号处理或 UI 用；批次在条目之间检查它）
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let sink = ProgressSink::tracing();

        let ran_download = self.run_download_pipeline(&sink).await?;
        let ran_extract = self.run_extract_pipeline(&sink).await?;

        if !ran_download && !ran_extract {
            warn!("⚠️ 没有配置任何管线，程序结束");
            warn!("   下载: 设置 START_URL（或 FORUM_URL）+ TOTAL_FILES + XF_USER + XF_SESSION");
            warn!("   提取: 设置 IMAGE_DIR（凭证来自 LLM_API_KEY 或凭证文件）");
            return Ok(());
        }

        info!(
            "全部处理完成: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        Ok(())
    }

    /// 下载管线：解析模式 → 顺序批量下载
    async fn run_download_pipeline(&self, sink: &ProgressSink) -> Result<bool> {
        let start_url = match (&self.config.start_url, &self.config.forum_url) {
            (Some(url), _) => url.clone(),
            (None, Some(forum_url)) => {
                let (url, title) = browser::discover_start_url(
                    self.config.browser_debug_port,
                    forum_url,
                )
                .await?;
                info!("从论坛页面发现起始附件: {} （{}）", url, title);
                url
            }
            (None, None) => return Ok(false),
        };

        // 前置校验：在任何网络活动之前失败
        if self.config.total_files == 0 {
            return Err(AppError::InvalidInput(
                "TOTAL_FILES 必须是大于 0 的数字".to_string(),
            )
            .into());
        }
        if self.config.xf_user.is_empty() || self.config.xf_session.is_empty() {
            return Err(AppError::InvalidInput(
                "下载需要 XF_USER 和 XF_SESSION 两个会话 cookie".to_string(),
            )
            .into());
        }

        // 模式解析失败同样是致命的
        let descriptor = SequenceDescriptor::resolve(&start_url, &self.config.file_extension)?;

        let cookies = SessionCookies {
            xf_user: self.config.xf_user.clone(),
            xf_session: self.config.xf_session.clone(),
        };
        let fetcher = AttachmentFetcher::new(&self.config, &cookies)?;
        let batch = DownloadBatch::new(&self.config, &fetcher, sink, self.cancel.clone());
        let result = batch.run(&descriptor, self.config.total_files).await?;

        info!("{}", "=".repeat(60));
        info!(
            "📊 下载完成: ✅ {} 成功 | ⏭ {} 跳过 | ❌ {} 失败 / 共 {}",
            result.successful,
            result.skipped,
            result.failed_urls.len(),
            self.config.total_files
        );
        if !result.failed_urls.is_empty() {
            warn!("以下 URL 重试耗尽后仍然失败:");
            for url in &result.failed_urls {
                warn!("  {}", url);
            }
        }
        info!("{}", "=".repeat(60));

        Ok(true)
    }

    /// 提取管线：遍历图片目录 → 识别 → 追加报告
    async fn run_extract_pipeline(&self, sink: &ProgressSink) -> Result<bool> {
        let Some(image_dir) = &self.config.image_dir else {
            return Ok(false);
        };
        let image_dir = PathBuf::from(image_dir);

        let store = CredentialStore::new(&self.config.credential_file);
        let api_key = if !self.config.llm_api_key.is_empty() {
            // 显式提供的密钥持久化，下次运行不用再给
            store.save(&self.config.llm_api_key)?;
            self.config.llm_api_key.clone()
        } else if let Some(key) = store.load() {
            key
        } else {
            return Err(AppError::InvalidInput(format!(
                "缺少 LLM API 凭证: 设置 LLM_API_KEY 或写入凭证文件 {}",
                self.config.credential_file
            ))
            .into());
        };

        let vision = VisionService::new(&self.config, &api_key);
        let report_path = match &self.config.report_file {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(derive_report_name(&image_dir)),
        };
        let writer = ReportWriter::new(report_path);

        let batch = ExtractBatch::new(
            &self.config,
            &vision,
            &writer,
            sink,
            self.cancel.clone(),
            Some(&store),
        );
        let stats = batch.run(&image_dir).await?;

        info!("{}", "=".repeat(60));
        info!(
            "📊 提取完成: ✅ {} 成功 | ❌ {} 失败，报告: {}",
            stats.extracted,
            stats.failed,
            writer.path().display()
        );
        info!("{}", "=".repeat(60));

        Ok(true)
    }
}
