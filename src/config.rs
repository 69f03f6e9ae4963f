//! 程序配置
//!
//! 所有可调参数集中在 `Config`：默认值 → `config.toml`（可选）→ 环境变量，
//! 后者覆盖前者。凭证文件单独管理（见 `credential` 模块），不放在这里。

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 下载管线 ---
    /// 序列中第一张图片的 URL（为空时尝试浏览器发现）
    pub start_url: Option<String>,
    /// 论坛版块 URL，用于浏览器自动发现起始附件（可选）
    pub forum_url: Option<String>,
    /// 要下载的图片总数
    pub total_files: usize,
    /// XenForo 会话 cookie
    pub xf_user: String,
    pub xf_session: String,
    /// 附件基础 URL
    pub attachment_base_url: String,
    /// 下载目录
    pub download_dir: String,
    /// 本地文件扩展名（策略指定，不从 Content-Type 推断）
    pub file_extension: String,
    /// 请求 User-Agent
    pub user_agent: String,
    /// 单个文件的最大尝试次数
    pub max_retries: usize,
    /// 重试间隔（秒）
    pub retry_delay_secs: u64,
    /// 相邻下载条目之间的限速间隔（毫秒）
    pub item_delay_ms: u64,
    /// 浏览器调试端口（附件发现用）
    pub browser_debug_port: u16,

    // --- 提取管线 ---
    /// 待识别图片所在目录（为空则跳过提取管线）
    pub image_dir: Option<String>,
    /// 凭证文件路径
    pub credential_file: String,
    /// LLM API 密钥（为空时从凭证文件读取）
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 发给模型的固定指令
    pub instruction: String,
    /// 报告文件路径（为空时从图片目录名派生）
    pub report_file: Option<String>,
    /// 识别的最大尝试次数
    pub extract_max_retries: usize,
    /// 识别重试间隔（秒）
    pub extract_retry_delay_secs: u64,
    /// 相邻图片之间的限速间隔（秒）
    pub extract_item_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_url: None,
            forum_url: None,
            total_files: 0,
            xf_user: String::new(),
            xf_session: String::new(),
            attachment_base_url: "https://fuoverflow.com/attachments/".to_string(),
            download_dir: "downloaded_images".to_string(),
            file_extension: "webp".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            max_retries: 4,
            retry_delay_secs: 5,
            item_delay_ms: 500,
            browser_debug_port: 2001,
            image_dir: None,
            credential_file: "config.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.5-flash".to_string(),
            instruction: "Read the attached image. Extract every question you can find and \
                          provide a correct, concise answer for each one."
                .to_string(),
            report_file: None,
            extract_max_retries: 3,
            extract_retry_delay_secs: 5,
            extract_item_delay_secs: 5,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，缺省字段用默认值补齐
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 加载配置：`config.toml`（存在时）叠加环境变量覆盖
    pub fn load() -> Self {
        let base = if Path::new("config.toml").exists() {
            match Self::from_file("config.toml") {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("配置文件无效，使用默认值: {:#}", e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        Self::from_env(base)
    }

    /// 在 `base` 之上应用环境变量覆盖
    pub fn from_env(base: Self) -> Self {
        Self {
            start_url: env_opt("START_URL").or(base.start_url),
            forum_url: env_opt("FORUM_URL").or(base.forum_url),
            total_files: env_parse("TOTAL_FILES").unwrap_or(base.total_files),
            xf_user: env_opt("XF_USER").unwrap_or(base.xf_user),
            xf_session: env_opt("XF_SESSION").unwrap_or(base.xf_session),
            attachment_base_url: env_opt("ATTACHMENT_BASE_URL").unwrap_or(base.attachment_base_url),
            download_dir: env_opt("DOWNLOAD_DIR").unwrap_or(base.download_dir),
            file_extension: env_opt("FILE_EXTENSION").unwrap_or(base.file_extension),
            user_agent: env_opt("USER_AGENT").unwrap_or(base.user_agent),
            max_retries: env_parse("MAX_RETRIES").unwrap_or(base.max_retries),
            retry_delay_secs: env_parse("RETRY_DELAY_SECS").unwrap_or(base.retry_delay_secs),
            item_delay_ms: env_parse("ITEM_DELAY_MS").unwrap_or(base.item_delay_ms),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").unwrap_or(base.browser_debug_port),
            image_dir: env_opt("IMAGE_DIR").or(base.image_dir),
            credential_file: env_opt("CREDENTIAL_FILE").unwrap_or(base.credential_file),
            llm_api_key: env_opt("LLM_API_KEY").unwrap_or(base.llm_api_key),
            llm_api_base_url: env_opt("LLM_API_BASE_URL").unwrap_or(base.llm_api_base_url),
            llm_model_name: env_opt("LLM_MODEL_NAME").unwrap_or(base.llm_model_name),
            instruction: env_opt("INSTRUCTION").unwrap_or(base.instruction),
            report_file: env_opt("REPORT_FILE").or(base.report_file),
            extract_max_retries: env_parse("EXTRACT_MAX_RETRIES").unwrap_or(base.extract_max_retries),
            extract_retry_delay_secs: env_parse("EXTRACT_RETRY_DELAY_SECS")
                .unwrap_or(base.extract_retry_delay_secs),
            extract_item_delay_secs: env_parse("EXTRACT_ITEM_DELAY_SECS")
                .unwrap_or(base.extract_item_delay_secs),
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_forum_policy() {
        let config = Config::default();
        assert_eq!(config.attachment_base_url, "https://fuoverflow.com/attachments/");
        assert_eq!(config.file_extension, "webp");
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.retry_delay_secs, 5);
        assert_eq!(config.item_delay_ms, 500);
    }

    #[test]
    fn test_partial_toml_is_filled_with_defaults() {
        let config: Config =
            toml::from_str("total_files = 12\ndownload_dir = \"imgs\"").unwrap();
        assert_eq!(config.total_files, 12);
        assert_eq!(config.download_dir, "imgs");
        assert_eq!(config.max_retries, Config::default().max_retries);
    }
}
