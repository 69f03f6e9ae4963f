//! 图片识别服务 - 业务能力层
//!
//! 把一张本地图片和一条固定指令发给多模态 LLM，返回模型的原始文本
//! 回答。与下载共用固定间隔重试策略，但有独立的预算。

use std::path::Path;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::progress::{Pipeline, ProgressEvent, ProgressSink};
use crate::retry::retry_with_fixed_delay;

/// 图片识别能力（trait 作为编排层的测试接缝）
pub trait ExtractAnswer {
    /// 识别一张图片，返回模型的原始文本回答（调用方负责 trim）
    fn extract(
        &self,
        image_path: &Path,
        instruction: &str,
        sink: &ProgressSink,
    ) -> impl std::future::Future<Output = AppResult<String>>;
}

/// 基于 OpenAI 兼容接口的多模态识别服务
pub struct VisionService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_attempts: usize,
    retry_delay: Duration,
}

impl VisionService {
    /// 创建识别服务
    ///
    /// # 参数
    /// - `api_key`: 已解析好的凭证（来自凭证文件或配置）
    pub fn new(config: &Config, api_key: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            max_attempts: config.extract_max_retries,
            retry_delay: Duration::from_secs(config.extract_retry_delay_secs),
        }
    }

    /// 单次识别尝试：读图 → data URL → vision 请求
    async fn extract_once(&self, image_path: &Path, instruction: &str) -> Result<String, String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| format!("读取图片失败: {}", e))?;
        let data_url = format!(
            "data:{};base64,{}",
            mime_for_path(image_path),
            general_purpose::STANDARD.encode(&bytes)
        );

        // 用户消息 = 指令文本 + 图片两部分
        let content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: instruction.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(|e| format!("构建请求失败: {}", e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .build()
            .map_err(|e| format!("构建请求失败: {}", e))?;

        debug!("调用 Vision API，模型: {}", self.model_name);

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err("LLM 返回了空字符串/纯空白".to_string());
        }

        Ok(content)
    }
}

impl ExtractAnswer for VisionService {
    async fn extract(
        &self,
        image_path: &Path,
        instruction: &str,
        sink: &ProgressSink,
    ) -> AppResult<String> {
        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_path.display().to_string());
        let filename = filename.as_str();
        let max_attempts = self.max_attempts;

        let result =
            retry_with_fixed_delay(max_attempts, self.retry_delay, |attempt| async move {
                match self.extract_once(image_path, instruction).await {
                    Ok(answer) => Ok(answer),
                    Err(message) => {
                        sink.emit(ProgressEvent::AttemptFailed {
                            pipeline: Pipeline::Extractor,
                            name: filename.to_string(),
                            attempt,
                            max_attempts,
                            error: message.clone(),
                        });
                        Err(message)
                    }
                }
            })
            .await;

        result.map_err(|message| classify_failure(filename, message))
    }
}

/// 把最后一次的错误归类为凭证错误或普通识别失败
///
/// OpenAI 兼容服务拒绝密钥时的错误文案不完全统一，按常见关键词判断。
fn classify_failure(filename: &str, message: String) -> AppError {
    let lowered = message.to_lowercase();
    let credential_rejected = lowered.contains("invalid_api_key")
        || lowered.contains("incorrect api key")
        || lowered.contains("api key not valid")
        || lowered.contains("unauthorized")
        || lowered.contains("401");

    if credential_rejected {
        AppError::CredentialInvalid(message)
    } else {
        AppError::InferenceFailure {
            image: filename.to_string(),
            message,
        }
    }
}

/// 按扩展名推断 MIME 类型（data URL 用）
fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
