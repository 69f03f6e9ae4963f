//! URL 模式解析
//!
//! 从一个示例附件 URL 推断出整个附件序列：论坛附件的最后一段路径形如
//! `<文件名>.<数字ID>`，数字 ID 单调递增。解析一次即可生成后续所有
//! URL 和本地文件名。

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, AppResult};

/// 匹配最后一段路径 `<prefix>.<digits>`，允许一个结尾斜杠。
/// prefix 不含 `/`，且至少一个字符。
static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([^/]+)\.(\d+)/?$").expect("内置正则必须合法"));

/// 附件序列描述符
///
/// 由一个示例 URL 解析得到，创建后不可变。
/// 数字 ID 按整数解析，前导零不会保留（论坛附件 ID 不带前导零）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDescriptor {
    prefix: String,
    start_index: u64,
    extension: String,
}

impl SequenceDescriptor {
    /// 从示例 URL 解析出序列描述符
    ///
    /// 只做语法检查；prefix 是否对应真实资源要到下载时才知道。
    ///
    /// # 参数
    /// - `example_url`: 序列中第一张图片的 URL
    /// - `extension`: 本地文件扩展名（由策略指定，不从服务器推断）
    pub fn resolve(example_url: &str, extension: &str) -> AppResult<Self> {
        let captures =
            SEGMENT_PATTERN
                .captures(example_url)
                .ok_or_else(|| AppError::PatternNotMatched {
                    url: example_url.to_string(),
                })?;

        let prefix = captures[1].to_string();
        let start_index: u64 =
            captures[2]
                .parse()
                .map_err(|_| AppError::PatternNotMatched {
                    url: example_url.to_string(),
                })?;

        Ok(Self {
            prefix,
            start_index,
            extension: extension.to_string(),
        })
    }

    /// 解析出的文件名前缀
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 序列起始 ID
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// 序列中第 `offset` 项的附件 URL
    ///
    /// 格式：`<base><prefix>.<start_index + offset>/`
    pub fn url_at(&self, base: &str, offset: u64) -> String {
        format!("{}{}.{}/", base, self.prefix, self.start_index + offset)
    }

    /// 序列中第 `offset` 项的本地文件名
    ///
    /// 格式：`<prefix>.<start_index + offset>.<extension>`
    pub fn filename_at(&self, offset: u64) -> String {
        format!(
            "{}.{}.{}",
            self.prefix,
            self.start_index + offset,
            self.extension
        )
    }
}
