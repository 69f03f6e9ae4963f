//! 报告写入服务 - 业务能力层
//!
//! 只负责"往报告文件追加一个条目"的能力。文件始终以追加模式打开，
//! 从不截断，多次运行的结果会累积在同一个文件里。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::AppResult;

/// 默认报告文件名（图片目录名不可用时的回退）
pub const DEFAULT_REPORT_FILE: &str = "all_questions_and_answers.txt";

/// 一个条目的正文：模型回答或错误说明
#[derive(Debug, Clone)]
pub enum ReportBody {
    /// 模型回答（已去除首尾空白）
    Answer(String),
    /// 错误说明
    Error(String),
}

/// 报告写入器
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 报告文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一个分隔好的报告条目
    ///
    /// 格式（与历史输出逐字一致）：
    /// ```text
    /// --- Question Source: <文件名> ---
    /// <正文>
    ///
    /// <80 个等号>
    ///
    /// ```
    pub fn append_entry(&self, source_filename: &str, body: &ReportBody) -> AppResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let body_line = match body {
            ReportBody::Answer(answer) => answer.trim().to_string(),
            ReportBody::Error(message) => format!("An error occurred: {}", message),
        };

        let entry = format!(
            "--- Question Source: {} ---\n{}\n\n{}\n\n",
            source_filename,
            body_line,
            "=".repeat(80)
        );
        file.write_all(entry.as_bytes())?;

        debug!("报告条目已追加: {}", source_filename);
        Ok(())
    }
}

/// 从图片目录名派生报告文件名
///
/// 目录基础名中不能出现在文件名里的字符替换为下划线；取不到基础名时
/// 回退到固定文件名。
pub fn derive_report_name(image_dir: &Path) -> String {
    match image_dir.file_name() {
        Some(name) => format!("{}_questions_and_answers.txt", sanitize(&name.to_string_lossy())),
        None => DEFAULT_REPORT_FILE.to_string(),
    }
}

/// 替换文件名中的非法字符为下划线
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
