//! API 凭证存取
//!
//! 凭证是一个单行文本文件。显式注入路径，不用全局状态；LLM 服务拒绝
//! 凭证时调用 `invalidate` 删掉文件，下一次运行就会重新要求提供。

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::AppResult;

/// 凭证存储
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 读取已保存的凭证；文件不存在或为空时返回 `None`
    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let key = content.trim().to_string();
                if key.is_empty() {
                    None
                } else {
                    debug!("从 {} 读取到已保存的凭证", self.path.display());
                    Some(key)
                }
            }
            Err(_) => None,
        }
    }

    /// 保存凭证供下次运行使用
    pub fn save(&self, credential: &str) -> AppResult<()> {
        std::fs::write(&self.path, credential)?;
        debug!("凭证已保存到 {}", self.path.display());
        Ok(())
    }

    /// 作废已保存的凭证（删除文件）
    ///
    /// 文件本就不存在时静默成功。
    pub fn invalidate(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => warn!("已删除无效凭证文件: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("删除凭证文件失败 ({}): {}", self.path.display(), e),
        }
    }
}
