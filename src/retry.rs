//! 固定间隔重试组合子
//!
//! 下载和图片识别共用同一套重试策略：固定间隔、有限次数、不做指数退避。
//! 把策略收拢到一个组合子里，两边只需传各自的预算。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// 以固定间隔重试一个异步操作
///
/// 共尝试 `max_attempts` 次，每次失败后等待 `delay` 再重试
/// （最后一次失败后不再等待，所以恰好 `max_attempts - 1` 次等待）。
/// 第一次成功立即返回；全部失败时返回最后一次的错误。
///
/// # 参数
/// - `op`: 接受 1 起始的尝试序号，便于调用方在每次尝试里输出进度
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    max_attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    assert!(max_attempts >= 1, "重试次数至少为 1");

    let mut last_error = None;
    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = Some(e);
                if attempt < max_attempts {
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.expect("循环至少执行一次"))
}
