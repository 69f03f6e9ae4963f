use anyhow::Result;
use download_image_qa::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置（config.toml + 环境变量覆盖）
    let config = Config::load();

    let app = App::initialize(config)?;

    // Ctrl-C 走协作式取消：当前条目做完后在条目之间停下
    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到 Ctrl-C，将在当前条目完成后停止");
            cancel.cancel();
        }
    });

    app.run().await?;

    Ok(())
}
