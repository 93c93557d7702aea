/// 商品实时推送 - Watcher
///
/// 订阅一组商品的实时推送，并把领域事件输出到日志

use tracing::{debug, info, warn};

use watcher::{Callbacks, Config, ConnectionManager, DomainEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = Config::from_env()?;

    // 初始化日志
    // 优先使用环境变量 RUST_LOG，例如：
    // RUST_LOG=watcher=debug cargo run
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level))
        )
        .init();

    info!("🚀 启动商品实时推送 Watcher...");
    info!("✅ 配置加载成功: base_url={}", cfg.manager.base_url);

    if cfg.entity_ids.is_empty() {
        warn!("WATCH_ENTITY_IDS 为空，没有需要订阅的商品");
    }

    let manager = ConnectionManager::new(cfg.manager.clone());

    // 输出领域事件
    let mut subscription = manager.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            debug!("领域事件: kind={}, entity={}", event.kind().name(), event.entity_id());
            match event {
                DomainEvent::StockUpdate(update) => {
                    info!(
                        "📦 库存变更: entity={}, stock={}, available={}, level={:?}",
                        update.entity_id,
                        update.stock,
                        update.available_stock,
                        update.level()
                    );
                }
                DomainEvent::EntityUpdate(update) => {
                    info!(
                        "📝 商品更新: entity={}, update_type={}, data={}",
                        update.entity_id, update.update_type, update.data
                    );
                }
                DomainEvent::StatusChanged { entity_id, status } => {
                    info!("🔌 连接状态: entity={}, status={}", entity_id, status);
                }
            }
        }
    });

    for entity_id in &cfg.entity_ids {
        info!("🎯 订阅商品: {}", entity_id);
        manager.connect(entity_id.clone(), Callbacks::new());
    }

    // 进程退出时断开全部连接
    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，断开所有连接...");
    manager.shutdown().await?;

    for remaining in manager.snapshot().await? {
        warn!("仍有未断开的连接: {}", remaining.entity_id);
    }

    drop(manager);
    printer.await?;
    info!("👋 Watcher 已退出");

    Ok(())
}
