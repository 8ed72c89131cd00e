use clap::{Arg, Command};
use rand::Rng;
use rustmargin::core::config::EngineConfig;
use rustmargin::core::notify::LogAlertSink;
use rustmargin::core::types::PositionSide;
use rustmargin::engine::positions::{close_reason, OpenPositionRequest};
use rustmargin::engine::service::MarginService;
use rustmargin::utils::logging::init_logging;
use rustmargin::venues::paper::PaperVenue;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let matches = Command::new("RustMargin")
        .version("0.1")
        .about("逐仓杠杆保证金交易引擎 (纸面交易所干跑模式)")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径 (默认使用内置配置)"),
        )
        .arg(
            Arg::new("symbol")
                .short('s')
                .long("symbol")
                .value_name("SYMBOL")
                .default_value("BTCUSDC")
                .help("交易对"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .default_value("INFO")
                .help("日志级别: TRACE/DEBUG/INFO/WARN/ERROR"),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").expect("有默认值");
    init_logging(log_level, "logs")?;

    let config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let symbol = matches.get_one::<String>("symbol").expect("有默认值").clone();

    log::info!("启动保证金交易引擎, 交易对: {}", symbol);

    // 纸面交易所干跑: 种子行情 + 随机游走
    let mut price = 100.0;
    let venue = Arc::new(PaperVenue::new());
    venue.set_quote(&symbol, price);

    let service = Arc::new(MarginService::new(
        venue.clone(),
        config,
        Arc::new(LogAlertSink),
    ));
    service.start().await;

    let equity = 10_000.0;
    let sized = service
        .calculate_position_size(&symbol, PositionSide::Long, equity, price * 0.98)
        .await?;
    log::info!("仓位试算:\n{}", serde_json::to_string_pretty(&sized)?);

    let position = service
        .open_position(OpenPositionRequest {
            symbol: symbol.clone(),
            side: PositionSide::Long,
            equity,
            stop_price: price * 0.98,
            take_profit_price: Some(price * 1.05),
            collateral_asset: "USDC".to_string(),
            risk_fraction: None,
            leverage: None,
            lot: None,
        })
        .await?;

    // 随机游走行情直到 Ctrl+C，期间监控任务按配置间隔巡检
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("收到退出信号");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                let drift: f64 = rand::thread_rng().gen_range(-0.5..0.5);
                price = (price + drift).max(0.01);
                venue.set_quote(&symbol, price);

                let pnl = position.unrealized_pnl(price);
                log::info!("{} 最新价 {:.2}, 持仓浮动盈亏 {:.2}", symbol, price, pnl);

                // 触及止损/止盈时通过常规平仓通道退出
                let hit_stop = price <= position.stop_price;
                let hit_tp = position.take_profit_price.map(|tp| price >= tp).unwrap_or(false);
                if hit_stop || hit_tp {
                    let reason = if hit_stop { close_reason::STOP_LOSS } else { close_reason::TAKE_PROFIT };
                    match service.close_position(&position.id, None, reason).await {
                        Ok(closed) => log::info!(
                            "持仓 {} 已平仓 (原因: {}, 已实现盈亏 {:.2})",
                            closed.id, reason, closed.realized_pnl
                        ),
                        Err(e) => log::error!("平仓失败: {}", e),
                    }
                    break;
                }
            }
        }
    }

    // 退出前清理未平仓持仓
    if let Some(open) = service.get_position(&position.id).await {
        if !open.is_closed() {
            if let Err(e) = service
                .close_position(&position.id, None, close_reason::MANUAL)
                .await
            {
                log::error!("退出前平仓失败: {}", e);
            }
        }
    }

    service.shutdown().await;
    log::info!("引擎已退出");
    Ok(())
}
