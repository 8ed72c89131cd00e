//! 保证金监控模块
//!
//! 定期轮询所有未平仓持仓对应的保证金账户，按三级阈值产出告警:
//!     margin_level < liquidation_risk_level => LIQUIDATION_RISK
//!     margin_level < critical_level         => CRITICAL
//!     margin_level < warning_level          => WARNING
//! 每轮每个持仓至多一条告警（只报最高级别）。
//! 开启 auto_close_on_liquidation_risk 后，LIQUIDATION_RISK 持仓
//! 走常规平仓通道强制平掉，不走任何特殊路径。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::core::config::MonitorConfig;
use crate::core::notify::AlertSink;
use crate::core::types::{Alert, AlertSeverity, MarginAccount, Position, Result};
use crate::core::venue::{call_with_timeout, VenueAdapter};
use crate::engine::positions::{close_reason, PositionManager};

/// 保证金监控器
pub struct MarginMonitor {
    venue: Arc<dyn VenueAdapter>,
    positions: Arc<PositionManager>,
    sink: Arc<dyn AlertSink>,
    config: MonitorConfig,
    timeout_ms: u64,
}

impl MarginMonitor {
    pub fn new(
        venue: Arc<dyn VenueAdapter>,
        positions: Arc<PositionManager>,
        sink: Arc<dyn AlertSink>,
        config: MonitorConfig,
        timeout_ms: u64,
    ) -> Self {
        Self {
            venue,
            positions,
            sink,
            config,
            timeout_ms,
        }
    }

    /// 执行一轮巡检，返回本轮产出的告警
    ///
    /// 同一交易对的快照每轮只拉取一次；单个交易对快照失败
    /// 只跳过该交易对的持仓，不中断整轮巡检。
    pub async fn sweep(&self) -> Result<Vec<Alert>> {
        let open_positions = self.positions.open_positions().await;
        if open_positions.is_empty() {
            return Ok(Vec::new());
        }

        // 每轮每个交易对一次快照
        let mut snapshots: HashMap<String, Option<MarginAccount>> = HashMap::new();
        for position in &open_positions {
            if snapshots.contains_key(&position.symbol) {
                continue;
            }
            let snapshot = call_with_timeout(
                "get_margin_account",
                self.timeout_ms,
                self.venue.get_margin_account(&position.symbol),
            )
            .await;
            match snapshot {
                Ok(account) => {
                    snapshots.insert(position.symbol.clone(), Some(account));
                }
                Err(e) => {
                    log::warn!("⚠️ {} 保证金快照获取失败, 本轮跳过: {}", position.symbol, e);
                    snapshots.insert(position.symbol.clone(), None);
                }
            }
        }

        let mut alerts = Vec::new();
        let mut to_close = Vec::new();

        for position in &open_positions {
            let account = match snapshots.get(&position.symbol) {
                Some(Some(account)) => account,
                _ => continue,
            };
            let margin_level = account.margin_level();

            let severity = if margin_level < self.config.liquidation_risk_level {
                Some(AlertSeverity::LiquidationRisk)
            } else if margin_level < self.config.critical_level {
                Some(AlertSeverity::Critical)
            } else if margin_level < self.config.warning_level {
                Some(AlertSeverity::Warning)
            } else {
                None
            };

            let Some(severity) = severity else { continue };

            let alert = Alert {
                position_id: position.id.clone(),
                symbol: position.symbol.clone(),
                severity,
                margin_level,
                message: self.describe(position, severity, margin_level),
                timestamp: Utc::now(),
            };
            self.sink.publish(&alert).await;
            alerts.push(alert);

            if severity == AlertSeverity::LiquidationRisk
                && self.config.auto_close_on_liquidation_risk
            {
                to_close.push(position.id.clone());
            }
        }

        // 强制平仓走常规平仓通道，失败不影响其他持仓
        for position_id in to_close {
            log::error!("🚨 持仓 {} 触发强制平仓", position_id);
            if let Err(e) = self
                .positions
                .close_position(&position_id, None, close_reason::LIQUIDATION_RISK)
                .await
            {
                log::error!("❌ 持仓 {} 强制平仓失败: {}", position_id, e);
            }
        }

        Ok(alerts)
    }

    fn describe(&self, position: &Position, severity: AlertSeverity, margin_level: f64) -> String {
        match severity {
            AlertSeverity::Warning => format!(
                "持仓 {} 保证金率 {:.4} 低于警戒线 {:.4}",
                position.id, margin_level, self.config.warning_level
            ),
            AlertSeverity::Critical => format!(
                "持仓 {} 保证金率 {:.4} 低于危险线 {:.4}, 请考虑补充保证金或减仓",
                position.id, margin_level, self.config.critical_level
            ),
            AlertSeverity::LiquidationRisk => format!(
                "持仓 {} 保证金率 {:.4} 低于强平风险线 {:.4}",
                position.id, margin_level, self.config.liquidation_risk_level
            ),
        }
    }

    /// 常驻监控任务，收到关闭信号后退出
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        log::info!(
            "保证金监控启动 (间隔 {}秒, 阈值 {}/{}/{}, 自动强平: {})",
            self.config.interval_secs,
            self.config.warning_level,
            self.config.critical_level,
            self.config.liquidation_risk_level,
            self.config.auto_close_on_liquidation_risk
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(alerts) if !alerts.is_empty() => {
                            log::info!("本轮巡检产出 {} 条告警", alerts.len());
                        }
                        Ok(_) => {}
                        Err(e) => log::error!("巡检异常: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("保证金监控收到关闭信号, 退出");
                        return;
                    }
                }
            }
        }
    }
}
