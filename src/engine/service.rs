//! 引擎服务门面
//!
//! 把订单/划转/持仓/监控组装成一个对外入口，
//! 外层（CLI、上层策略）只和这个门面打交道。

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::core::config::EngineConfig;
use crate::core::notify::AlertSink;
use crate::core::types::{
    Alert, FillReport, MarginAccount, Position, PositionFilter, PositionSide, Result, Transfer,
};
use crate::core::venue::{call_with_timeout, VenueAdapter};
use crate::engine::monitor::MarginMonitor;
use crate::engine::orders::OrderTracker;
use crate::engine::positions::{OpenPositionRequest, PositionManager};
use crate::engine::sizing::SizingResult;
use crate::engine::transfer::TransferCoordinator;

/// 保证金交易引擎服务
pub struct MarginService {
    venue: Arc<dyn VenueAdapter>,
    transfers: Arc<TransferCoordinator>,
    positions: Arc<PositionManager>,
    monitor: Arc<MarginMonitor>,
    timeout_ms: u64,
    shutdown_tx: watch::Sender<bool>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl MarginService {
    pub fn new(
        venue: Arc<dyn VenueAdapter>,
        config: EngineConfig,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let timeout_ms = config.venue.timeout_ms;
        let orders = Arc::new(OrderTracker::new(venue.clone(), timeout_ms));
        let transfers = Arc::new(TransferCoordinator::new(venue.clone(), timeout_ms));
        let positions = Arc::new(PositionManager::new(
            venue.clone(),
            orders,
            transfers.clone(),
            config.sizing.clone(),
            timeout_ms,
        ));
        let monitor = Arc::new(MarginMonitor::new(
            venue.clone(),
            positions.clone(),
            sink,
            config.monitor.clone(),
            timeout_ms,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            venue,
            transfers,
            positions,
            monitor,
            timeout_ms,
            shutdown_tx,
            monitor_task: Mutex::new(None),
        }
    }

    /// 启动常驻保证金监控任务
    pub async fn start(&self) {
        let mut task = self.monitor_task.lock().await;
        if task.is_some() {
            log::warn!("监控任务已在运行, 忽略重复启动");
            return;
        }
        let monitor = self.monitor.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(monitor.run(shutdown_rx)));
        log::info!("引擎服务已启动 (交易所: {})", self.venue.name());
    }

    /// 停止监控任务并等待其退出
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.monitor_task.lock().await.take() {
            if let Err(e) = task.await {
                log::error!("监控任务退出异常: {}", e);
            }
        }
        log::info!("引擎服务已停止");
    }

    // ===== 对外操作 =====

    /// 逐仓保证金账户快照
    pub async fn get_margin_account(&self, symbol: &str) -> Result<MarginAccount> {
        call_with_timeout(
            "get_margin_account",
            self.timeout_ms,
            self.venue.get_margin_account(symbol),
        )
        .await
    }

    /// 仓位试算（只读）
    pub async fn calculate_position_size(
        &self,
        symbol: &str,
        side: PositionSide,
        equity: f64,
        stop_price: f64,
    ) -> Result<SizingResult> {
        self.positions
            .calculate_size(symbol, side, equity, stop_price)
            .await
    }

    /// 开仓
    pub async fn open_position(&self, request: OpenPositionRequest) -> Result<Position> {
        self.positions.open_position(request).await
    }

    /// 平仓（quantity为None时全部平掉）
    pub async fn close_position(
        &self,
        position_id: &str,
        quantity: Option<f64>,
        reason: &str,
    ) -> Result<Position> {
        self.positions.close_position(position_id, quantity, reason).await
    }

    pub async fn get_position(&self, position_id: &str) -> Option<Position> {
        self.positions.get_position(position_id).await
    }

    pub async fn list_positions(&self, filter: &PositionFilter) -> Vec<Position> {
        self.positions.list_positions(filter).await
    }

    /// 处理交易所推送的成交回报
    pub async fn on_order_fill(&self, report: &FillReport) -> Result<()> {
        self.positions.on_order_fill(report).await
    }

    /// 手动触发一轮保证金巡检（常驻任务之外的即时检查）
    pub async fn monitor_margins(&self) -> Result<Vec<Alert>> {
        self.monitor.sweep().await
    }

    /// 现货 -> 逐仓保证金
    pub async fn transfer_to_margin(
        &self,
        symbol: &str,
        asset: &str,
        amount: f64,
    ) -> Result<Transfer> {
        self.transfers.transfer_to_margin(symbol, asset, amount).await
    }

    /// 逐仓保证金 -> 现货
    pub async fn transfer_from_margin(
        &self,
        symbol: &str,
        asset: &str,
        amount: f64,
    ) -> Result<Transfer> {
        self.transfers.transfer_from_margin(symbol, asset, amount).await
    }

    /// 划转审计记录
    pub async fn transfer_history(&self) -> Vec<Transfer> {
        self.transfers.history().await
    }
}
