//! 持仓生命周期管理模块
//!
//! 开仓编排: 行情 -> 仓位计算 -> 划入保证金 -> 市价开仓 -> 物化持仓。
//! 每个开仓订单至多物化一个持仓（按 funding_order_id 幂等）。
//! 平仓编排: 校验 -> reduce-only市价单 -> 回写剩余数量/已实现盈亏 ->
//! 全部平掉后把保证金划回现货。
//!
//! 并发模型: 每个持仓一把锁，交易所往返期间不持任何锁，
//! 回来后重新取锁并复核状态。

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::core::config::SizingConfig;
use crate::core::error::EngineError;
use crate::core::types::{
    FillReport, OrderRequest, OrderStatus, OrderType, Position, PositionFilter, PositionSide,
    PositionStatus, Result, TransferStatus,
};
use crate::core::venue::{call_with_timeout, VenueAdapter};
use crate::engine::orders::OrderTracker;
use crate::engine::sizing::{self, LotConstraints, RiskParameters, SizingResult};
use crate::engine::transfer::TransferCoordinator;
use crate::utils::ids::IdGenerator;

const QTY_EPS: f64 = 1e-9;

/// 平仓原因
pub mod close_reason {
    pub const MANUAL: &str = "MANUAL";
    pub const STOP_LOSS: &str = "STOP_LOSS";
    pub const TAKE_PROFIT: &str = "TAKE_PROFIT";
    pub const LIQUIDATION_RISK: &str = "LIQUIDATION_RISK";
}

/// 开仓请求
#[derive(Debug, Clone)]
pub struct OpenPositionRequest {
    pub symbol: String,
    pub side: PositionSide,
    /// 账户净值（仓位计算的资金基数，计价币）
    pub equity: f64,
    pub stop_price: f64,
    pub take_profit_price: Option<f64>,
    /// 担保资产，如 USDC
    pub collateral_asset: String,
    /// 不填则用配置的默认值
    pub risk_fraction: Option<f64>,
    pub leverage: Option<u32>,
    pub lot: Option<LotConstraints>,
}

/// 持仓管理器
pub struct PositionManager {
    venue: Arc<dyn VenueAdapter>,
    orders: Arc<OrderTracker>,
    transfers: Arc<TransferCoordinator>,
    sizing_config: SizingConfig,
    timeout_ms: u64,
    ids: IdGenerator,
    positions: RwLock<HashMap<String, Arc<Mutex<Position>>>>,
    /// 开仓订单ID -> 持仓ID，保证一个开仓订单至多物化一个持仓
    funding_index: RwLock<HashMap<String, String>>,
}

impl PositionManager {
    pub fn new(
        venue: Arc<dyn VenueAdapter>,
        orders: Arc<OrderTracker>,
        transfers: Arc<TransferCoordinator>,
        sizing_config: SizingConfig,
        timeout_ms: u64,
    ) -> Self {
        Self {
            venue,
            orders,
            transfers,
            sizing_config,
            timeout_ms,
            ids: IdGenerator::new("POS"),
            positions: RwLock::new(HashMap::new()),
            funding_index: RwLock::new(HashMap::new()),
        }
    }

    /// 按当前行情和配置计算仓位（只读，不下单不划转）
    pub async fn calculate_size(
        &self,
        symbol: &str,
        side: PositionSide,
        equity: f64,
        stop_price: f64,
    ) -> Result<SizingResult> {
        let entry_price = call_with_timeout(
            "get_quote",
            self.timeout_ms,
            self.venue.get_quote(symbol),
        )
        .await?;
        let params =
            RiskParameters::with_defaults(equity, entry_price, stop_price, side, &self.sizing_config);
        sizing::size(&params)
    }

    /// 开仓
    ///
    /// 划转完成后开仓订单失败时，把保证金划回现货；
    /// 回转也失败时返回 CompensationRequired，留给人工处理，
    /// 绝不留下"资金已划入但无持仓也无记录"的静默状态。
    pub async fn open_position(&self, request: OpenPositionRequest) -> Result<Position> {
        // ===== 1. 行情 + 仓位计算，本地校验失败不触达资金 =====
        let entry_price = call_with_timeout(
            "get_quote",
            self.timeout_ms,
            self.venue.get_quote(&request.symbol),
        )
        .await?;

        let params = RiskParameters {
            equity: request.equity,
            risk_fraction: request
                .risk_fraction
                .unwrap_or(self.sizing_config.max_risk_fraction),
            entry_price,
            stop_price: request.stop_price,
            side: request.side,
            leverage: request.leverage.unwrap_or(self.sizing_config.default_leverage),
            max_position_fraction: self.sizing_config.max_position_fraction,
            lot: request.lot.clone().unwrap_or_default(),
        };
        if params.leverage > self.sizing_config.max_leverage {
            return Err(EngineError::ValidationError {
                field: "leverage".to_string(),
                reason: format!(
                    "杠杆 {} 超过允许上限 {}",
                    params.leverage, self.sizing_config.max_leverage
                ),
            });
        }
        let sized = sizing::size(&params)?;

        log::info!(
            "开仓 {} {}: 数量 {} @ ~{} (保证金 {}, 风险 {:.2}%{})",
            request.symbol,
            request.side,
            sized.quantity,
            entry_price,
            sized.margin_required,
            sized.risk_percent,
            if sized.is_capped { ", 已触及市值上限" } else { "" }
        );

        // ===== 2. 划入保证金 =====
        let transfer = self
            .transfers
            .transfer_to_margin(&request.symbol, &request.collateral_asset, sized.margin_required)
            .await?;
        if transfer.status != TransferStatus::Completed {
            return Err(EngineError::TransferFailed {
                transfer_id: transfer.id,
                reason: transfer
                    .error_message
                    .unwrap_or_else(|| "划转未完成".to_string()),
            });
        }

        // ===== 3. 市价开仓 =====
        let order_request = OrderRequest {
            symbol: request.symbol.clone(),
            side: request.side.opening_order_side(),
            order_type: OrderType::Market,
            quantity: sized.quantity,
            price: None,
            reduce_only: false,
            client_order_id: None,
        };

        let order = match self.orders.submit(order_request).await {
            Ok(order) => order,
            Err(e) => {
                // 结果不明时资金保持划入状态，等对账结论，不能回转
                log::error!("开仓订单提交异常, 保证金已划入 ({}): {}", transfer.id, e);
                return Err(e);
            }
        };

        if order.status == OrderStatus::Rejected {
            return Err(self
                .compensate_rejected_open(&request, &transfer.id, sized.margin_required)
                .await);
        }
        if order.filled_quantity <= QTY_EPS {
            // 市价单零成交按失败处理：撤单后回转保证金
            log::warn!("开仓订单 {} 零成交, 撤单并回转保证金", order.id);
            let _ = self.orders.cancel(&order.id).await;
            return Err(self
                .compensate_rejected_open(&request, &transfer.id, sized.margin_required)
                .await);
        }

        // ===== 4. 物化持仓（入场价以实际成交均价为准） =====
        let position = Position {
            id: self.ids.generate(),
            symbol: request.symbol.clone(),
            side: request.side,
            entry_price: order.avg_fill_price.unwrap_or(entry_price),
            quantity: order.filled_quantity,
            remaining_quantity: order.filled_quantity,
            stop_price: request.stop_price,
            take_profit_price: request.take_profit_price,
            leverage: params.leverage,
            collateral_asset: request.collateral_asset.clone(),
            status: PositionStatus::Open,
            funding_order_id: order.id.clone(),
            close_order_ids: Vec::new(),
            margin_allocated: sized.margin_required,
            realized_pnl: 0.0,
            opened_at: Utc::now(),
            closed_at: None,
            close_reason: None,
            updated_at: Utc::now(),
        };

        log::info!(
            "✅ 持仓建立 {}: {} {} 数量 {} @ {} (止损 {}, 杠杆 {}x)",
            position.id,
            position.symbol,
            position.side,
            position.quantity,
            position.entry_price,
            position.stop_price,
            position.leverage
        );

        self.funding_index
            .write()
            .await
            .insert(order.id.clone(), position.id.clone());
        self.positions
            .write()
            .await
            .insert(position.id.clone(), Arc::new(Mutex::new(position.clone())));
        Ok(position)
    }

    /// 开仓订单失败后的资金回转
    async fn compensate_rejected_open(
        &self,
        request: &OpenPositionRequest,
        funding_transfer_id: &str,
        amount: f64,
    ) -> EngineError {
        log::warn!(
            "开仓订单失败, 回转保证金 {} {} ({})",
            amount,
            request.collateral_asset,
            request.symbol
        );
        match self
            .transfers
            .transfer_from_margin(&request.symbol, &request.collateral_asset, amount)
            .await
        {
            Ok(back) if back.status == TransferStatus::Completed => {
                EngineError::VenueRejected("开仓订单被拒, 保证金已回转".to_string())
            }
            Ok(back) => EngineError::CompensationRequired {
                failed_step: "开仓订单".to_string(),
                transfer_id: funding_transfer_id.to_string(),
                reason: back
                    .error_message
                    .unwrap_or_else(|| "保证金回转失败".to_string()),
            },
            Err(e) => EngineError::CompensationRequired {
                failed_step: "开仓订单".to_string(),
                transfer_id: funding_transfer_id.to_string(),
                reason: format!("保证金回转异常: {}", e),
            },
        }
    }

    /// 平仓（quantity为None时全部平掉）
    ///
    /// 已实现盈亏 = 平仓数量 × (平仓价 - 入场价)，Short取反。
    /// 剩余数量归零时持仓转Closed并把保证金划回现货；
    /// 回转失败只记日志等待人工核对，持仓绝不因此重新打开。
    pub async fn close_position(
        &self,
        position_id: &str,
        quantity: Option<f64>,
        reason: &str,
    ) -> Result<Position> {
        let handle = self
            .handle(position_id)
            .await
            .ok_or_else(|| EngineError::PositionNotFound(position_id.to_string()))?;

        // 锁内校验并确定平仓数量，交易所往返期间不持锁
        let (symbol, side, close_quantity) = {
            let position = handle.lock().await;
            if position.is_closed() {
                return Err(EngineError::PositionAlreadyClosed(position.id.clone()));
            }
            let close_quantity = quantity.unwrap_or(position.remaining_quantity);
            if close_quantity <= 0.0 {
                return Err(EngineError::ValidationError {
                    field: "quantity".to_string(),
                    reason: format!("平仓数量必须为正: {}", close_quantity),
                });
            }
            if close_quantity > position.remaining_quantity + QTY_EPS {
                return Err(EngineError::ValidationError {
                    field: "quantity".to_string(),
                    reason: format!(
                        "平仓数量 {} 超过剩余数量 {}",
                        close_quantity, position.remaining_quantity
                    ),
                });
            }
            (position.symbol.clone(), position.side, close_quantity)
        };

        log::info!(
            "平仓 {}: {} 数量 {} (原因: {})",
            position_id,
            symbol,
            close_quantity,
            reason
        );

        let close_order = self
            .orders
            .submit(OrderRequest {
                symbol: symbol.clone(),
                side: side.closing_order_side(),
                order_type: OrderType::Market,
                quantity: close_quantity,
                price: None,
                reduce_only: true,
                client_order_id: None,
            })
            .await?;

        if close_order.status == OrderStatus::Rejected {
            return Err(EngineError::VenueRejected(format!(
                "平仓订单 {} 被拒",
                close_order.id
            )));
        }

        // 重新取锁回写。交易所往返期间其他平仓可能已推进状态，按实际成交量结算
        let (snapshot, released_margin) = {
            let mut position = handle.lock().await;
            if position.is_closed() {
                // 往返期间已被其他路径平掉，成交以订单记录留痕
                log::warn!(
                    "持仓 {} 在平仓往返期间已关闭, 平仓订单 {} 按冗余减仓记录",
                    position.id,
                    close_order.id
                );
                return Err(EngineError::PositionAlreadyClosed(position.id.clone()));
            }

            let closed = close_order.filled_quantity.min(position.remaining_quantity);
            let close_price = close_order.avg_fill_price.unwrap_or(position.entry_price);
            let pnl = match position.side {
                PositionSide::Long => (close_price - position.entry_price) * closed,
                PositionSide::Short => (position.entry_price - close_price) * closed,
            };

            position.remaining_quantity -= closed;
            position.realized_pnl += pnl;
            position.close_order_ids.push(close_order.id.clone());
            position.updated_at = Utc::now();

            let released = if position.remaining_quantity <= QTY_EPS {
                position.remaining_quantity = 0.0;
                position.status = PositionStatus::Closed;
                position.closed_at = Some(Utc::now());
                position.close_reason = Some(reason.to_string());
                log::info!(
                    "✅ 持仓 {} 已全部平仓 @ {} (已实现盈亏 {:.4})",
                    position.id,
                    close_price,
                    position.realized_pnl
                );
                position.margin_allocated
            } else {
                position.status = PositionStatus::PartiallyClosed;
                log::info!(
                    "持仓 {} 部分平仓 {} @ {} (剩余 {}, 本次盈亏 {:.4})",
                    position.id,
                    closed,
                    close_price,
                    position.remaining_quantity,
                    pnl
                );
                0.0
            };
            (position.clone(), released)
        };

        // 全部平掉后把保证金划回现货（锁外执行）
        if released_margin > 0.0 {
            match self
                .transfers
                .transfer_from_margin(&symbol, &snapshot.collateral_asset, released_margin)
                .await
            {
                Ok(back) if back.status == TransferStatus::Completed => {}
                Ok(back) => log::error!(
                    "⚠️ 持仓 {} 平仓后保证金回转失败 ({}), 资金滞留保证金账户, 需要人工核对",
                    snapshot.id,
                    back.error_message.unwrap_or_default()
                ),
                Err(e) => log::error!(
                    "⚠️ 持仓 {} 平仓后保证金回转异常: {}, 需要人工核对",
                    snapshot.id,
                    e
                ),
            }
        }

        Ok(snapshot)
    }

    /// 处理外部推送的成交回报
    ///
    /// 先交给订单状态机做幂等去重，开仓订单新增的成交量
    /// 同步累加到对应持仓上（重复回报增量为0，持仓不变）。
    pub async fn on_order_fill(&self, report: &FillReport) -> Result<()> {
        let delta = self
            .orders
            .apply_fill_report(&report.order_id, report.cumulative_filled, report.price)
            .await?;
        if delta.applied_quantity <= 0.0 {
            return Ok(());
        }

        let position_id = self
            .funding_index
            .read()
            .await
            .get(&report.order_id)
            .cloned();
        if let Some(position_id) = position_id {
            if let Some(handle) = self.handle(&position_id).await {
                let mut position = handle.lock().await;
                if position.is_closed() {
                    log::warn!(
                        "持仓 {} 已关闭, 忽略开仓订单 {} 的迟到成交",
                        position.id,
                        report.order_id
                    );
                    return Ok(());
                }
                position.quantity += delta.applied_quantity;
                position.remaining_quantity += delta.applied_quantity;
                // 入场价始终跟随开仓订单的成交量加权均价
                if let Some(avg) = delta.order.avg_fill_price {
                    position.entry_price = avg;
                }
                position.updated_at = Utc::now();
                log::info!(
                    "持仓 {} 开仓订单补成交 +{} (数量 {} @ {})",
                    position.id,
                    delta.applied_quantity,
                    position.quantity,
                    position.entry_price
                );
            }
        }
        Ok(())
    }

    /// 查询持仓快照
    pub async fn get_position(&self, position_id: &str) -> Option<Position> {
        let handle = self.handle(position_id).await?;
        let position = handle.lock().await;
        Some(position.clone())
    }

    /// 按条件列出持仓快照
    pub async fn list_positions(&self, filter: &PositionFilter) -> Vec<Position> {
        let handles: Vec<_> = self.positions.read().await.values().cloned().collect();
        let mut result = Vec::new();
        for handle in handles {
            let position = handle.lock().await;
            if filter.matches(&position) {
                result.push(position.clone());
            }
        }
        result.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        result
    }

    /// 未平仓持仓快照（监控器用）
    pub async fn open_positions(&self) -> Vec<Position> {
        let filter = PositionFilter::default();
        self.list_positions(&filter)
            .await
            .into_iter()
            .filter(|p| !p.is_closed())
            .collect()
    }

    async fn handle(&self, position_id: &str) -> Option<Arc<Mutex<Position>>> {
        self.positions.read().await.get(position_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::paper::PaperVenue;

    fn sizing_config() -> SizingConfig {
        SizingConfig {
            max_risk_fraction: 0.01,
            max_position_fraction: 0.5,
            default_leverage: 1,
            max_leverage: 10,
        }
    }

    fn manager() -> (Arc<PaperVenue>, PositionManager) {
        let venue = Arc::new(PaperVenue::new());
        venue.set_quote("BTCUSDC", 100.0);
        let orders = Arc::new(OrderTracker::new(venue.clone(), 1000));
        let transfers = Arc::new(TransferCoordinator::new(venue.clone(), 1000));
        let manager = PositionManager::new(venue.clone(), orders, transfers, sizing_config(), 1000);
        (venue, manager)
    }

    fn open_request() -> OpenPositionRequest {
        OpenPositionRequest {
            symbol: "BTCUSDC".to_string(),
            side: PositionSide::Long,
            equity: 10000.0,
            stop_price: 98.0,
            take_profit_price: None,
            collateral_asset: "USDC".to_string(),
            risk_fraction: None,
            leverage: None,
            lot: None,
        }
    }

    #[tokio::test]
    async fn test_open_position_full_flow() {
        let (venue, manager) = manager();
        let position = manager.open_position(open_request()).await.unwrap();

        // 净值10000, 风险1%, 止损距离2 => 数量50, 市值5000, 1倍杠杆保证金5000
        assert!((position.quantity - 50.0).abs() < 1e-9);
        assert!((position.remaining_quantity - 50.0).abs() < 1e-9);
        assert_eq!(position.status, PositionStatus::Open);
        assert!((position.entry_price - 100.0).abs() < 1e-9);
        assert!((position.margin_allocated - 5000.0).abs() < 1e-6);

        // 保证金已实际划入交易所账户
        let account = venue.get_margin_account("BTCUSDC").await.unwrap();
        assert!((account.collateral - 5000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_open_rejected_stop_never_reaches_funds() {
        let (venue, manager) = manager();
        let mut request = open_request();
        request.stop_price = 102.0; // Long止损在盈利侧, 非法
        let result = manager.open_position(request).await;
        assert!(matches!(result, Err(EngineError::StopOnWrongSide { .. })));
        assert_eq!(venue.transfer_call_count(), 0);
    }

    #[tokio::test]
    async fn test_open_leverage_above_limit_rejected() {
        let (venue, manager) = manager();
        let mut request = open_request();
        request.leverage = Some(20); // 配置允许上限10
        let result = manager.open_position(request).await;
        assert!(matches!(result, Err(EngineError::ValidationError { .. })));
        assert_eq!(venue.transfer_call_count(), 0);
    }

    #[tokio::test]
    async fn test_open_order_rejected_margin_returned() {
        let (venue, manager) = manager();
        venue.reject_orders("MIN_NOTIONAL");
        let result = manager.open_position(open_request()).await;
        assert!(matches!(result, Err(EngineError::VenueRejected(_))));
        // 划入 + 回转
        assert_eq!(venue.transfer_call_count(), 2);
        let account = venue.get_margin_account("BTCUSDC").await.unwrap();
        assert!(account.collateral.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_open_order_rejected_and_compensation_fails() {
        let (venue, manager) = manager();
        venue.reject_orders("MIN_NOTIONAL");
        // 划入成功, 回转阶段开始失败
        venue.fail_transfers_after(1, "划转服务维护中");
        let result = manager.open_position(open_request()).await;
        // 拒单后的资金回转也失败 => 需要人工补偿, 错误里带上原划转流水
        match result {
            Err(EngineError::CompensationRequired { transfer_id, .. }) => {
                assert!(!transfer_id.is_empty());
            }
            other => panic!("预期CompensationRequired, 实际: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ambiguous_open_order_materializes_no_position() {
        let venue = Arc::new(PaperVenue::new());
        venue.set_quote("BTCUSDC", 100.0);
        // 下单和对账都超时
        venue.delay_orders_ms(200);
        let orders = Arc::new(OrderTracker::new(venue.clone(), 20));
        let transfers = Arc::new(TransferCoordinator::new(venue.clone(), 1000));
        let manager =
            PositionManager::new(venue.clone(), orders, transfers, sizing_config(), 1000);

        let result = manager.open_position(open_request()).await;
        assert!(matches!(result, Err(EngineError::AmbiguousOutcome { .. })));
        // 结果不明时不物化持仓
        assert!(manager
            .list_positions(&PositionFilter::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_fill_report_leaves_position_unchanged() {
        let (_venue, manager) = manager();
        let position = manager.open_position(open_request()).await.unwrap();
        assert!((position.quantity - 50.0).abs() < 1e-9);

        // 开仓订单的累计成交回报重复推送
        let report = FillReport {
            order_id: position.funding_order_id.clone(),
            cumulative_filled: 50.0,
            price: 100.0,
            timestamp: Utc::now(),
        };
        manager.on_order_fill(&report).await.unwrap();
        manager.on_order_fill(&report).await.unwrap();

        let after = manager.get_position(&position.id).await.unwrap();
        assert!((after.quantity - 50.0).abs() < 1e-9);
        assert!((after.remaining_quantity - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_close_updates_remaining_and_pnl() {
        let (venue, manager) = manager();
        let position = manager.open_position(open_request()).await.unwrap();

        // 价格涨到110后平掉 50 中的 20
        venue.set_quote("BTCUSDC", 110.0);
        let after = manager
            .close_position(&position.id, Some(20.0), close_reason::MANUAL)
            .await
            .unwrap();

        assert_eq!(after.status, PositionStatus::PartiallyClosed);
        assert!((after.remaining_quantity - 30.0).abs() < 1e-9);
        // 已实现盈亏 = 20 × (110 - 100) = 200
        assert!((after.realized_pnl - 200.0).abs() < 1e-6);
        assert_eq!(after.close_order_ids.len(), 1);
        assert!(after.close_reason.is_none());
    }

    #[tokio::test]
    async fn test_full_close_releases_margin() {
        let (venue, manager) = manager();
        let position = manager.open_position(open_request()).await.unwrap();
        let account = venue.get_margin_account("BTCUSDC").await.unwrap();
        assert!((account.collateral - 5000.0).abs() < 1e-6);

        venue.set_quote("BTCUSDC", 105.0);
        let closed = manager
            .close_position(&position.id, None, close_reason::MANUAL)
            .await
            .unwrap();

        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.remaining_quantity, 0.0);
        assert_eq!(closed.close_reason.as_deref(), Some(close_reason::MANUAL));
        assert!(closed.closed_at.is_some());
        // 全平后保证金回到现货
        let account = venue.get_margin_account("BTCUSDC").await.unwrap();
        assert!(account.collateral.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_close_more_than_remaining_rejected() {
        let (_venue, manager) = manager();
        let position = manager.open_position(open_request()).await.unwrap();
        let result = manager
            .close_position(&position.id, Some(60.0), close_reason::MANUAL)
            .await;
        assert!(matches!(result, Err(EngineError::ValidationError { .. })));
        // 持仓状态无变化
        let after = manager.get_position(&position.id).await.unwrap();
        assert!((after.remaining_quantity - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_close_already_closed_rejected() {
        let (_venue, manager) = manager();
        let position = manager.open_position(open_request()).await.unwrap();
        manager
            .close_position(&position.id, None, close_reason::MANUAL)
            .await
            .unwrap();
        let result = manager
            .close_position(&position.id, None, close_reason::MANUAL)
            .await;
        assert!(matches!(
            result,
            Err(EngineError::PositionAlreadyClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_short_close_pnl_sign() {
        let (venue, manager) = manager();
        let mut request = open_request();
        request.side = PositionSide::Short;
        request.stop_price = 102.0;
        let position = manager.open_position(request).await.unwrap();

        // Short在价格下跌时获利
        venue.set_quote("BTCUSDC", 90.0);
        let closed = manager
            .close_position(&position.id, None, close_reason::TAKE_PROFIT)
            .await
            .unwrap();
        // 50 × (100 - 90) = 500
        assert!((closed.realized_pnl - 500.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_list_positions_filter() {
        let (_venue, manager) = manager();
        let p1 = manager.open_position(open_request()).await.unwrap();
        let _p2 = manager.open_position(open_request()).await.unwrap();
        manager
            .close_position(&p1.id, None, close_reason::MANUAL)
            .await
            .unwrap();

        let open = manager
            .list_positions(&PositionFilter {
                status: Some(PositionStatus::Open),
                ..Default::default()
            })
            .await;
        assert_eq!(open.len(), 1);

        let closed = manager
            .list_positions(&PositionFilter {
                status: Some(PositionStatus::Closed),
                ..Default::default()
            })
            .await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, p1.id);
    }
}
