//! 订单状态机模块
//!
//! 状态流转:
//!     Pending -> PartiallyFilled -> Filled
//!     Pending -> Filled
//!     Pending | PartiallyFilled -> Cancelled
//!     Pending -> Rejected
//! Filled / Cancelled / Rejected 为终态，不再接受任何变更。
//!
//! 成交回报按交易所累计口径处理：重复或乱序推送的回报，
//! 累计量不大于已记录值时直接丢弃，保证 filled_quantity 单调不减。

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::core::error::EngineError;
use crate::core::types::{Order, OrderRequest, OrderStatus, Result};
use crate::core::venue::{call_with_timeout, VenueAdapter};
use crate::utils::ids::IdGenerator;

/// 成交量相等判断的容差
const QTY_EPS: f64 = 1e-9;

/// 应用一条成交回报后的增量结果
#[derive(Debug, Clone)]
pub struct FillDelta {
    /// 本次回报实际新增的成交量（重复回报为0）
    pub applied_quantity: f64,
    pub price: f64,
    /// 应用后的订单快照
    pub order: Order,
}

/// 订单跟踪器
///
/// 订单从不删除（审计保留），每个订单一把锁，
/// 同一订单的回报处理串行化，不同订单互不阻塞。
pub struct OrderTracker {
    venue: Arc<dyn VenueAdapter>,
    timeout_ms: u64,
    ids: IdGenerator,
    orders: RwLock<HashMap<String, Arc<Mutex<Order>>>>,
}

impl OrderTracker {
    pub fn new(venue: Arc<dyn VenueAdapter>, timeout_ms: u64) -> Self {
        Self {
            venue,
            timeout_ms,
            ids: IdGenerator::new("ORD"),
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// 提交订单
    ///
    /// 交易所明确拒单映射为 Rejected 终态正常返回，不作为异常向上抛；
    /// 超时则做一次对账查询，仍无法确认时返回结果不明。
    pub async fn submit(&self, mut request: OrderRequest) -> Result<Order> {
        if request.quantity <= 0.0 {
            return Err(EngineError::ValidationError {
                field: "quantity".to_string(),
                reason: format!("下单数量必须为正: {}", request.quantity),
            });
        }

        let local_id = self.ids.generate();
        // 客户端订单ID带上本地ID，超时后可凭它对账
        request.client_order_id = Some(local_id.clone());

        let mut order = Order {
            id: local_id.clone(),
            venue_order_id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            filled_quantity: 0.0,
            avg_fill_price: None,
            price: request.price,
            status: OrderStatus::Pending,
            reduce_only: request.reduce_only,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        log::info!(
            "提交订单 {}: {} {} {:?} 数量 {}",
            order.id,
            order.symbol,
            order.side,
            order.order_type,
            order.quantity
        );

        let ack = call_with_timeout(
            "place_order",
            self.timeout_ms,
            self.venue.place_order(&request),
        )
        .await;

        match ack {
            Ok(ack) => {
                order.venue_order_id = Some(ack.venue_order_id);
                self.insert(order.clone()).await;
                // 市价单通常在回执里直接带成交
                if ack.filled_quantity > 0.0 {
                    let price = ack.avg_fill_price.unwrap_or(0.0);
                    let delta = self
                        .apply_fill_report(&local_id, ack.filled_quantity, price)
                        .await?;
                    return Ok(delta.order);
                }
                Ok(order)
            }
            Err(EngineError::VenueRejected(reason)) => {
                // 拒单是正常终态
                log::warn!("订单 {} 被拒: {}", order.id, reason);
                order.status = OrderStatus::Rejected;
                order.updated_at = Utc::now();
                self.insert(order.clone()).await;
                Ok(order)
            }
            Err(EngineError::VenueError { code, message }) => {
                log::warn!("订单 {} 交易所错误 {}: {}", order.id, code, message);
                order.status = OrderStatus::Rejected;
                order.updated_at = Utc::now();
                self.insert(order.clone()).await;
                Ok(order)
            }
            Err(EngineError::TimeoutError { .. }) => {
                // 超时不等于失败，先对账再定本地状态
                log::warn!("订单 {} 下单超时, 开始对账查询", order.id);
                self.reconcile_after_timeout(order).await
            }
            Err(e) => Err(e),
        }
    }

    /// 下单超时后的对账
    async fn reconcile_after_timeout(&self, mut order: Order) -> Result<Order> {
        let state = call_with_timeout(
            "get_order_state",
            self.timeout_ms,
            self.venue.get_order_state(&order.id, &order.symbol),
        )
        .await;

        match state {
            Ok(state) => {
                // 交易所确认收到过这笔订单
                order.venue_order_id = Some(state.venue_order_id);
                self.insert(order.clone()).await;
                if state.cumulative_filled > 0.0 {
                    let price = state.avg_fill_price.unwrap_or(0.0);
                    let delta = self
                        .apply_fill_report(&order.id, state.cumulative_filled, price)
                        .await?;
                    return Ok(delta.order);
                }
                Ok(order)
            }
            Err(EngineError::OrderNotFound(_)) => {
                // 交易所确认从未收到，安全地按拒单落账
                log::warn!("订单 {} 对账确认未到达交易所, 记为Rejected", order.id);
                order.status = OrderStatus::Rejected;
                order.updated_at = Utc::now();
                self.insert(order.clone()).await;
                Ok(order)
            }
            Err(e) => {
                // 对账也失败，结果只能交给人工
                log::error!("订单 {} 对账失败, 结果不明: {}", order.id, e);
                self.insert(order.clone()).await;
                Err(EngineError::AmbiguousOutcome {
                    operation: "place_order".to_string(),
                    detail: format!("订单 {} 下单超时且对账失败", order.id),
                })
            }
        }
    }

    /// 应用成交回报（累计口径，幂等）
    ///
    /// 同一订单并发回报安全：内部持有该订单的锁串行处理。
    pub async fn apply_fill_report(
        &self,
        order_id: &str,
        cumulative_filled: f64,
        price: f64,
    ) -> Result<FillDelta> {
        let handle = self
            .handle(order_id)
            .await
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        let mut order = handle.lock().await;

        if matches!(
            order.status,
            OrderStatus::Cancelled | OrderStatus::Rejected
        ) {
            // 撤单/拒单后迟到的回报，丢弃
            log::warn!(
                "订单 {} 已终态({:?}), 丢弃迟到回报 cum={}",
                order.id,
                order.status,
                cumulative_filled
            );
            return Ok(FillDelta {
                applied_quantity: 0.0,
                price,
                order: order.clone(),
            });
        }

        // 幂等去重: 累计量不增加则为重复/乱序回报
        if cumulative_filled <= order.filled_quantity + QTY_EPS {
            log::debug!(
                "订单 {} 重复回报 cum={} (已记录 {}), 忽略",
                order.id,
                cumulative_filled,
                order.filled_quantity
            );
            return Ok(FillDelta {
                applied_quantity: 0.0,
                price,
                order: order.clone(),
            });
        }

        let capped = cumulative_filled.min(order.quantity);
        if cumulative_filled > order.quantity + QTY_EPS {
            log::warn!(
                "订单 {} 回报累计量 {} 超过委托量 {}, 截断处理",
                order.id,
                cumulative_filled,
                order.quantity
            );
        }

        let delta = capped - order.filled_quantity;

        // 成交量加权均价
        let prev_notional = order.avg_fill_price.unwrap_or(0.0) * order.filled_quantity;
        order.filled_quantity = capped;
        order.avg_fill_price = Some((prev_notional + delta * price) / order.filled_quantity);

        order.status = if order.filled_quantity + QTY_EPS >= order.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        order.updated_at = Utc::now();

        log::info!(
            "订单 {} 成交 +{} @ {} (累计 {}/{}, 状态 {:?})",
            order.id,
            delta,
            price,
            order.filled_quantity,
            order.quantity,
            order.status
        );

        Ok(FillDelta {
            applied_quantity: delta,
            price,
            order: order.clone(),
        })
    }

    /// 撤单
    ///
    /// 终态订单直接拒绝；交易所确认后才落Cancelled。
    pub async fn cancel(&self, order_id: &str) -> Result<Order> {
        let handle = self
            .handle(order_id)
            .await
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        // 先在锁内校验并取出撤单所需信息，交易所往返期间不持锁
        let (venue_order_id, symbol) = {
            let order = handle.lock().await;
            if order.status.is_terminal() {
                return Err(EngineError::OrderAlreadyTerminal {
                    order_id: order.id.clone(),
                    status: order.status,
                });
            }
            (
                order.venue_order_id.clone().unwrap_or_else(|| order.id.clone()),
                order.symbol.clone(),
            )
        };

        call_with_timeout(
            "cancel_order",
            self.timeout_ms,
            self.venue.cancel_order(&venue_order_id, &symbol),
        )
        .await?;

        // 重新取锁并复核状态：交易所往返期间可能已完全成交
        let mut order = handle.lock().await;
        if order.status.is_terminal() {
            return Err(EngineError::OrderAlreadyTerminal {
                order_id: order.id.clone(),
                status: order.status,
            });
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        log::info!("订单 {} 已撤销 (已成交 {})", order.id, order.filled_quantity);
        Ok(order.clone())
    }

    /// 查询订单快照
    pub async fn get(&self, order_id: &str) -> Option<Order> {
        let handle = self.handle(order_id).await?;
        let order = handle.lock().await;
        Some(order.clone())
    }

    async fn handle(&self, order_id: &str) -> Option<Arc<Mutex<Order>>> {
        self.orders.read().await.get(order_id).cloned()
    }

    async fn insert(&self, order: Order) {
        self.orders
            .write()
            .await
            .insert(order.id.clone(), Arc::new(Mutex::new(order)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderSide, OrderType};
    use crate::venues::paper::PaperVenue;

    fn tracker() -> (Arc<PaperVenue>, OrderTracker) {
        let venue = Arc::new(PaperVenue::new());
        venue.set_quote("BTCUSDC", 100.0);
        let tracker = OrderTracker::new(venue.clone(), 1000);
        (venue, tracker)
    }

    #[tokio::test]
    async fn test_market_order_fills_from_ack() {
        let (_venue, tracker) = tracker();
        let order = tracker
            .submit(OrderRequest::market("BTCUSDC", OrderSide::Buy, 10.0))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!((order.filled_quantity - 10.0).abs() < 1e-9);
        assert_eq!(order.avg_fill_price, Some(100.0));
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_not_error() {
        let (venue, tracker) = tracker();
        venue.reject_orders("LOT_SIZE");
        let order = tracker
            .submit(OrderRequest::market("BTCUSDC", OrderSide::Buy, 10.0))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn test_duplicate_fill_report_is_noop() {
        let (venue, tracker) = tracker();
        venue.hold_fills(); // 限挂单模式: 回执不带成交
        let order = tracker
            .submit(OrderRequest {
                symbol: "BTCUSDC".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                quantity: 10.0,
                price: Some(100.0),
                reduce_only: false,
                client_order_id: None,
            })
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let first = tracker.apply_fill_report(&order.id, 10.0, 100.0).await.unwrap();
        assert!((first.applied_quantity - 10.0).abs() < 1e-9);
        assert_eq!(first.order.status, OrderStatus::Filled);

        // 重复回报: 同样的累计量第二次不产生任何变化
        let second = tracker.apply_fill_report(&order.id, 10.0, 100.0).await.unwrap();
        assert_eq!(second.applied_quantity, 0.0);
        assert!((second.order.filled_quantity - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_out_of_order_reports_monotonic() {
        let (venue, tracker) = tracker();
        venue.hold_fills();
        let order = tracker
            .submit(OrderRequest {
                symbol: "BTCUSDC".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                quantity: 10.0,
                price: Some(100.0),
                reduce_only: false,
                client_order_id: None,
            })
            .await
            .unwrap();

        // 乱序: 先到累计6, 再到累计3(旧), 再到累计10
        let d1 = tracker.apply_fill_report(&order.id, 6.0, 100.0).await.unwrap();
        assert!((d1.applied_quantity - 6.0).abs() < 1e-9);
        assert_eq!(d1.order.status, OrderStatus::PartiallyFilled);

        let d2 = tracker.apply_fill_report(&order.id, 3.0, 99.0).await.unwrap();
        assert_eq!(d2.applied_quantity, 0.0);
        assert!((d2.order.filled_quantity - 6.0).abs() < 1e-9);

        let d3 = tracker.apply_fill_report(&order.id, 10.0, 101.0).await.unwrap();
        assert!((d3.applied_quantity - 4.0).abs() < 1e-9);
        assert_eq!(d3.order.status, OrderStatus::Filled);
        // 加权均价: (6×100 + 4×101) / 10 = 100.4
        assert!((d3.order.avg_fill_price.unwrap() - 100.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_terminal_order_rejected() {
        let (_venue, tracker) = tracker();
        let order = tracker
            .submit(OrderRequest::market("BTCUSDC", OrderSide::Buy, 5.0))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let result = tracker.cancel(&order.id).await;
        assert!(matches!(
            result,
            Err(EngineError::OrderAlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_order() {
        let (venue, tracker) = tracker();
        venue.hold_fills();
        let order = tracker
            .submit(OrderRequest {
                symbol: "BTCUSDC".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                quantity: 5.0,
                price: Some(95.0),
                reduce_only: false,
                client_order_id: None,
            })
            .await
            .unwrap();

        let cancelled = tracker.cancel(&order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // 撤单后迟到的回报被丢弃
        let late = tracker.apply_fill_report(&order.id, 5.0, 95.0).await.unwrap();
        assert_eq!(late.applied_quantity, 0.0);
        assert_eq!(late.order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_timeout_with_failed_reconciliation_is_ambiguous() {
        let (venue, _) = tracker();
        venue.delay_orders_ms(200);
        let tracker = OrderTracker::new(venue.clone(), 20);
        let result = tracker
            .submit(OrderRequest::market("BTCUSDC", OrderSide::Buy, 1.0))
            .await;
        // 下单和对账都超时 => 结果不明
        assert!(matches!(result, Err(EngineError::AmbiguousOutcome { .. })));
    }

    #[tokio::test]
    async fn test_timeout_reconciliation_confirms_fill() {
        let (venue, _) = tracker();
        // 下单调用超时但实际已到达交易所并成交
        venue.timeout_order_ack_but_execute();
        let tracker = OrderTracker::new(venue.clone(), 50);
        let order = tracker
            .submit(OrderRequest::market("BTCUSDC", OrderSide::Buy, 2.0))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!((order.filled_quantity - 2.0).abs() < 1e-9);
    }
}
