//! 纸面交易所适配器
//!
//! 不连任何真实交易所，在内存里模拟行情、下单成交、资金划转和
//! 逐仓保证金账户。二进制的dry-run模式和测试都用它。
//! 各种故障注入开关用于演练超时/拒单/对账路径。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::core::error::EngineError;
use crate::core::types::{
    MarginAccount, OrderRequest, Result, TransferDirection, TransferStatus,
};
use crate::core::venue::{VenueAdapter, VenueOrderAck, VenueOrderState};

#[derive(Debug, Clone)]
struct PaperOrder {
    venue_order_id: String,
    cumulative_filled: f64,
    avg_fill_price: Option<f64>,
    is_open: bool,
}

#[derive(Default)]
struct PaperState {
    quotes: HashMap<String, f64>,
    accounts: HashMap<String, MarginAccount>,
    /// 同一订单按交易所ID和客户端ID两个键存储，对账可凭任一ID查询
    orders: HashMap<String, PaperOrder>,
    order_seq: u64,
    transfer_states: HashMap<String, TransferStatus>,
    transfer_seq: u64,
    transfer_call_count: u64,
    snapshot_call_count: HashMap<String, u64>,

    // ===== 故障注入开关 =====
    hold_fills: bool,
    reject_orders: Option<String>,
    order_delay_ms: u64,
    order_ack_timeout_but_execute: bool,
    fail_transfers: Option<String>,
    fail_transfers_after: Option<(u64, String)>,
    transient_transfer_failures: u32,
    transfer_delay_ms: u64,
    transfer_ack_timeout_but_execute: bool,
    failed_snapshots: HashSet<String>,
}

/// 纸面交易所
pub struct PaperVenue {
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        self.state.lock().expect("纸面交易所状态锁中毒")
    }

    // ===== 场景控制接口 =====

    pub fn set_quote(&self, symbol: &str, price: f64) {
        self.lock().quotes.insert(symbol.to_string(), price);
    }

    pub fn set_margin_account(&self, symbol: &str, collateral: f64, borrowed: f64, unrealized_pnl: f64) {
        self.lock().accounts.insert(
            symbol.to_string(),
            MarginAccount {
                symbol: symbol.to_string(),
                collateral,
                borrowed,
                unrealized_pnl,
                refreshed_at: Utc::now(),
            },
        );
    }

    /// 限价挂单模式：下单回执不带成交，成交回报由测试方自行推送
    pub fn hold_fills(&self) {
        self.lock().hold_fills = true;
    }

    /// 后续所有订单都被拒
    pub fn reject_orders(&self, reason: &str) {
        self.lock().reject_orders = Some(reason.to_string());
    }

    /// 订单相关调用(下单/对账)延迟指定毫秒
    pub fn delay_orders_ms(&self, delay_ms: u64) {
        self.lock().order_delay_ms = delay_ms;
    }

    /// 模拟"下单回执超时但订单实际已成交"：
    /// 下单调用长时间不返回，对账查询立即返回已成交状态
    pub fn timeout_order_ack_but_execute(&self) {
        self.lock().order_ack_timeout_but_execute = true;
    }

    /// 后续所有划转都失败（确定性失败，不可重试）
    pub fn fail_transfers(&self, reason: &str) {
        self.lock().fail_transfers = Some(reason.to_string());
    }

    /// 前n次划转正常，之后全部失败
    pub fn fail_transfers_after(&self, successes: u64, reason: &str) {
        self.lock().fail_transfers_after = Some((successes, reason.to_string()));
    }

    /// 前n次划转返回503（可重试的临时错误）
    pub fn fail_transfers_transiently(&self, times: u32) {
        self.lock().transient_transfer_failures = times;
    }

    /// 划转相关调用(执行/对账)延迟指定毫秒
    pub fn delay_transfers_ms(&self, delay_ms: u64) {
        self.lock().transfer_delay_ms = delay_ms;
    }

    /// 模拟"划转回执超时但实际已完成"
    pub fn timeout_transfer_ack_but_execute(&self) {
        self.lock().transfer_ack_timeout_but_execute = true;
    }

    /// 指定交易对的保证金快照查询失败
    pub fn fail_snapshot(&self, symbol: &str) {
        self.lock().failed_snapshots.insert(symbol.to_string());
    }

    pub fn restore_snapshot(&self, symbol: &str) {
        self.lock().failed_snapshots.remove(symbol);
    }

    // ===== 观测接口 =====

    pub fn transfer_call_count(&self) -> u64 {
        self.lock().transfer_call_count
    }

    pub fn snapshot_call_count(&self, symbol: &str) -> u64 {
        self.lock()
            .snapshot_call_count
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    fn fill_price(state: &PaperState, request: &OrderRequest) -> Result<f64> {
        if let Some(price) = request.price {
            return Ok(price);
        }
        state
            .quotes
            .get(&request.symbol)
            .copied()
            .ok_or_else(|| EngineError::VenueError {
                code: 400,
                message: format!("无行情: {}", request.symbol),
            })
    }
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_quote(&self, symbol: &str) -> Result<f64> {
        self.lock()
            .quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::VenueError {
                code: 400,
                message: format!("无行情: {}", symbol),
            })
    }

    async fn get_margin_account(&self, symbol: &str) -> Result<MarginAccount> {
        let mut state = self.lock();
        *state
            .snapshot_call_count
            .entry(symbol.to_string())
            .or_insert(0) += 1;

        if state.failed_snapshots.contains(symbol) {
            return Err(EngineError::VenueError {
                code: 503,
                message: format!("快照查询失败: {}", symbol),
            });
        }

        Ok(state.accounts.get(symbol).cloned().unwrap_or(MarginAccount {
            symbol: symbol.to_string(),
            collateral: 0.0,
            borrowed: 0.0,
            unrealized_pnl: 0.0,
            refreshed_at: Utc::now(),
        }))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrderAck> {
        let (delay_ms, ack_timeout) = {
            let state = self.lock();
            (state.order_delay_ms, state.order_ack_timeout_but_execute)
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let ack = {
            let mut state = self.lock();

            if let Some(reason) = state.reject_orders.clone() {
                return Err(EngineError::VenueRejected(reason));
            }

            let price = Self::fill_price(&state, request)?;
            state.order_seq += 1;
            let venue_order_id = format!("PV-{}", state.order_seq);

            let filled = if state.hold_fills { 0.0 } else { request.quantity };
            let order = PaperOrder {
                venue_order_id: venue_order_id.clone(),
                cumulative_filled: filled,
                avg_fill_price: if filled > 0.0 { Some(price) } else { None },
                is_open: filled < request.quantity,
            };

            state.orders.insert(venue_order_id.clone(), order.clone());
            if let Some(client_id) = &request.client_order_id {
                state.orders.insert(client_id.clone(), order);
            }

            VenueOrderAck {
                venue_order_id,
                filled_quantity: filled,
                avg_fill_price: if filled > 0.0 { Some(price) } else { None },
            }
        };

        if ack_timeout {
            // 订单已落账成交，但回执迟迟不返回，迫使调用方走对账路径
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Ok(ack)
    }

    async fn cancel_order(&self, order_ref: &str, _symbol: &str) -> Result<()> {
        let mut state = self.lock();
        match state.orders.get_mut(order_ref) {
            Some(order) => {
                order.is_open = false;
                Ok(())
            }
            None => Err(EngineError::OrderNotFound(order_ref.to_string())),
        }
    }

    async fn get_order_state(&self, order_ref: &str, _symbol: &str) -> Result<VenueOrderState> {
        let delay_ms = self.lock().order_delay_ms;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let state = self.lock();
        state
            .orders
            .get(order_ref)
            .map(|order| VenueOrderState {
                venue_order_id: order.venue_order_id.clone(),
                cumulative_filled: order.cumulative_filled,
                avg_fill_price: order.avg_fill_price,
                is_open: order.is_open,
            })
            .ok_or_else(|| EngineError::OrderNotFound(order_ref.to_string()))
    }

    async fn execute_transfer(
        &self,
        transfer_id: &str,
        symbol: &str,
        asset: &str,
        amount: f64,
        direction: TransferDirection,
    ) -> Result<String> {
        let (delay_ms, ack_timeout) = {
            let mut state = self.lock();
            state.transfer_call_count += 1;
            (
                state.transfer_delay_ms,
                state.transfer_ack_timeout_but_execute,
            )
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let txid = {
            let mut state = self.lock();

            if state.transient_transfer_failures > 0 {
                state.transient_transfer_failures -= 1;
                return Err(EngineError::VenueError {
                    code: 503,
                    message: "服务暂时不可用".to_string(),
                });
            }
            if let Some(reason) = state.fail_transfers.clone() {
                state
                    .transfer_states
                    .insert(transfer_id.to_string(), TransferStatus::Failed);
                return Err(EngineError::VenueError {
                    code: 400,
                    message: reason,
                });
            }
            if let Some((successes, reason)) = state.fail_transfers_after.clone() {
                if state.transfer_call_count > successes {
                    state
                        .transfer_states
                        .insert(transfer_id.to_string(), TransferStatus::Failed);
                    return Err(EngineError::VenueError {
                        code: 400,
                        message: reason,
                    });
                }
            }

            // 划转即时生效: 调整对应交易对的担保资产
            let account = state
                .accounts
                .entry(symbol.to_string())
                .or_insert(MarginAccount {
                    symbol: symbol.to_string(),
                    collateral: 0.0,
                    borrowed: 0.0,
                    unrealized_pnl: 0.0,
                    refreshed_at: Utc::now(),
                });
            match direction {
                TransferDirection::ToMargin => account.collateral += amount,
                TransferDirection::FromMargin => account.collateral -= amount,
            }
            account.refreshed_at = Utc::now();

            state.transfer_seq += 1;
            state
                .transfer_states
                .insert(transfer_id.to_string(), TransferStatus::Completed);
            let _ = asset;
            format!("PT-{}", state.transfer_seq)
        };

        if ack_timeout {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Ok(txid)
    }

    async fn get_transfer_state(&self, transfer_id: &str) -> Result<TransferStatus> {
        let delay_ms = self.lock().transfer_delay_ms;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        self.lock()
            .transfer_states
            .get(transfer_id)
            .copied()
            .ok_or_else(|| EngineError::Other(format!("划转流水不存在: {}", transfer_id)))
    }
}
