use crate::core::error::EngineError;
use crate::core::types::{MarginAccount, OrderRequest, Result, TransferDirection, TransferStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// 交易所下单回执
///
/// 市价单通常在回执中直接带上成交信息，限价单可能先挂起、
/// 成交回报后续通过 FillReport 推送。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderAck {
    pub venue_order_id: String,
    pub filled_quantity: f64,
    pub avg_fill_price: Option<f64>,
}

/// 交易所侧订单状态（对账查询用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderState {
    pub venue_order_id: String,
    pub cumulative_filled: f64,
    pub avg_fill_price: Option<f64>,
    pub is_open: bool,
}

/// 交易所通用接口trait
///
/// 引擎只通过这个窄接口接触交易所，所有调用都是带超时的同步语义。
/// 限流重试属于适配器职责，但必须向引擎给出确定的成功/失败/超时结果。
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 获取最新价格
    async fn get_quote(&self, symbol: &str) -> Result<f64>;

    /// 获取逐仓保证金账户快照
    async fn get_margin_account(&self, symbol: &str) -> Result<MarginAccount>;

    /// 下单
    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrderAck>;

    /// 撤单
    async fn cancel_order(&self, venue_order_id: &str, symbol: &str) -> Result<()>;

    /// 查询订单状态（超时后对账使用）
    ///
    /// order_ref 可以是交易所订单ID，也可以是下单时带的客户端订单ID，
    /// 下单调用超时的场景只有客户端ID可用。
    async fn get_order_state(&self, order_ref: &str, symbol: &str) -> Result<VenueOrderState>;

    /// 执行资金划转，返回交易所流水号
    ///
    /// transfer_id 为引擎侧划转ID，随请求传给交易所，
    /// 调用超时后凭它做对账查询。
    async fn execute_transfer(
        &self,
        transfer_id: &str,
        symbol: &str,
        asset: &str,
        amount: f64,
        direction: TransferDirection,
    ) -> Result<String>;

    /// 按引擎侧划转ID查询划转状态（超时后对账使用）
    async fn get_transfer_state(&self, transfer_id: &str) -> Result<TransferStatus>;
}

/// 给交易所调用加超时边界
///
/// 超时一律按失败处理，绝不默认成功；调用方拿到 TimeoutError 后
/// 需要通过对账查询决定本地状态。
pub async fn call_with_timeout<T, F>(operation: &str, timeout_ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::TimeoutError {
            operation: operation.to_string(),
            timeout_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_with_timeout_passthrough() {
        let result: Result<i32> = call_with_timeout("fast_op", 1000, async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_call_with_timeout_expires() {
        let result: Result<i32> = call_with_timeout("slow_op", 10, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(42)
        })
        .await;

        match result {
            Err(EngineError::TimeoutError { operation, .. }) => assert_eq!(operation, "slow_op"),
            other => panic!("预期超时错误, 实际: {:?}", other),
        }
    }
}
