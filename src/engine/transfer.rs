//! 资金划转协调模块
//!
//! 在现货钱包和逐仓保证金钱包之间移动担保资产。
//! 对调用方呈现同步到终态的语义：返回时划转一定是 Completed 或 Failed，
//! 绝不把 Pending 留给调用方。

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::error::EngineError;
use crate::core::types::{Result, Transfer, TransferDirection, TransferStatus};
use crate::core::venue::{call_with_timeout, VenueAdapter};
use crate::utils::ids::IdGenerator;

/// 划转协调器
///
/// 每次调用无跨仓锁，协调器本身只持有审计记录。
pub struct TransferCoordinator {
    venue: Arc<dyn VenueAdapter>,
    timeout_ms: u64,
    ids: IdGenerator,
    /// 审计记录，终态后不再修改
    history: RwLock<Vec<Transfer>>,
}

impl TransferCoordinator {
    pub fn new(venue: Arc<dyn VenueAdapter>, timeout_ms: u64) -> Self {
        Self {
            venue,
            timeout_ms,
            ids: IdGenerator::new("TRF"),
            history: RwLock::new(Vec::new()),
        }
    }

    /// 现货 -> 逐仓保证金
    pub async fn transfer_to_margin(
        &self,
        symbol: &str,
        asset: &str,
        amount: f64,
    ) -> Result<Transfer> {
        self.execute(symbol, asset, amount, TransferDirection::ToMargin)
            .await
    }

    /// 逐仓保证金 -> 现货
    pub async fn transfer_from_margin(
        &self,
        symbol: &str,
        asset: &str,
        amount: f64,
    ) -> Result<Transfer> {
        self.execute(symbol, asset, amount, TransferDirection::FromMargin)
            .await
    }

    async fn execute(
        &self,
        symbol: &str,
        asset: &str,
        amount: f64,
        direction: TransferDirection,
    ) -> Result<Transfer> {
        // 校验失败不触达交易所
        if amount <= 0.0 {
            return Err(EngineError::InvalidAmount(amount));
        }

        let mut transfer = Transfer {
            id: self.ids.generate(),
            venue_transaction_id: None,
            symbol: symbol.to_string(),
            asset: asset.to_string(),
            amount,
            direction,
            status: TransferStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
        };

        log::info!(
            "发起划转 {}: {} {} {} ({})",
            transfer.id,
            amount,
            asset,
            direction,
            symbol
        );

        let mut outcome = self.call_venue(&transfer.id, symbol, asset, amount, direction).await;

        // 明确的临时性失败允许重试一次；超时结果未知，绝不盲目重试以免重复划转
        if let Err(e) = &outcome {
            if e.is_retryable() && !matches!(e, EngineError::TimeoutError { .. }) {
                log::warn!("划转 {} 遇到临时错误, 重试一次: {}", transfer.id, e);
                outcome = self.call_venue(&transfer.id, symbol, asset, amount, direction).await;
            }
        }

        match outcome {
            Ok(txid) => {
                transfer.venue_transaction_id = Some(txid);
                transfer.status = TransferStatus::Completed;
                log::info!("✅ 划转完成 {}", transfer.id);
                self.record(transfer.clone()).await;
                Ok(transfer)
            }
            Err(EngineError::TimeoutError { .. }) => {
                // 超时不等于失败，先按引擎侧ID对账一次再定结论
                log::warn!("划转 {} 超时, 开始对账查询", transfer.id);
                self.reconcile_after_timeout(transfer).await
            }
            Err(e) => {
                transfer.status = TransferStatus::Failed;
                transfer.error_message = Some(e.to_string());
                log::error!("❌ 划转 {} 失败: {}", transfer.id, e);
                self.record(transfer.clone()).await;
                Ok(transfer)
            }
        }
    }

    /// 划转超时后的对账
    async fn reconcile_after_timeout(&self, mut transfer: Transfer) -> Result<Transfer> {
        let state = call_with_timeout(
            "get_transfer_state",
            self.timeout_ms,
            self.venue.get_transfer_state(&transfer.id),
        )
        .await;

        match state {
            Ok(TransferStatus::Completed) => {
                transfer.status = TransferStatus::Completed;
                log::info!("✅ 划转 {} 对账确认已完成", transfer.id);
                self.record(transfer.clone()).await;
                Ok(transfer)
            }
            Ok(TransferStatus::Failed) => {
                transfer.status = TransferStatus::Failed;
                transfer.error_message = Some("对账确认交易所侧失败".to_string());
                self.record(transfer.clone()).await;
                Ok(transfer)
            }
            Ok(TransferStatus::Pending) | Err(_) => {
                // 对账无法给出终态，按资金未移动落Failed，
                // 同时向上抛结果不明，提示人工核对交易所流水。
                transfer.status = TransferStatus::Failed;
                transfer.error_message = Some("超时且对账未能确认实际结果".to_string());
                log::error!("❌ 划转 {} 超时, 结果不明, 需要人工核对", transfer.id);
                self.record(transfer.clone()).await;
                Err(EngineError::AmbiguousOutcome {
                    operation: "execute_transfer".to_string(),
                    detail: format!("划转 {} 超时, 交易所实际结果未知", transfer.id),
                })
            }
        }
    }

    async fn call_venue(
        &self,
        transfer_id: &str,
        symbol: &str,
        asset: &str,
        amount: f64,
        direction: TransferDirection,
    ) -> Result<String> {
        call_with_timeout(
            "execute_transfer",
            self.timeout_ms,
            self.venue
                .execute_transfer(transfer_id, symbol, asset, amount, direction),
        )
        .await
    }

    async fn record(&self, transfer: Transfer) {
        self.history.write().await.push(transfer);
    }

    /// 划转审计记录
    pub async fn history(&self) -> Vec<Transfer> {
        self.history.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::paper::PaperVenue;

    fn coordinator() -> (Arc<PaperVenue>, TransferCoordinator) {
        let venue = Arc::new(PaperVenue::new());
        let coordinator = TransferCoordinator::new(venue.clone(), 1000);
        (venue, coordinator)
    }

    #[tokio::test]
    async fn test_zero_amount_rejected_without_venue_call() {
        let (venue, coordinator) = coordinator();
        let result = coordinator
            .transfer_to_margin("BTCUSDC", "USDC", 0.0)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
        // 交易所从未被调用
        assert_eq!(venue.transfer_call_count(), 0);
        assert!(coordinator.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_transfer_reaches_completed() {
        let (venue, coordinator) = coordinator();
        let transfer = coordinator
            .transfer_to_margin("BTCUSDC", "USDC", 500.0)
            .await
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);
        assert!(transfer.venue_transaction_id.is_some());
        assert_eq!(venue.transfer_call_count(), 1);
        assert_eq!(coordinator.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_venue_failure_marks_failed_no_auto_retry() {
        let (venue, coordinator) = coordinator();
        venue.fail_transfers("余额不足");
        let transfer = coordinator
            .transfer_from_margin("BTCUSDC", "USDC", 100.0)
            .await
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Failed);
        assert!(transfer.error_message.is_some());
        // 非临时性错误不重试
        assert_eq!(venue.transfer_call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let (venue, coordinator) = coordinator();
        // 第一次返回503, 之后恢复
        venue.fail_transfers_transiently(1);
        let transfer = coordinator
            .transfer_to_margin("BTCUSDC", "USDC", 100.0)
            .await
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);
        assert_eq!(venue.transfer_call_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_with_failed_reconciliation_is_ambiguous() {
        let (venue, _) = coordinator();
        // 划转和对账查询都超时
        venue.delay_transfers_ms(200);
        let coordinator = TransferCoordinator::new(venue.clone(), 20);
        let result = coordinator
            .transfer_to_margin("BTCUSDC", "USDC", 100.0)
            .await;
        assert!(matches!(result, Err(EngineError::AmbiguousOutcome { .. })));
        // 超时不盲目重试
        assert_eq!(venue.transfer_call_count(), 1);
        // 审计记录按Failed落账(资金视为未移动)
        let history = coordinator.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransferStatus::Failed);
    }

    #[tokio::test]
    async fn test_timeout_reconciliation_confirms_completed() {
        let (venue, _) = coordinator();
        // 调用超时但划转实际已在交易所完成
        venue.timeout_transfer_ack_but_execute();
        let coordinator = TransferCoordinator::new(venue.clone(), 50);
        let transfer = coordinator
            .transfer_to_margin("BTCUSDC", "USDC", 100.0)
            .await
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);
    }
}
