use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("止损距离无效: 入场价 {entry} 止损价 {stop}")]
    InvalidStopDistance { entry: f64, stop: f64 },

    #[error("止损方向错误: {side} 仓位的止损必须在入场价的亏损侧 (入场: {entry}, 止损: {stop})")]
    StopOnWrongSide {
        side: crate::core::types::PositionSide,
        entry: f64,
        stop: f64,
    },

    #[error("数量低于最小下单量: 计算值 {quantity}, 最小 {min_qty}")]
    BelowMinimumLot { quantity: f64, min_qty: f64 },

    #[error("数量超过最大下单量: 计算值 {quantity}, 最大 {max_qty}")]
    AboveMaximumLot { quantity: f64, max_qty: f64 },

    #[error("划转金额无效: {0}")]
    InvalidAmount(f64),

    #[error("交易所错误: {code} - {message}")]
    VenueError { code: i32, message: String },

    #[error("订单被交易所拒绝: {0}")]
    VenueRejected(String),

    #[error("划转失败: {transfer_id} - {reason}")]
    TransferFailed { transfer_id: String, reason: String },

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_ms}毫秒)")]
    TimeoutError { operation: String, timeout_ms: u64 },

    #[error("结果不明: 操作 '{operation}' 超时且对账未能确认实际结果，需要人工核对 - {detail}")]
    AmbiguousOutcome { operation: String, detail: String },

    #[error("订单已处于终态: {order_id} ({status:?})")]
    OrderAlreadyTerminal {
        order_id: String,
        status: crate::core::types::OrderStatus,
    },

    #[error("订单未找到: {0}")]
    OrderNotFound(String),

    #[error("持仓未找到: {0}")]
    PositionNotFound(String),

    #[error("持仓已平仓: {0}")]
    PositionAlreadyClosed(String),

    #[error("需要人工补偿操作: {failed_step} 失败，此前已完成的划转 {transfer_id} 不会自动回转 - {reason}")]
    CompensationRequired {
        failed_step: String,
        transfer_id: String,
        reason: String,
    },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("其他错误: {0}")]
    Other(String),
}

/// 错误分类（对应错误处理策略）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 本地校验失败，未触达交易所，无状态变更
    Validation,
    /// 交易所侧失败（拒单、划转失败、明确超时）
    Venue,
    /// 对已终态对象的操作，被拒绝且无任何变更
    StateConflict,
    /// 超时且对账后结果仍然未知，既不按成功也不按失败处理
    Ambiguous,
    /// 配置/内部错误
    Internal,
}

impl EngineError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ValidationError { .. }
            | EngineError::InvalidStopDistance { .. }
            | EngineError::StopOnWrongSide { .. }
            | EngineError::BelowMinimumLot { .. }
            | EngineError::AboveMaximumLot { .. }
            | EngineError::InvalidAmount(_) => ErrorKind::Validation,

            EngineError::VenueError { .. }
            | EngineError::VenueRejected(_)
            | EngineError::TransferFailed { .. }
            | EngineError::TimeoutError { .. }
            | EngineError::CompensationRequired { .. } => ErrorKind::Venue,

            EngineError::OrderAlreadyTerminal { .. }
            | EngineError::PositionAlreadyClosed(_)
            | EngineError::OrderNotFound(_)
            | EngineError::PositionNotFound(_) => ErrorKind::StateConflict,

            EngineError::AmbiguousOutcome { .. } => ErrorKind::Ambiguous,

            EngineError::ConfigError(_) | EngineError::YamlError(_) | EngineError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// 判断错误是否可以重试（引擎内部最多重试一次）
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::TimeoutError { .. } => true,
            EngineError::VenueError { code, .. } => *code >= 500 && *code < 600,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OrderStatus;

    #[test]
    fn test_error_kind_classification() {
        let e = EngineError::InvalidAmount(0.0);
        assert_eq!(e.kind(), ErrorKind::Validation);

        let e = EngineError::VenueRejected("insufficient balance".to_string());
        assert_eq!(e.kind(), ErrorKind::Venue);

        let e = EngineError::OrderAlreadyTerminal {
            order_id: "o1".to_string(),
            status: OrderStatus::Filled,
        };
        assert_eq!(e.kind(), ErrorKind::StateConflict);

        let e = EngineError::AmbiguousOutcome {
            operation: "place_order".to_string(),
            detail: "对账查询同样超时".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::Ambiguous);
    }

    #[test]
    fn test_retryable() {
        assert!(EngineError::TimeoutError {
            operation: "transfer".to_string(),
            timeout_ms: 5000,
        }
        .is_retryable());

        assert!(EngineError::VenueError {
            code: 503,
            message: "service unavailable".to_string(),
        }
        .is_retryable());

        assert!(!EngineError::VenueRejected("bad lot size".to_string()).is_retryable());
        assert!(!EngineError::InvalidAmount(-1.0).is_retryable());
    }
}
