//! 仓位计算模块
//!
//! 核心是经典的固定比例风险规则:
//!     风险金额 = 净值 × 风险比例
//!     数量 = 风险金额 / |入场价 - 止损价|
//! 杠杆不放大风险推导出的数量，只降低占用的保证金
//! (margin_required = 市值 / 杠杆)。
//! 纯函数，无副作用，相同输入必得相同输出。

use crate::core::config::SizingConfig;
use crate::core::error::EngineError;
use crate::core::types::{PositionSide, Result};
use serde::{Deserialize, Serialize};

/// 交易所下单量约束
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotConstraints {
    /// 数量步长
    pub step: f64,
    /// 最小下单量
    pub min_qty: f64,
    /// 最大下单量
    pub max_qty: f64,
}

impl Default for LotConstraints {
    fn default() -> Self {
        Self {
            step: 0.000001,
            min_qty: 0.000001,
            max_qty: 9_000_000.0,
        }
    }
}

/// 仓位计算输入（不可变，每次请求重新构造）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    /// 账户净值（计价币）
    pub equity: f64,
    /// 单笔风险比例，(0, 1]
    pub risk_fraction: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub side: PositionSide,
    /// 杠杆倍数，>= 1
    pub leverage: u32,
    /// 单仓市值上限（占净值×杠杆的比例）
    pub max_position_fraction: f64,
    pub lot: LotConstraints,
}

impl RiskParameters {
    pub fn with_defaults(
        equity: f64,
        entry_price: f64,
        stop_price: f64,
        side: PositionSide,
        defaults: &SizingConfig,
    ) -> Self {
        Self {
            equity,
            risk_fraction: defaults.max_risk_fraction,
            entry_price,
            stop_price,
            side,
            leverage: defaults.default_leverage,
            max_position_fraction: defaults.max_position_fraction,
            lot: LotConstraints::default(),
        }
    }
}

/// 仓位计算结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingResult {
    /// 下单数量（已按步长向下取整）
    pub quantity: f64,
    /// 仓位市值 = quantity × entry_price
    pub position_value: f64,
    /// 占用保证金 = position_value / leverage
    pub margin_required: f64,
    /// 止损触发时的实际亏损金额
    pub risk_amount: f64,
    /// 实际风险占净值百分比
    pub risk_percent: f64,
    pub stop_distance: f64,
    pub stop_distance_percent: f64,
    /// 是否被市值上限压缩过
    pub is_capped: bool,
}

/// 按步长向下取整
///
/// 加一个极小量抵消浮点除法误差，避免 50/0.001 之类的结果被错误地少取一档。
fn round_down_to_step(quantity: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return quantity;
    }
    ((quantity / step) + 1e-9).floor() * step
}

/// 计算仓位大小
pub fn size(params: &RiskParameters) -> Result<SizingResult> {
    // ===== 输入校验，失败不触达交易所 =====
    if params.equity <= 0.0 {
        return Err(EngineError::ValidationError {
            field: "equity".to_string(),
            reason: "净值必须为正".to_string(),
        });
    }
    if params.risk_fraction <= 0.0 || params.risk_fraction > 1.0 {
        return Err(EngineError::ValidationError {
            field: "risk_fraction".to_string(),
            reason: format!("风险比例必须在(0, 1]区间内: {}", params.risk_fraction),
        });
    }
    if params.entry_price <= 0.0 || params.stop_price <= 0.0 {
        return Err(EngineError::ValidationError {
            field: "price".to_string(),
            reason: "入场价和止损价必须为正".to_string(),
        });
    }
    if params.leverage < 1 {
        return Err(EngineError::ValidationError {
            field: "leverage".to_string(),
            reason: format!("杠杆必须 >= 1: {}", params.leverage),
        });
    }
    if params.max_position_fraction <= 0.0 || params.max_position_fraction > 1.0 {
        return Err(EngineError::ValidationError {
            field: "max_position_fraction".to_string(),
            reason: format!("仓位上限比例必须在(0, 1]区间内: {}", params.max_position_fraction),
        });
    }

    // 止损必须在入场价的亏损侧，方向错误直接拒绝，绝不静默交换
    let wrong_side = match params.side {
        PositionSide::Long => params.stop_price >= params.entry_price,
        PositionSide::Short => params.stop_price <= params.entry_price,
    };
    if wrong_side {
        return Err(EngineError::StopOnWrongSide {
            side: params.side,
            entry: params.entry_price,
            stop: params.stop_price,
        });
    }

    // ===== 风险推导数量 =====
    let risk_per_unit = (params.entry_price - params.stop_price).abs();
    if risk_per_unit <= 0.0 {
        return Err(EngineError::InvalidStopDistance {
            entry: params.entry_price,
            stop: params.stop_price,
        });
    }

    let risk_amount = params.equity * params.risk_fraction;
    let mut quantity = risk_amount / risk_per_unit;
    let mut is_capped = false;

    // 市值上限: 保证金占用不超过净值的 max_position_fraction
    let max_position_value =
        params.equity * params.max_position_fraction * params.leverage as f64;
    if quantity * params.entry_price > max_position_value {
        is_capped = true;
        quantity = max_position_value / params.entry_price;
    }

    // ===== 交易所约束 =====
    quantity = round_down_to_step(quantity, params.lot.step);

    if quantity < params.lot.min_qty {
        return Err(EngineError::BelowMinimumLot {
            quantity,
            min_qty: params.lot.min_qty,
        });
    }
    if quantity > params.lot.max_qty {
        // 调用方可以降低 risk_fraction 后重试
        return Err(EngineError::AboveMaximumLot {
            quantity,
            max_qty: params.lot.max_qty,
        });
    }

    let position_value = quantity * params.entry_price;
    let actual_risk = quantity * risk_per_unit;

    Ok(SizingResult {
        quantity,
        position_value,
        margin_required: position_value / params.leverage as f64,
        risk_amount: actual_risk,
        risk_percent: actual_risk / params.equity * 100.0,
        stop_distance: risk_per_unit,
        stop_distance_percent: risk_per_unit / params.entry_price * 100.0,
        is_capped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> RiskParameters {
        RiskParameters {
            equity: 10000.0,
            risk_fraction: 0.01,
            entry_price: 100.0,
            stop_price: 98.0,
            side: PositionSide::Long,
            leverage: 1,
            max_position_fraction: 0.5,
            lot: LotConstraints {
                step: 0.001,
                min_qty: 0.001,
                max_qty: 1_000_000.0,
            },
        }
    }

    #[test]
    fn test_basic_long_sizing() {
        // 净值10000, 风险1%, 止损距离2 => 数量50
        let result = size(&base_params()).unwrap();
        assert!((result.quantity - 50.0).abs() < 1e-9);
        assert!((result.position_value - 5000.0).abs() < 1e-6);
        assert!((result.risk_amount - 100.0).abs() < 1e-6);
        assert!((result.stop_distance - 2.0).abs() < 1e-9);
        assert!(!result.is_capped);
    }

    #[test]
    fn test_leverage_reduces_margin_not_quantity() {
        let mut params = base_params();
        params.leverage = 5;
        let result = size(&params).unwrap();
        // 数量仍由风险规则决定
        assert!((result.quantity - 50.0).abs() < 1e-9);
        assert!((result.margin_required - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_on_wrong_side_rejected() {
        let mut params = base_params();
        params.stop_price = 102.0; // Long止损高于入场价, 非法
        match size(&params) {
            Err(EngineError::StopOnWrongSide { .. }) => {}
            other => panic!("预期止损方向错误, 实际: {:?}", other),
        }

        let mut params = base_params();
        params.side = PositionSide::Short;
        params.stop_price = 98.0; // Short止损低于入场价, 非法
        assert!(matches!(
            size(&params),
            Err(EngineError::StopOnWrongSide { .. })
        ));
    }

    #[test]
    fn test_short_sizing_valid() {
        let mut params = base_params();
        params.side = PositionSide::Short;
        params.stop_price = 102.0;
        let result = size(&params).unwrap();
        assert!((result.quantity - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_stop_distance_rejected() {
        let mut params = base_params();
        params.stop_price = 100.0;
        // Long且stop==entry会先命中方向检查
        assert!(matches!(
            size(&params),
            Err(EngineError::StopOnWrongSide { .. })
        ));
    }

    #[test]
    fn test_below_minimum_lot() {
        let mut params = base_params();
        params.lot.min_qty = 100.0;
        assert!(matches!(
            size(&params),
            Err(EngineError::BelowMinimumLot { .. })
        ));
    }

    #[test]
    fn test_above_maximum_lot() {
        let mut params = base_params();
        params.lot.max_qty = 10.0;
        assert!(matches!(
            size(&params),
            Err(EngineError::AboveMaximumLot { .. })
        ));
    }

    #[test]
    fn test_position_value_cap() {
        // 止损距离很近时风险推导的仓位会超过市值上限
        let mut params = base_params();
        params.stop_price = 99.99; // 距离0.01 => 原始数量10000
        let result = size(&params).unwrap();
        assert!(result.is_capped);
        // 保证金占用不超过净值50%
        assert!(result.margin_required <= params.equity * 0.5 + 1e-6);
        // 压缩后实际风险低于请求的风险额
        assert!(result.risk_amount <= params.equity * params.risk_fraction + 1e-6);
    }

    #[test]
    fn test_quantity_is_lot_multiple_and_risk_bounded() {
        let mut params = base_params();
        params.stop_price = 97.7; // 距离2.3, 数量43.478...
        params.lot.step = 0.01;
        let result = size(&params).unwrap();

        // 数量是步长整数倍
        let steps = result.quantity / params.lot.step;
        assert!((steps - steps.round()).abs() < 1e-6);

        // 名义风险不超过 净值×风险比例（向下取整只会降低风险）
        assert!(result.risk_amount <= params.equity * params.risk_fraction + 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let params = base_params();
        let a = size(&params).unwrap();
        let b = size(&params).unwrap();
        assert_eq!(a.quantity, b.quantity);
        assert_eq!(a.risk_amount, b.risk_amount);
    }
}
