use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 保证金交易引擎相关的数据结构
use serde::{Deserialize, Serialize};

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::EngineError>;

/// 持仓方向
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// 开仓对应的订单方向
    pub fn opening_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// 平仓(减仓)对应的订单方向
    pub fn closing_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
}

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// 终态订单不再接受任何状态变更
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

// ============= 订单相关 =============

/// 订单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            reduce_only: false,
            client_order_id: None,
        }
    }
}

/// 订单
///
/// 订单只会被成交/撤销/拒绝事件修改状态，从不删除（保留审计记录）。
/// 不变量: 0 <= filled_quantity <= quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub venue_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub filled_quantity: f64,
    /// 成交量加权均价，未成交时为None
    pub avg_fill_price: Option<f64>,
    pub price: Option<f64>,
    pub status: OrderStatus,
    pub reduce_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining_quantity(&self) -> f64 {
        (self.quantity - self.filled_quantity).max(0.0)
    }
}

/// 成交回报（来自交易所，累计口径）
///
/// cumulative_filled 为该订单的累计成交量，交易所可能重复或乱序推送，
/// 引擎侧按累计量做幂等去重。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillReport {
    pub order_id: String,
    pub cumulative_filled: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

// ============= 持仓相关 =============

/// 持仓状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    PartiallyClosed,
    Closed,
}

/// 逐仓杠杆持仓
///
/// 不变量:
/// - remaining_quantity <= quantity
/// - remaining_quantity == 0 当且仅当 status == Closed
/// - Long 止损必须低于入场价，Short 止损必须高于入场价
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    /// 成交量加权平均入场价
    pub entry_price: f64,
    pub quantity: f64,
    pub remaining_quantity: f64,
    pub stop_price: f64,
    pub take_profit_price: Option<f64>,
    pub leverage: u32,
    /// 担保资产，如 USDC
    pub collateral_asset: String,
    pub status: PositionStatus,
    /// 开仓订单ID（每个开仓订单至多物化一个持仓）
    pub funding_order_id: String,
    pub close_order_ids: Vec<String>,
    pub margin_allocated: f64,
    pub realized_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// 止损距离（恒为正）
    pub fn stop_distance(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }

    /// 按给定价格计算未实现盈亏（派生值，不持久化）
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (current_price - self.entry_price) * self.remaining_quantity,
            PositionSide::Short => (self.entry_price - current_price) * self.remaining_quantity,
        }
    }
}

/// 持仓查询过滤条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionFilter {
    pub symbol: Option<String>,
    pub status: Option<PositionStatus>,
    pub side: Option<PositionSide>,
}

impl PositionFilter {
    pub fn matches(&self, position: &Position) -> bool {
        if let Some(symbol) = &self.symbol {
            if &position.symbol != symbol {
                return false;
            }
        }
        if let Some(status) = self.status {
            if position.status != status {
                return false;
            }
        }
        if let Some(side) = self.side {
            if position.side != side {
                return false;
            }
        }
        true
    }
}

// ============= 保证金账户 =============

/// 逐仓保证金账户快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginAccount {
    pub symbol: String,
    /// 担保资产余额（计价币）
    pub collateral: f64,
    /// 借入金额
    pub borrowed: f64,
    /// 未实现盈亏
    pub unrealized_pnl: f64,
    pub refreshed_at: DateTime<Utc>,
}

impl MarginAccount {
    /// 保证金率 = (担保资产 + 未实现盈亏) / 借入金额
    ///
    /// 无借款时返回999（交易所惯例，表示绝对安全）
    pub fn margin_level(&self) -> f64 {
        if self.borrowed <= 0.0 {
            return 999.0;
        }
        (self.collateral + self.unrealized_pnl) / self.borrowed
    }

    /// 保证金健康度分级
    pub fn health(&self) -> MarginHealth {
        MarginHealth::classify(self.margin_level())
    }
}

/// 保证金健康度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginHealth {
    Safe,
    Caution,
    Warning,
    Critical,
    Danger,
}

impl MarginHealth {
    pub fn classify(margin_level: f64) -> Self {
        if margin_level >= 2.0 {
            MarginHealth::Safe
        } else if margin_level >= 1.5 {
            MarginHealth::Caution
        } else if margin_level >= 1.3 {
            MarginHealth::Warning
        } else if margin_level >= 1.1 {
            MarginHealth::Critical
        } else {
            MarginHealth::Danger
        }
    }
}

impl std::fmt::Display for MarginHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            MarginHealth::Safe => "SAFE",
            MarginHealth::Caution => "CAUTION",
            MarginHealth::Warning => "WARNING",
            MarginHealth::Critical => "CRITICAL",
            MarginHealth::Danger => "DANGER",
        };
        write!(f, "{}", s)
    }
}

// ============= 资金划转 =============

/// 划转方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    /// 现货 -> 逐仓保证金
    ToMargin,
    /// 逐仓保证金 -> 现货
    FromMargin,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransferDirection::ToMargin => write!(f, "现货→保证金"),
            TransferDirection::FromMargin => write!(f, "保证金→现货"),
        }
    }
}

/// 划转状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

/// 资金划转记录（审计用，终态后不再修改）
///
/// 划转不存在部分成功：要么交易所确认全额到账(Completed)，
/// 要么标记Failed并认为资金未移动。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub venue_transaction_id: Option<String>,
    pub symbol: String,
    pub asset: String,
    pub amount: f64,
    pub direction: TransferDirection,
    pub status: TransferStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============= 风险告警 =============

/// 告警级别（监控器三级阈值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
    LiquidationRisk,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::LiquidationRisk => "LIQUIDATION_RISK",
        };
        write!(f, "{}", s)
    }
}

/// 风险告警（一次写入，交给外部通知渠道消费，从不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub position_id: String,
    pub symbol: String,
    pub severity: AlertSeverity,
    /// 触发告警时的保证金率
    pub margin_level: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
