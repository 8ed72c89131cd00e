// 核心模块 - 只包含核心业务逻辑
pub mod config;
pub mod error;
pub mod notify;
pub mod types;
pub mod venue;

pub use config::*;
pub use error::*;
pub use notify::{AlertSink, LogAlertSink, MemoryAlertSink};
pub use types::{
    Alert, AlertSeverity, FillReport, MarginAccount, MarginHealth, Order, OrderRequest, OrderSide,
    OrderStatus, OrderType, Position, PositionFilter, PositionSide, PositionStatus, Transfer,
    TransferDirection, TransferStatus,
};
pub use venue::{VenueAdapter, VenueOrderAck, VenueOrderState};
