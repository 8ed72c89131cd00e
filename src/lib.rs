pub mod core;
pub mod engine;
pub mod utils;
pub mod venues;

// 选择性导出，避免命名冲突
pub use crate::core::{config::*, error::*, notify::*, venue::*};
pub use crate::core::types::{
    Alert, AlertSeverity, FillReport, MarginAccount, MarginHealth, Order, OrderRequest, OrderSide,
    OrderStatus, OrderType, Position, PositionFilter, PositionSide, PositionStatus, Transfer,
    TransferDirection, TransferStatus,
};
pub use crate::engine::*;
pub use crate::venues::PaperVenue;
