// 引擎编排模块 - 仓位计算/订单/划转/持仓/监控/服务门面
pub mod monitor;
pub mod orders;
pub mod positions;
pub mod service;
pub mod sizing;
pub mod transfer;

pub use monitor::MarginMonitor;
pub use orders::{FillDelta, OrderTracker};
pub use positions::{close_reason, OpenPositionRequest, PositionManager};
pub use service::MarginService;
pub use sizing::{LotConstraints, RiskParameters, SizingResult};
pub use transfer::TransferCoordinator;
