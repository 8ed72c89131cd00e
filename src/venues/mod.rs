//! 交易所适配器实现
//!
//! 引擎核心只依赖 `core::venue::VenueAdapter` trait，
//! 这里放各个具体交易所的接入实现。

pub mod paper;

pub use paper::PaperVenue;
