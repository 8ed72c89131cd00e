//! 本地ID生成模块
//! 为订单/持仓/划转生成进程内唯一的可读ID

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// ID生成器
///
/// 格式: {前缀}-{UTC时间戳}-{序号}，例如 POS-20260823093015-000042
/// 时间戳保证跨进程重启大致有序，序号保证进程内唯一。
pub struct IdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn generate(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{:06}",
            self.prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            seq
        )
    }
}
