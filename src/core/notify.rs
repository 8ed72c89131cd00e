//! 告警通知接口
//! 监控器产出的告警通过该接口交给外部通知渠道（UI推送、webhook等）

use crate::core::types::{Alert, AlertSeverity};
use async_trait::async_trait;
use std::sync::Mutex;

/// 通知渠道trait，具体实现在组装时注入
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: &Alert);
}

/// 默认实现：写入日志
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn publish(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Warning => log::warn!(
                "⚠️ [{}] {} 保证金率 {:.4}: {}",
                alert.severity,
                alert.symbol,
                alert.margin_level,
                alert.message
            ),
            AlertSeverity::Critical | AlertSeverity::LiquidationRisk => log::error!(
                "🚨 [{}] {} 保证金率 {:.4}: {}",
                alert.severity,
                alert.symbol,
                alert.margin_level,
                alert.message
            ),
        }
    }
}

/// 内存通知渠道：缓存全部告警，测试和人工巡检用
#[derive(Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().expect("告警锁中毒").clone()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn publish(&self, alert: &Alert) {
        self.alerts.lock().expect("告警锁中毒").push(alert.clone());
    }
}
