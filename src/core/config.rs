use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;

/// 引擎全局配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置的内部一致性
    pub fn validate(&self) -> Result<(), EngineError> {
        let m = &self.monitor;
        if m.liquidation_risk_level >= m.critical_level || m.critical_level >= m.warning_level {
            return Err(EngineError::ConfigError(format!(
                "保证金阈值必须严格递减: warning({}) > critical({}) > liquidation_risk({})",
                m.warning_level, m.critical_level, m.liquidation_risk_level
            )));
        }
        if m.interval_secs == 0 {
            return Err(EngineError::ConfigError("监控间隔必须大于0秒".to_string()));
        }
        if self.sizing.max_risk_fraction <= 0.0 || self.sizing.max_risk_fraction > 1.0 {
            return Err(EngineError::ConfigError(
                "max_risk_fraction 必须在 (0, 1] 区间内".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            sizing: SizingConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// 交易所调用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// 单次交易所调用超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

/// 仓位计算默认配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// 单笔交易最大风险比例（占净值）
    pub max_risk_fraction: f64,
    /// 单笔仓位市值上限（占净值比例）
    pub max_position_fraction: f64,
    /// 默认杠杆
    pub default_leverage: u32,
    /// 最大允许杠杆
    pub max_leverage: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            max_risk_fraction: 0.01,    // 经典1%风险规则
            max_position_fraction: 0.5, // 单仓不超过净值50%
            default_leverage: 3,
            max_leverage: 10,
        }
    }
}

/// 保证金监控配置
///
/// 三级阈值是配置面，不是常量；强制平仓是策略开关。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 轮询间隔（秒）
    pub interval_secs: u64,
    /// WARNING 级别保证金率阈值
    pub warning_level: f64,
    /// CRITICAL 级别保证金率阈值
    pub critical_level: f64,
    /// LIQUIDATION_RISK 级别保证金率阈值
    pub liquidation_risk_level: f64,
    /// 低于 liquidation_risk_level 时是否自动强制平仓
    pub auto_close_on_liquidation_risk: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            warning_level: 1.3,
            critical_level: 1.1,
            liquidation_risk_level: 1.05,
            auto_close_on_liquidation_risk: false,
        }
    }
}
