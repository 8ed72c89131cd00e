//! 统一日志初始化模块
//! 控制台 + 按日滚动文件输出

use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use std::path::Path;
use std::str::FromStr;

/// 初始化全局日志
///
/// level 取值: TRACE/DEBUG/INFO/WARN/ERROR，非法值回退到INFO
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    if !Path::new(log_dir).exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let pattern = "[{d(%Y-%m-%d %H:%M:%S%.3f)}] [{l}] [{M}] {m}{n}";

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(format!(
            "{}/rustmargin_{}.log",
            log_dir,
            chrono::Local::now().format("%Y%m%d")
        ))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(level),
        )?;

    log4rs::init_config(config)?;
    Ok(())
}
