pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

pub fn scan() -> LogCtx<ops::scan::Scan> { LogCtx::new(config::logs_are_json()) }
pub fn extract() -> LogCtx<ops::extract::Extract> { LogCtx::new(config::logs_are_json()) }
