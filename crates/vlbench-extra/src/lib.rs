//! vlbench Extra 模块
//! vlbench Extra Module
//!
//! 提供合成适配器所需的脚本运行时：
//! Provides the script runtime synthesized adapters run on:
//! - Rhai 脚本引擎与安全限制
//! - Rhai script engine with security limits
//! - 受控的宿主函数（HTTP、图像读取、环境变量）
//! - Gated host functions (HTTP, image reading, environment variables)

#[cfg(feature = "rhai-scripting")]
pub mod rhai;

#[cfg(feature = "rhai-scripting")]
pub use rhai::*;
