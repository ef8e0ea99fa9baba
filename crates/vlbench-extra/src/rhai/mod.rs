//! Rhai 脚本引擎集成模块
//! Rhai script engine integration module
//!
//! 合成的适配器是 Rhai 脚本：一个以 `ResponseGenerator` 结尾的构造函数
//! 返回状态值，`generate_response(question, image_path)` 以该状态为 `this` 调用。
//! A synthesized adapter is a Rhai script: a constructor whose name ends in
//! `ResponseGenerator` returns a state value, and
//! `generate_response(question, image_path)` is called with that state bound
//! to `this`. Top-level statements are never evaluated.

pub mod engine;
pub mod error;
pub mod host;

pub use engine::*;
pub use error::*;
pub use host::*;
