//! # Scene Testing Utils
//!
//! 各 crate 测试共用的数据构造器、脚本化执行器与仓储替身。
//!
//! ```toml
//! [dev-dependencies]
//! scene-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
