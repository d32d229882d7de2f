pub mod entities;
pub mod executor;
pub mod health;
pub mod metadata;
pub mod repositories;
pub mod state_machine;

// SQLx 类型转换
mod sqlx_impls;

pub use entities::*;
pub use executor::*;
pub use health::*;
pub use metadata::*;
pub use repositories::*;
pub use scene_core::{SceneError, SceneResult};
pub use state_machine::*;
