pub mod entities;
pub mod repositories;
pub mod value_objects;

pub use aijob_core::{OrchestratorError, OrchestratorResult};
pub use entities::*;
pub use repositories::*;
pub use value_objects::*;
