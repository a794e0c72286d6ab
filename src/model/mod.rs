//! Domain and database models
//!
//! The canonical [`Position`] shape lives in position.rs; database entity
//! structs are consolidated in models.rs.

mod models;
mod position;
mod table;

pub use models::*;
pub use position::{ChainId, Position, RiskLevel};
pub use table::Table;
