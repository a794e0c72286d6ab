pub use self::{database::DatabasePool, http::HTTP, sources::SourceKind};

mod database;
mod http;
pub mod sources;
