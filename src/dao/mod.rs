mod filter;
mod memory;
mod postgre;
mod store;

pub use self::{
    filter::{PositionFilter, SortBy, SortOrder, DEFAULT_LIMIT, MAX_LIMIT},
    memory::MemoryStore,
    postgre::{DataBase, PoolOption, PoolType},
    store::{PositionStore, UpsertReport},
};
