pub use self::types::{DataBase, PoolOption, PoolType};

mod action_history;
mod lp_position;
mod protocol;
mod types;
