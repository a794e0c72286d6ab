pub use self::{
    aggregation_task::Aggregator, scheduler::Scheduler,
    source_guard::guarded_fetch,
};

mod aggregation_task;
mod scheduler;
mod source_guard;

#[cfg(test)]
pub(crate) mod fakes;
