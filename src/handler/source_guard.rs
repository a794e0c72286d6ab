use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::{model::Position, provider::sources::Adapter};

/// Runs one adapter and absorbs every failure, panics included, into an
/// empty contribution.
pub async fn guarded_fetch(adapter: Arc<dyn Adapter>) -> Vec<Position> {
    let name = adapter.name().to_owned();

    match AssertUnwindSafe(adapter.fetch_positions())
        .catch_unwind()
        .await
    {
        Ok(Ok(positions)) => {
            debug!(source = %name, "Fetched {} position(s)", positions.len());
            positions
        },
        Ok(Err(e)) => {
            warn!(source = %name, "Source failed, no positions this cycle: {}", e);
            vec![]
        },
        Err(_) => {
            warn!(source = %name, "Source panicked, no positions this cycle");
            vec![]
        },
    }
}
