use std::{future::Future, num::NonZeroUsize};

use tokio::task::{JoinError, JoinSet};

/// Default number of futures kept in flight by [`join_bounded`].
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Drives every future of `iterable` on a [`JoinSet`] with at most
/// `capacity` spawned at once. A slot is refilled as soon as one completes,
/// so queued futures start in iteration order.
///
/// Outputs are folded in completion order. A task that fails to join
/// (panic or cancellation) is handed to `on_join_err` and skipped; it never
/// aborts the remaining futures.
pub async fn join_bounded<Iterable, Output, Accumulator, FoldWith, OnJoinErr>(
    iterable: Iterable,
    capacity: NonZeroUsize,
    mut accumulator: Accumulator,
    mut fold_with: FoldWith,
    mut on_join_err: OnJoinErr,
) -> Accumulator
where
    Iterable: IntoIterator,
    Iterable::Item: Future<Output = Output> + Send + 'static,
    Output: Send + 'static,
    FoldWith: FnMut(Accumulator, Output) -> Accumulator,
    OnJoinErr: FnMut(JoinError),
{
    let mut iter = iterable.into_iter().fuse();
    let mut set: JoinSet<Output> = (&mut iter).take(capacity.get()).collect();

    while let Some(result) = set.join_next().await {
        match result {
            Ok(output) => accumulator = fold_with(accumulator, output),
            Err(error) => on_join_err(error),
        }

        if let Some(future) = iter.next() {
            set.spawn(future);
        }
    }

    accumulator
}
