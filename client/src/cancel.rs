//! Composition of independent cancellation sources into one derived signal.

use futures_util::future::select_all;
use tokio_util::sync::CancellationToken;

/// Merge any number of cancellation tokens into one derived token.
///
/// The derived token fires the first time any source fires and stays fired;
/// sources are never mutated, so their other listeners are unaffected. A
/// source that is already cancelled at composition time cancels the derived
/// token synchronously before this function returns.
///
/// With zero sources the derived token never fires on its own; the caller
/// still holds the handle and may cancel it directly.
#[must_use]
pub fn merge_cancellations<I>(sources: I) -> CancellationToken
where
    I: IntoIterator<Item = CancellationToken>,
{
    let merged = CancellationToken::new();
    let mut pending = Vec::new();
    for source in sources {
        if source.is_cancelled() {
            merged.cancel();
            return merged;
        }
        pending.push(Box::pin(source.cancelled_owned()));
    }
    if !pending.is_empty() {
        let derived = merged.clone();
        tokio::spawn(async move {
            // Resolves as soon as the first source fires; the rest are
            // dropped with their futures.
            select_all(pending).await;
            derived.cancel();
        });
    }
    merged
}
