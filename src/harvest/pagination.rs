//! Lazy walking of cursor-paginated collections.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};

use super::batch_client::BatchClient;
use super::error::HarvestError;
use crate::catalog::{Cursor, Page, PlaylistItem};

struct WalkState<F> {
    fetch: F,
    next: Option<Cursor>,
    visited: HashSet<Cursor>,
    done: bool,
}

/// Walk a paginated collection, yielding its items in order.
///
/// Pages are fetched on demand, each at most once. The walk ends right after
/// the page whose `next` is `None`; an empty page with a cursor does not end
/// it. A fetch failure is yielded as an error, and so is a cursor that was
/// already followed.
pub fn walk_pages<T, F, Fut>(
    collection_id: String,
    fetch: F,
) -> impl Stream<Item = Result<T, HarvestError>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>, HarvestError>>,
{
    let state = WalkState {
        fetch,
        next: None,
        visited: HashSet::new(),
        done: false,
    };

    stream::try_unfold(state, move |mut state| {
        let collection_id = collection_id.clone();
        async move {
            if state.done {
                return Ok(None);
            }

            let page = (state.fetch)(state.next.take()).await?;
            match page.next {
                None => state.done = true,
                Some(next) => {
                    if !state.visited.insert(next.clone()) {
                        return Err(HarvestError::PageFetchFailed {
                            playlist_id: collection_id,
                            cursor: Some(next),
                            attempts: 1,
                            reason: "pagination cursor did not advance".to_string(),
                        });
                    }
                    state.next = Some(next);
                }
            }

            let items = stream::iter(page.items.into_iter().map(Ok::<T, HarvestError>));
            Ok::<_, HarvestError>(Some((items, state)))
        }
    })
    .try_flatten()
}

/// Every item of a playlist, fetched through the batch client.
pub fn playlist_items<'a>(
    client: &'a BatchClient,
    playlist_id: &'a str,
) -> impl Stream<Item = Result<PlaylistItem, HarvestError>> + 'a {
    walk_pages(playlist_id.to_string(), move |cursor| {
        client.fetch_page(playlist_id, cursor)
    })
}
