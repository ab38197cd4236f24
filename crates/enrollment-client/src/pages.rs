//! Lazy roster pagination
//!
//! Turns page-at-a-time `list_enrolled_device_identities` calls into a single
//! finite stream of identities. Pages are fetched only as the consumer pulls,
//! so a scan that finds its match early stops requesting further pages. The
//! stream ends when a page carries no continuation link; calling
//! `enrolled_identities` again restarts from the first page.

use futures_util::stream::{self, Stream, TryStreamExt};

use crate::model::EnrolledDeviceIdentity;
use crate::{EnrollmentService, Result};

enum Cursor {
    First,
    Next(String),
    Exhausted,
}

type PageItems = stream::Iter<std::vec::IntoIter<Result<EnrolledDeviceIdentity>>>;

async fn fetch_page(
    service: &dyn EnrollmentService,
    token_id: &str,
    cursor: Cursor,
) -> Result<Option<(PageItems, Cursor)>> {
    let next_link = match cursor {
        Cursor::Exhausted => return Ok(None),
        Cursor::First => None,
        Cursor::Next(link) => Some(link),
    };

    let page = service
        .list_enrolled_device_identities(token_id, next_link.as_deref())
        .await?;

    let cursor = match page.next_link {
        Some(link) => Cursor::Next(link),
        None => Cursor::Exhausted,
    };
    let items: Vec<Result<EnrolledDeviceIdentity>> = page.items.into_iter().map(Ok).collect();
    Ok(Some((stream::iter(items), cursor)))
}

/// Every identity in a token's roster, across all pages.
pub fn enrolled_identities<'a>(
    service: &'a dyn EnrollmentService,
    token_id: &'a str,
) -> impl Stream<Item = Result<EnrolledDeviceIdentity>> + Send + 'a {
    stream::try_unfold(Cursor::First, move |cursor| {
        fetch_page(service, token_id, cursor)
    })
    .try_flatten()
}
