// src/paging.rs
//
// Paginated listing engine: follows continuation cursors until the backend
// reports "not truncated", merging pages into one logical result. The
// accumulator is local to each call; nothing survives between operations.

use tracing::debug;

use crate::error::{Result, StorageError};
use crate::object_client::ObjectClient;

/// Fully merged listing for one prefix at one depth.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.common_prefixes.is_empty()
    }
}

/// List every key directly under `prefix` plus the common prefixes one level
/// below it, following pagination to the end. An empty prefix lists the
/// container root; a prefix with no matches yields an empty listing, not an
/// error. A page-fetch failure surfaces as `StorageError::Listing` and aborts
/// the enumeration with nothing committed.
pub async fn list_all<C: ObjectClient + ?Sized>(
    client: &C,
    container: &str,
    start: Option<&str>,
    prefix: &str,
) -> Result<Listing> {
    let page_size = client.profile().list_page_size;
    let mut acc = Listing::default();
    let mut cursor: Option<String> = start.map(str::to_owned);
    let mut pages = 0usize;

    loop {
        let page = client
            .list_page(container, prefix, cursor.as_deref(), page_size)
            .await
            .map_err(|e| StorageError::Listing {
                prefix: prefix.to_string(),
                source: anyhow::Error::new(e),
            })?;
        pages += 1;

        acc.keys.extend(page.keys);
        // Providers report the full common-prefix set on one page in
        // practice; take the first non-empty set and keep it.
        if acc.common_prefixes.is_empty() {
            acc.common_prefixes = page.common_prefixes;
        }

        if !page.truncated {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            // Truncated without a cursor would loop forever; stop here.
            None => break,
        }
    }

    debug!(
        prefix,
        pages,
        keys = acc.keys.len(),
        subprefixes = acc.common_prefixes.len(),
        "prefix enumeration complete"
    );
    Ok(acc)
}
