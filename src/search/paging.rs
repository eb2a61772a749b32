// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded multi-page fetching for providers with small page sizes

use std::future::Future;

use tracing::warn;

use super::types::SearchError;

/// Upper bound on pages fetched for one provider attempt
pub const MAX_PAGES: usize = 3;

/// Fetch up to `max_results` items in pages of `page_size`
///
/// `fetch_page` receives the zero-based offset and the number of items wanted.
/// Stops after [`MAX_PAGES`], on a short page, or on a failed page. A failure on
/// the first page is returned; later failures keep what was already gathered.
pub async fn fetch_paged<T, F, Fut>(
    provider: &str,
    page_size: usize,
    max_results: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, SearchError>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SearchError>>,
{
    let page_size = page_size.max(1);
    let mut gathered = Vec::new();

    for page in 0..MAX_PAGES {
        let wanted = max_results.saturating_sub(gathered.len()).min(page_size);
        if wanted == 0 {
            break;
        }

        match fetch_page(page * page_size, wanted).await {
            Ok(items) => {
                let short = items.len() < wanted;
                gathered.extend(items);
                if short {
                    break;
                }
            }
            Err(e) if page == 0 => return Err(e),
            Err(e) => {
                warn!(
                    "{} page {} failed, keeping {} results: {}",
                    provider,
                    page + 1,
                    gathered.len(),
                    e
                );
                break;
            }
        }
    }

    gathered.truncate(max_results);
    Ok(gathered)
}
