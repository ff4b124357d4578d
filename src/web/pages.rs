//! Fixed-size page windows for the HTML listings.
//!
//! Listings never count rows: a `next` link is offered whenever the current
//! window came back full and the page ceiling has not been reached.

use crate::error::{Error, Result};

/// Parse the `page` query parameter. Missing means 1, garbage is a bad
/// request, anything outside `1..=max_pages` does not exist.
pub fn parse_page(raw: Option<&str>, max_pages: usize) -> Result<usize> {
    let page = match raw {
        None => 1,
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::BadRequest(format!("Invalid page: {raw}")))?,
    };

    if page < 1 || page as usize > max_pages {
        return Err(Error::NotFound(format!("Page {page} not found")));
    }
    Ok(page as usize)
}

/// Row offset of a page
pub fn offset(page: usize, per_page: usize) -> usize {
    (page - 1) * per_page
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl PageLinks {
    /// `base` may already carry a query string (`/search?q=rust`)
    pub fn new(base: &str, page: usize, max_pages: usize, window_full: bool) -> Self {
        let sep = if base.contains('?') { '&' } else { '?' };
        let url = |n: usize| format!("{base}{sep}page={n}");

        PageLinks {
            prev_url: (page > 1).then(|| url(page - 1)),
            next_url: (window_full && page < max_pages).then(|| url(page + 1)),
        }
    }
}
