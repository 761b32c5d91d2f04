//! Pagination - Traverse page-numbered list endpoints
//!
//! List responses carry a `links.pages` object with absolute URLs for the
//! first, previous, next and last pages. The current page is recovered from
//! those URLs; the traversal stops once `last` is absent.

use std::future::Future;

use serde::Deserialize;
use url::Url;

use crate::provider::{ProviderError, ProviderResult};

/// Page size requested for every list call
pub const PER_PAGE: u32 = 200;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Pages {
    #[serde(default)]
    pub first: Option<String>,
    #[serde(default)]
    pub prev: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
}

impl Links {
    pub fn is_last_page(&self) -> bool {
        match &self.pages {
            None => true,
            Some(p) => p.last.as_deref().is_none_or(str::is_empty),
        }
    }

    /// Page number of the response these links came with
    pub fn current_page(&self) -> ProviderResult<u32> {
        let Some(pages) = &self.pages else {
            return Ok(1);
        };
        match pages.prev.as_deref().filter(|p| !p.is_empty()) {
            Some(prev) => Ok(page_for_url(prev)? + 1),
            None => Ok(1),
        }
    }
}

fn page_for_url(raw: &str) -> ProviderResult<u32> {
    let url = Url::parse(raw)
        .map_err(|e| ProviderError::internal(format!("invalid page link '{raw}': {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .ok_or_else(|| ProviderError::internal(format!("page link '{raw}' has no page number")))
}

/// Query parameters for one list call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: PER_PAGE,
        }
    }
}

impl ListOptions {
    pub fn query(&self) -> [(&'static str, String); 2] {
        [
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ]
    }
}

/// One page of a list response
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub links: Option<Links>,
}

/// Fetch every page and concatenate the items
pub async fn collect_all<T, F, Fut>(kind: &str, mut fetch: F) -> ProviderResult<Vec<T>>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = ProviderResult<Page<T>>>,
{
    let mut all = Vec::new();
    let mut opts = ListOptions::default();

    loop {
        let page = fetch(opts)
            .await
            .map_err(|e| e.with_context(format!("error retrieving {kind}")))?;
        all.extend(page.items);

        let Some(links) = page.links else { break };
        if links.is_last_page() {
            break;
        }
        let current = links
            .current_page()
            .map_err(|e| e.with_context(format!("error retrieving {kind}")))?;
        opts.page = current + 1;
    }

    log::debug!("Retrieved {} {kind}", all.len());
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(prev: Option<u32>, next: Option<u32>, last: Option<u32>) -> Links {
        let url = |p: u32| format!("https://api.example.com/v2/domains?page={p}&per_page=200");
        Links {
            pages: Some(Pages {
                first: None,
                prev: prev.map(url),
                next: next.map(url),
                last: last.map(url),
            }),
        }
    }

    #[test]
    fn current_page_from_prev_link() {
        assert_eq!(links(None, Some(2), Some(3)).current_page().unwrap(), 1);
        assert_eq!(links(Some(1), Some(3), Some(3)).current_page().unwrap(), 2);
        assert_eq!(Links::default().current_page().unwrap(), 1);
    }

    #[test]
    fn last_page_detection() {
        assert!(Links::default().is_last_page());
        assert!(links(Some(2), None, None).is_last_page());
        assert!(!links(None, Some(2), Some(3)).is_last_page());
    }

    #[tokio::test]
    async fn collects_every_page() {
        let pages = vec![
            (vec![1, 2], Some(links(None, Some(2), Some(3)))),
            (vec![3, 4], Some(links(Some(1), Some(3), Some(3)))),
            (vec![5], Some(links(Some(2), None, None))),
        ];
        let mut requested = Vec::new();
        let all = collect_all("domains", |opts| {
            requested.push(opts.page);
            let (items, links) = pages[(opts.page - 1) as usize].clone();
            async move { Ok(Page { items, links }) }
        })
        .await
        .unwrap();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn page_failure_is_prefixed() {
        let err = collect_all::<u32, _, _>("ssh keys", |_| async {
            Err(ProviderError::from_status(500, "server error"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.message, "error retrieving ssh keys: server error");
    }
}
