// Copyright 2023 Remi Bernotavicius

use crate::error::{Error, Result};
use serde::Serialize;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Result<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if page < 1 {
            return Err(Error::validation("page must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if (page - 1).checked_mul(limit).is_none() {
            return Err(Error::validation(format!("page {page} is out of range")));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, count: i64, results: Vec<T>) -> Self {
        let next = request
            .page
            .checked_mul(request.limit)
            .is_some_and(|seen| seen < count)
            .then_some(request.page + 1);
        let previous = (request.page > 1).then_some(request.page - 1);
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

#[test]
fn page_links() {
    let request = PageRequest::new(Some(2), Some(6), 6).unwrap();
    assert_eq!(request.offset(), 6);

    let page = Page::new(request, 13, vec![(); 6]);
    assert_eq!(page.next, Some(3));
    assert_eq!(page.previous, Some(1));

    let page = Page::new(PageRequest::new(None, None, 6).unwrap(), 6, vec![(); 6]);
    assert_eq!(page.next, None);
    assert_eq!(page.previous, None);
}

#[test]
fn page_request_bounds() {
    assert!(PageRequest::new(Some(0), None, 6).is_err());
    assert!(PageRequest::new(None, Some(0), 6).is_err());
    assert!(PageRequest::new(None, Some(MAX_PAGE_SIZE + 1), 6).is_err());
    assert_eq!(
        PageRequest::new(None, None, 6).unwrap(),
        PageRequest { page: 1, limit: 6 }
    );
}

#[test]
fn huge_pages_are_rejected() {
    assert!(matches!(
        PageRequest::new(Some(i64::MAX), None, 6),
        Err(Error::Validation(_))
    ));

    let last = i64::MAX / 6;
    let request = PageRequest::new(Some(last), Some(6), 6).unwrap();
    let page = Page::new(request, 3, Vec::<()>::new());
    assert_eq!(page.next, None);
    assert_eq!(page.previous, Some(last - 1));
}
