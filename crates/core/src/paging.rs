//! Paging requests and results

use crate::error::{MasterError, MasterResult};
use serde::{Deserialize, Serialize};

/// Which slice of a result set to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagingRequest {
    first_item: usize,
    paging_size: usize,
}

impl PagingRequest {
    /// Every item
    pub const ALL: PagingRequest = PagingRequest {
        first_item: 0,
        paging_size: usize::MAX,
    };

    /// No items, only the total count
    pub const NONE: PagingRequest = PagingRequest {
        first_item: 0,
        paging_size: 0,
    };

    /// The first item only
    pub const FIRST: PagingRequest = PagingRequest {
        first_item: 0,
        paging_size: 1,
    };

    /// Page by 1-based page number
    pub fn of_page(page: usize, paging_size: usize) -> MasterResult<Self> {
        if page == 0 {
            return Err(MasterError::invalid_argument("page numbers start at 1"));
        }
        let first_item = (page - 1)
            .checked_mul(paging_size)
            .ok_or_else(|| MasterError::invalid_argument("page out of range"))?;
        Ok(PagingRequest {
            first_item,
            paging_size,
        })
    }

    /// Page by 0-based item offset
    pub const fn of_index(first_item: usize, paging_size: usize) -> Self {
        PagingRequest {
            first_item,
            paging_size,
        }
    }

    /// 0-based index of the first item
    pub fn first_item(&self) -> usize {
        self.first_item
    }

    /// Maximum number of items
    pub fn paging_size(&self) -> usize {
        self.paging_size
    }

    /// Exclusive end index
    pub fn last_item(&self) -> usize {
        self.first_item.saturating_add(self.paging_size)
    }

    /// True when every item from the start is requested
    pub fn is_all(&self) -> bool {
        self.first_item == 0 && self.paging_size == usize::MAX
    }

    /// True when no items are requested
    pub fn is_none(&self) -> bool {
        self.paging_size == 0
    }
}

impl Default for PagingRequest {
    fn default() -> Self {
        PagingRequest::ALL
    }
}

/// Paging description returned alongside a page of results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    request: PagingRequest,
    total_items: usize,
}

impl Paging {
    /// Describe a page of a result set with `total_items` matches
    pub fn new(request: PagingRequest, total_items: usize) -> Self {
        Paging {
            request,
            total_items,
        }
    }

    /// The request this page answers
    pub fn request(&self) -> PagingRequest {
        self.request
    }

    /// Total number of matching items across all pages
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Number of pages at the requested size (1 for ALL, 0 for NONE)
    pub fn total_pages(&self) -> usize {
        if self.request.is_none() {
            return 0;
        }
        if self.request.is_all() {
            return 1;
        }
        let size = self.request.paging_size;
        self.total_items / size + usize::from(self.total_items % size != 0)
    }

    /// True if items exist beyond this page
    pub fn has_more(&self) -> bool {
        self.request.last_item() < self.total_items
    }
}
