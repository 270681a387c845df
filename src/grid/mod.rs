use crate::api::models::RecordsQuery;
use crate::window::TimeWindow;

pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// The two indexed lookup columns the backend can search without a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    CallId,
    CallerId,
}

impl SearchType {
    pub fn from_column(column: &str) -> Option<Self> {
        match column {
            "call_id" => Some(SearchType::CallId),
            "caller_id" => Some(SearchType::CallerId),
            _ => None,
        }
    }
}

/// UI-level per-column filter operators. All of them collapse into the two
/// server channels; the distinction only changes which channel is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    StartsWith,
    Contains,
    Equals,
    DateIs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub page: u32,
    pub page_size: i64,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What actually goes to the server: a fuzzy multi-field term, or an
/// indexed `(search_type, term)` pair restricted to call_id/caller_id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFilterState {
    pub search_type: Option<SearchType>,
    pub server_search_term: Option<String>,
    pub global_search_term: Option<String>,
}

impl ServerFilterState {
    pub fn is_empty(&self) -> bool {
        self.server_search_term.is_none() && self.global_search_term.is_none()
    }
}

/// Maps grid UI state to server query parameters. The server owns
/// pagination: `total_records` comes back with each page and every state
/// change here re-fetches rather than re-slicing held rows.
#[derive(Debug, Default)]
pub struct GridController {
    pagination: PaginationState,
    filters: ServerFilterState,
    /// Set whenever the next render needs a server round-trip.
    needs_refetch: bool,
}

impl GridController {
    pub fn new() -> Self {
        Self {
            pagination: PaginationState::default(),
            filters: ServerFilterState::default(),
            needs_refetch: true,
        }
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn filters(&self) -> &ServerFilterState {
        &self.filters
    }

    /// Apply a per-column filter. call_id/caller_id go to the indexed
    /// channel; every other column degrades to the fuzzy global term.
    /// Any filter change resets to page 1 — a stale page number against a
    /// changed filter context may point past the new last page.
    pub fn set_column_filter(&mut self, column: &str, _op: FilterOp, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.clear_filters();
            return;
        }
        match SearchType::from_column(column) {
            Some(search_type) => {
                self.filters.search_type = Some(search_type);
                self.filters.server_search_term = Some(value.to_string());
                self.filters.global_search_term = None;
            }
            None => {
                self.filters.search_type = None;
                self.filters.server_search_term = None;
                self.filters.global_search_term = Some(value.to_string());
            }
        }
        self.reset_to_first_page();
    }

    pub fn clear_filters(&mut self) {
        if !self.filters.is_empty() {
            self.filters = ServerFilterState::default();
            self.reset_to_first_page();
        }
    }

    pub fn set_page(&mut self, page: u32) {
        self.pagination.page = page.max(1);
        self.needs_refetch = true;
    }

    /// Page-size changes always refetch at page 1: the dataset shape under
    /// the current filter is server-authoritative, so re-slicing the held
    /// page would lie about both contents and total.
    pub fn set_page_size(&mut self, page_size: i64) {
        self.pagination.page_size = page_size.max(1);
        self.reset_to_first_page();
    }

    /// The window (or client) changed under the grid.
    pub fn on_window_change(&mut self) {
        self.reset_to_first_page();
    }

    fn reset_to_first_page(&mut self) {
        self.pagination.page = 1;
        self.needs_refetch = true;
    }

    pub fn needs_refetch(&self) -> bool {
        self.needs_refetch
    }

    /// Mark the pending state as fetched; called when the query is issued.
    pub fn mark_fetched(&mut self) {
        self.needs_refetch = false;
    }

    /// Produce the server parameter set for the current grid state.
    pub fn to_query(&self, window: &TimeWindow, client_id: &str) -> RecordsQuery {
        let (search_term, caller_id) = match (self.filters.search_type, &self.filters.server_search_term) {
            (Some(SearchType::CallId), Some(term)) => (Some(term.clone()), None),
            (Some(SearchType::CallerId), Some(term)) => (None, Some(term.clone())),
            _ => (self.filters.global_search_term.clone(), None),
        };
        RecordsQuery {
            client_id: client_id.to_string(),
            from_date: window.from_iso(),
            to_date: window.to_iso(),
            page: self.pagination.page,
            num_of_records: self.pagination.page_size,
            search_term,
            caller_id,
        }
    }
}
