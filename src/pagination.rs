use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::query::{
    FilterExpr, FilterField, FilterOperator, LIMIT_KEY, ListQuery, OFFSET_KEY, PAGE_KEY,
    PaginationParams, SORT_KEY, SortOrder,
};

/// Navigator
///
/// Receives every committed list state. In a browser host this pushes the URL; the list
/// screen reacts to the new URL by issuing its request.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, params: &PaginationParams);
}

/// ChannelNavigator
///
/// Forwards committed states over an unbounded channel.
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<PaginationParams>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PaginationParams>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Navigator for ChannelNavigator {
    async fn navigate(&self, params: &PaginationParams) {
        if self.tx.send(params.clone()).is_err() {
            tracing::debug!("navigation receiver dropped");
        }
    }
}

/// PaginationSettings
///
/// Per-screen knobs: fallback page size, the global search key, the debounce window and
/// the filterable fields (whose first operator is what a bare value decodes to).
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub default_limit: u32,
    pub search_key: String,
    pub debounce: Duration,
    pub fields: Vec<FilterField>,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl PaginationSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            search_key: config.search_key.clone(),
            debounce: config.debounce,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FilterField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    fn default_operator(&self, field: &str) -> FilterOperator {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .map(FilterField::default_operator)
            .unwrap_or(FilterOperator::Eq)
    }
}

/// ParamUpdate
///
/// A batch of changes merged into the list state. An empty value clears its key.
/// Any change to a filter or the search term resets the page to 1 unless
/// [`ParamUpdate::keep_page`] is set; page, limit and sort changes never do.
#[derive(Debug, Clone, Default)]
pub struct ParamUpdate {
    changes: Vec<(String, Vec<String>)>,
    search: Option<String>,
    keep_page: bool,
}

impl ParamUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_all(key, vec![value.into()])
    }

    pub fn set_all(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.changes.push((key.into(), values));
        self
    }

    pub fn clear(self, key: impl Into<String>) -> Self {
        self.set_all(key, Vec::new())
    }

    pub fn filter(self, field: impl Into<String>, expr: &FilterExpr) -> Self {
        if expr.is_empty() {
            self.clear(field)
        } else {
            self.set(field, expr.encode())
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn page(self, page: u32) -> Self {
        self.set(PAGE_KEY, page.max(1).to_string())
    }

    pub fn limit(self, limit: u32) -> Self {
        self.set(LIMIT_KEY, limit.to_string())
    }

    pub fn sort(self, sort: &SortOrder) -> Self {
        self.set(SORT_KEY, sort.to_param())
    }

    pub fn keep_page(mut self) -> Self {
        self.keep_page = true;
        self
    }

    /// merge_into
    ///
    /// Applies the update to `bag`. Returns whether any filter or search key changed.
    fn merge_into(&self, bag: &mut PaginationParams, search_key: &str) -> bool {
        let search = self
            .search
            .as_ref()
            .map(|term| (search_key.to_string(), vec![term.clone()]));
        let mut filters_changed = false;
        let mut page_set = false;

        for (key, values) in self.changes.iter().cloned().chain(search) {
            let values: Vec<String> = values.into_iter().filter(|v| !v.trim().is_empty()).collect();
            let before = bag.get_all(&key).map(<[String]>::to_vec);

            let after = if values.is_empty() {
                bag.remove(&key);
                None
            } else {
                bag.set_all(key.clone(), values.clone());
                Some(values)
            };

            if key == PAGE_KEY {
                page_set = true;
            }
            if before != after && !is_navigation_key(&key) {
                filters_changed = true;
            }
        }

        if filters_changed && !self.keep_page && !page_set {
            bag.set(PAGE_KEY, "1");
        }
        filters_changed
    }
}

fn is_navigation_key(key: &str) -> bool {
    matches!(key, PAGE_KEY | LIMIT_KEY | SORT_KEY | OFFSET_KEY)
}

struct ControllerState {
    // Last state handed to the navigator.
    committed: PaginationParams,
    // Latest state including buffered updates.
    pending: PaginationParams,
    // Bumped on every update; a debounce timer only commits if it is still current.
    generation: u64,
}

struct Inner {
    settings: PaginationSettings,
    navigator: Arc<dyn Navigator>,
    state: Mutex<ControllerState>,
}

/// PaginationController
///
/// Owns a list screen's state as a flat parameter bag mirrored with the URL. Reads come
/// from the latest (possibly buffered) state; the navigator only ever sees committed
/// states, and never the same one twice in a row.
#[derive(Clone)]
pub struct PaginationController {
    inner: Arc<Inner>,
}

impl PaginationController {
    /// Starts from the state parsed out of the current URL; that state counts as
    /// already committed.
    pub fn new(
        initial: PaginationParams,
        settings: PaginationSettings,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                navigator,
                state: Mutex::new(ControllerState {
                    committed: initial.clone(),
                    pending: initial,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn from_query_str(
        query: &str,
        settings: PaginationSettings,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::new(PaginationParams::from_query_str(query), settings, navigator)
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &PaginationSettings {
        &self.inner.settings
    }

    pub fn params(&self) -> PaginationParams {
        self.state().pending.clone()
    }

    pub fn committed(&self) -> PaginationParams {
        self.state().committed.clone()
    }

    // --- Derived State ---

    pub fn current_page(&self) -> u32 {
        self.state().pending.page().filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn current_limit(&self) -> u32 {
        self.state()
            .pending
            .limit()
            .unwrap_or(self.inner.settings.default_limit)
    }

    pub fn current_sort(&self) -> Option<SortOrder> {
        self.state().pending.sort()
    }

    /// The search term with any operator prefix stripped.
    pub fn current_search(&self) -> Option<String> {
        let state = self.state();
        let raw = state.pending.get(&self.inner.settings.search_key)?;
        Some(FilterExpr::decode(raw, FilterOperator::Eq).value()).filter(|term| !term.is_empty())
    }

    pub fn current_filter(&self, field: &str) -> Option<FilterExpr> {
        let state = self.state();
        let raw = state.pending.get(field)?;
        Some(FilterExpr::decode(raw, self.inner.settings.default_operator(field)))
    }

    /// Backend request for the committed state (page converted to offset on the wire).
    pub fn list_query(&self) -> ListQuery {
        ListQuery::from_params(self.committed(), self.inner.settings.default_limit)
    }

    // --- Updates ---

    /// Merges the update and commits immediately. Returns whether a navigation happened.
    pub async fn apply(&self, update: ParamUpdate) -> bool {
        {
            let mut state = self.state();
            update.merge_into(&mut state.pending, &self.inner.settings.search_key);
            state.generation += 1;
        }
        self.commit().await
    }

    /// apply_debounced
    ///
    /// Merges the update into the pending state and commits once no further update has
    /// arrived for the debounce window. Must be called inside a Tokio runtime.
    pub fn apply_debounced(&self, update: ParamUpdate) {
        let generation = {
            let mut state = self.state();
            update.merge_into(&mut state.pending, &self.inner.settings.search_key);
            state.generation += 1;
            state.generation
        };

        let controller = self.clone();
        let window = self.inner.settings.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let current = controller.state().generation;
            if current == generation {
                controller.commit().await;
            }
        });
    }

    /// Commits any buffered state now, cancelling a pending debounce.
    pub async fn flush(&self) -> bool {
        self.state().generation += 1;
        self.commit().await
    }

    async fn commit(&self) -> bool {
        let params = {
            let mut state = self.state();
            if state.pending == state.committed {
                return false;
            }
            state.committed = state.pending.clone();
            state.committed.clone()
        };

        tracing::debug!(query = %params, "list state committed");
        self.inner.navigator.navigate(&params).await;
        true
    }
}
