//! The automation capability set the driver consumes: element location,
//! clicking, key dispatch, text entry, attribute reads. The driver never
//! talks to a browser directly — everything goes through [`Scope`], so the
//! same logic runs against a CDP page or an in-process fake.

pub mod cdp;

use async_trait::async_trait;

pub use crate::error::ScopeError;

/// An opaque handle for a located element. Handles are cheap and
/// re-acquirable; any of them can go stale the moment the page re-renders,
/// so the driver never holds one across a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Selector the handle was resolved from.
    pub selector: String,
    /// Position within the selector's match list at resolution time.
    pub index: usize,
    /// Backend-specific identity token (0 when the backend re-resolves by
    /// selector instead).
    pub token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Only visible elements match.
    #[default]
    Visible,
    /// Only hidden elements match (hidden inputs and the like).
    Hidden,
    /// Match regardless of visibility.
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFilter {
    Exact(String),
    Contains(String),
}

/// Filters applied while resolving a selector. All lookups are zero-wait
/// probes; waiting is the condition poller's job.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub visibility: Visibility,
    pub text: Option<TextFilter>,
}

impl FindOptions {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn hidden() -> Self {
        Self {
            visibility: Visibility::Hidden,
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self {
            visibility: Visibility::Any,
            ..Self::default()
        }
    }

    pub fn with_exact_text(mut self, text: &str) -> Self {
        self.text = Some(TextFilter::Exact(text.to_string()));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(TextFilter::Contains(text.to_string()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Tab,
    Enter,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::Escape => "Escape",
            Key::Tab => "Tab",
            Key::Enter => "Enter",
        }
    }
}

/// Automation primitives consumed by the driver. Implementations must treat
/// every call as a fresh probe against live page state; nothing may be
/// cached between calls.
#[async_trait]
pub trait Scope: Send + Sync {
    /// Resolve the first element matching `selector` under the given
    /// filters, or `NotFound`.
    async fn find(&self, selector: &str, opts: &FindOptions) -> Result<ElementHandle, ScopeError>;

    /// Resolve all matching elements, in document order.
    async fn find_all(
        &self,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<Vec<ElementHandle>, ScopeError>;

    /// Zero-wait presence probe.
    async fn has_selector(&self, selector: &str, opts: &FindOptions) -> Result<bool, ScopeError>;

    /// Click the element directly. Fails with `ClickIntercepted` when an
    /// overlapping element would receive the click instead.
    async fn click(&self, el: &ElementHandle) -> Result<(), ScopeError>;

    /// Click via a synthesized pointer action at the element's coordinates,
    /// for targets that refuse a direct click.
    async fn pointer_click(&self, el: &ElementHandle) -> Result<(), ScopeError>;

    async fn scroll_into_view(&self, el: &ElementHandle) -> Result<(), ScopeError>;

    /// Replace the input's value with `text`, dispatching input events.
    async fn set_text(&self, el: &ElementHandle, text: &str) -> Result<(), ScopeError>;

    async fn send_key(&self, el: &ElementHandle, key: Key) -> Result<(), ScopeError>;

    async fn send_key_to_body(&self, key: Key) -> Result<(), ScopeError>;

    async fn attr(&self, el: &ElementHandle, name: &str)
        -> Result<Option<String>, ScopeError>;

    /// Current value property of an input element.
    async fn input_value(&self, el: &ElementHandle) -> Result<Option<String>, ScopeError>;

    /// Trimmed text content.
    async fn text(&self, el: &ElementHandle) -> Result<String, ScopeError>;

    async fn is_visible(&self, el: &ElementHandle) -> Result<bool, ScopeError>;

    /// Walk up to the nearest ancestor (or self) matching
    /// `ancestor_selector`, for cases where the matched node is an inner
    /// presentation node rather than the clickable container.
    async fn enclosing(
        &self,
        el: &ElementHandle,
        ancestor_selector: &str,
    ) -> Result<ElementHandle, ScopeError>;

    /// Resolve the first descendant of `el` matching `selector`.
    async fn find_within(
        &self,
        el: &ElementHandle,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<ElementHandle, ScopeError>;

    async fn find_all_within(
        &self,
        el: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, ScopeError>;
}
