//! The driver object: bound to one widget identity and an automation scope,
//! stateless between calls. Every operation re-reads live page state; no
//! element handle survives a wait.

mod open;
mod options;
mod select;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::config::Timeouts;
use crate::error::{DriverResult, ScopeError};
use crate::interaction::retry::{retry_transient, MAX_ATTEMPTS};
use crate::interaction::wait::{wait_for_absence, wait_for_equality, wait_until};
use crate::scope::{ElementHandle, FindOptions, Scope};
use crate::selectors::WidgetLocators;

/// Ephemeral option descriptor, reconstructed on every query. Never cached:
/// the underlying markup can be fully replaced between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub disabled: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle {
    pub toggle_icon: Option<String>,
    pub toggle_value: Option<String>,
    pub value: Option<String>,
}

/// Markup-shape capabilities of the widget, resolved from a single state
/// probe and branched on explicitly instead of re-probed ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetVariant {
    pub has_hidden_value_input: bool,
    pub has_search_input: bool,
    pub is_multi_select: bool,
}

/// Interaction driver for one combobox widget instance.
pub struct ComboSelect {
    locators: WidgetLocators,
    scope: Arc<dyn Scope>,
    timeouts: Timeouts,
    outside_target: Option<String>,
}

impl ComboSelect {
    pub fn new(id: &str, scope: Arc<dyn Scope>) -> Self {
        Self::with_timeouts(id, scope, Timeouts::default())
    }

    pub fn with_timeouts(id: &str, scope: Arc<dyn Scope>, timeouts: Timeouts) -> Self {
        Self {
            locators: WidgetLocators::new(id),
            scope,
            timeouts,
            outside_target: None,
        }
    }

    /// Designate the element `close_if_open` clicks to dismiss the widget.
    /// Falls back to the document body when unset or absent.
    pub fn with_outside_target(mut self, selector: &str) -> Self {
        self.outside_target = Some(selector.to_string());
        self
    }

    pub fn locators(&self) -> &WidgetLocators {
        &self.locators
    }

    // ── Live state reads ────────────────────────────────────────────────

    /// Whether the options container is currently rendered (any visibility).
    pub async fn is_open(&self) -> DriverResult<bool> {
        Ok(self
            .scope
            .has_selector(self.locators.options_container(), &FindOptions::any())
            .await?)
    }

    /// Text of the committed selection, waiting for it to render.
    pub async fn label(&self) -> DriverResult<String> {
        let this = self;
        retry_transient("label", MAX_ATTEMPTS, move |_| {
            async move {
                this.wait_for_selector(
                    "current option",
                    this.locators.current_option(),
                    FindOptions::visible(),
                    this.timeouts.default_wait,
                )
                .await?;
                let el = this
                    .scope
                    .find(this.locators.current_option(), &FindOptions::visible())
                    .await?;
                Ok(this.scope.text(&el).await?)
            }
            .boxed()
        })
        .await
    }

    /// Immediate probe for the committed selection's text. Prefers the inner
    /// presentation-text node over the container text.
    pub async fn label_no_wait(&self) -> DriverResult<Option<String>> {
        let any = FindOptions::any();
        let current = match self
            .scope
            .find(self.locators.current_option(), &any)
            .await
        {
            Ok(el) => el,
            Err(ScopeError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match self
            .scope
            .find_within(&current, "[data-testid='option-presentation-text']", &any)
            .await
        {
            Ok(text_el) => Ok(Some(self.scope.text(&text_el).await?)),
            Err(ScopeError::NotFound(_)) => Ok(Some(self.scope.text(&current).await?)),
            Err(e) => Err(e.into()),
        }
    }

    /// Committed hidden value, waiting for the input to render.
    pub async fn value(&self) -> DriverResult<String> {
        let this = self;
        retry_transient("value", MAX_ATTEMPTS, move |_| {
            async move {
                this.wait_for_selector(
                    "hidden value input",
                    this.locators.hidden_value_input(),
                    FindOptions::any(),
                    this.timeouts.default_wait,
                )
                .await?;
                let el = this
                    .scope
                    .find(this.locators.hidden_value_input(), &FindOptions::any())
                    .await?;
                Ok(this.scope.input_value(&el).await?.unwrap_or_default())
            }
            .boxed()
        })
        .await
    }

    /// Immediate probe for the committed hidden value.
    pub async fn value_no_wait(&self) -> DriverResult<Option<String>> {
        match self
            .scope
            .find(self.locators.hidden_value_input(), &FindOptions::any())
            .await
        {
            Ok(el) => Ok(self.scope.input_value(&el).await?),
            Err(ScopeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Descriptors for the currently rendered options, waiting for the list.
    pub async fn options(&self) -> DriverResult<Vec<SelectOption>> {
        let this = self;
        retry_transient("options", MAX_ATTEMPTS, move |_| {
            async move {
                this.wait_for_selector(
                    "option list",
                    this.locators.option_container(),
                    FindOptions::visible(),
                    this.timeouts.default_wait,
                )
                .await?;
                this.options_now().await
            }
            .boxed()
        })
        .await
    }

    async fn options_now(&self) -> DriverResult<Vec<SelectOption>> {
        let els = self
            .scope
            .find_all(self.locators.option_container(), &FindOptions::any())
            .await?;
        let mut out = Vec::with_capacity(els.len());
        for el in &els {
            out.push(SelectOption {
                label: self.scope.text(el).await?,
                value: self.scope.attr(el, "data-value").await?.unwrap_or_default(),
                disabled: self.scope.attr(el, "data-disabled").await?.as_deref() == Some("true"),
                selected: self.scope.attr(el, "data-selected").await?.as_deref() == Some("true"),
            });
        }
        Ok(out)
    }

    /// Values of all options currently marked selected (multi-select state).
    pub async fn selected_option_values(&self) -> DriverResult<Vec<String>> {
        let els = self
            .scope
            .find_all(&self.locators.selected_options(), &FindOptions::any())
            .await?;
        let mut out = Vec::with_capacity(els.len());
        for el in &els {
            out.push(self.scope.attr(el, "data-value").await?.unwrap_or_default());
        }
        Ok(out)
    }

    pub async fn toggles(&self) -> DriverResult<Vec<Toggle>> {
        let this = self;
        retry_transient("toggles", MAX_ATTEMPTS, move |_| {
            async move { this.toggles_now().await }.boxed()
        })
        .await
    }

    async fn toggles_now(&self) -> DriverResult<Vec<Toggle>> {
        let els = self
            .scope
            .find_all(self.locators.toggle_presentations(), &FindOptions::any())
            .await?;
        let mut out = Vec::with_capacity(els.len());
        for el in &els {
            out.push(Toggle {
                toggle_icon: self.scope.attr(el, "data-toggle-icon").await?,
                toggle_value: self.scope.attr(el, "data-toggle-value").await?,
                value: self.scope.attr(el, "data-value").await?,
            });
        }
        Ok(out)
    }

    /// Probe the widget's markup shape once; callers branch on the result
    /// instead of re-probing per decision.
    pub async fn variant(&self) -> DriverResult<WidgetVariant> {
        let any = FindOptions::any();
        let has_hidden_value_input = self
            .scope
            .has_selector(self.locators.hidden_value_input(), &any)
            .await?;
        let has_search_input = self
            .scope
            .has_selector(self.locators.search_input(), &any)
            .await?;
        let has_current_selected = self
            .scope
            .has_selector(self.locators.current_selected(), &any)
            .await?;
        Ok(WidgetVariant {
            has_hidden_value_input,
            has_search_input,
            is_multi_select: has_current_selected && !has_hidden_value_input,
        })
    }

    // ── Committed-state predicates ──────────────────────────────────────

    /// Whether the given criteria describe the committed selection: label
    /// text match, hidden-value match, or a reverse lookup of the committed
    /// value's display label.
    pub async fn selected(
        &self,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<bool> {
        if label.is_none() && value.is_none() {
            return Ok(false);
        }
        if self.label_matches(label).await? {
            return Ok(true);
        }
        if self.value_matches(value).await? {
            return Ok(true);
        }
        self.label_matches_selected_value(label).await
    }

    pub(crate) async fn label_matches(&self, label: Option<&str>) -> DriverResult<bool> {
        let Some(label) = label else { return Ok(false) };
        let any = FindOptions::any();
        if self
            .scope
            .has_selector(
                &self.locators.current_selected_presentation_by_label(label),
                &any,
            )
            .await?
        {
            return Ok(true);
        }
        for selector in [
            self.locators.current_selected_presentation_text(),
            self.locators.current_option(),
        ] {
            if self
                .scope
                .has_selector(selector, &FindOptions::any().with_exact_text(label))
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) async fn value_matches(&self, value: Option<&str>) -> DriverResult<bool> {
        let Some(value) = value else { return Ok(false) };
        Ok(self
            .scope
            .has_selector(
                &self.locators.hidden_value_input_with(value),
                &FindOptions::any(),
            )
            .await?)
    }

    async fn label_matches_selected_value(&self, label: Option<&str>) -> DriverResult<bool> {
        let Some(label) = label else { return Ok(false) };
        if let Some(current) = self.label_no_wait().await? {
            return Ok(current == label);
        }
        let Some(current_value) = self.value_no_wait().await?.filter(|v| !v.is_empty()) else {
            return Ok(false);
        };
        Ok(self
            .selected_label_for_value(&current_value)
            .await?
            .as_deref()
            == Some(label))
    }

    /// Display label of the option carrying `value`. Opens the widget when
    /// needed and restores the closed state afterwards.
    pub async fn selected_label_for_value(&self, value: &str) -> DriverResult<Option<String>> {
        if value.is_empty() {
            return Ok(None);
        }
        let was_open = self.is_open().await?;
        self.open_allow_if_open(true).await?;
        let lookup = self.option_label_lookup(value).await;
        if !was_open {
            self.close_if_open().await?;
        }
        lookup
    }

    async fn option_label_lookup(&self, value: &str) -> DriverResult<Option<String>> {
        let selector = self.locators.option_by_value(value);
        match self.scope.find(&selector, &FindOptions::any()).await {
            Ok(option) => {
                if let Some(text) = self.scope.attr(&option, "data-text").await? {
                    return Ok(Some(text));
                }
                Ok(Some(self.scope.text(&option).await?))
            }
            Err(ScopeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── Wait/assert operations ──────────────────────────────────────────

    pub async fn wait_for_value(&self, expected: &str) -> DriverResult<()> {
        self.wait_for_selector(
            "committed value",
            &self.locators.hidden_value_input_with(expected),
            FindOptions::any(),
            self.timeouts.default_wait,
        )
        .await
    }

    pub async fn wait_for_label(&self, expected: &str) -> DriverResult<()> {
        let this = self;
        wait_until(
            "current label",
            self.timeouts.default_wait,
            self.timeouts.poll_interval,
            move || this.label_matches(Some(expected)).boxed(),
        )
        .await
    }

    /// Wait until the rendered options equal the expected `(label, value)`
    /// sequence.
    pub async fn wait_for_options(&self, expected: &[(&str, &str)]) -> DriverResult<()> {
        let expected: Vec<(String, String)> = expected
            .iter()
            .map(|(l, v)| (l.to_string(), v.to_string()))
            .collect();
        let this = self;
        wait_for_equality(
            "option list",
            self.timeouts.default_wait,
            self.timeouts.poll_interval,
            move || {
                async move {
                    let options = this.options_now().await?;
                    Ok(options
                        .into_iter()
                        .map(|o| (o.label, o.value))
                        .collect::<Vec<_>>())
                }
                .boxed()
            },
            &expected,
        )
        .await
    }

    pub async fn wait_for_selected_option_values(&self, expected: &[&str]) -> DriverResult<()> {
        let expected: Vec<String> = expected.iter().map(|v| v.to_string()).collect();
        let this = self;
        wait_for_equality(
            "selected option values",
            self.timeouts.default_wait,
            self.timeouts.poll_interval,
            move || this.selected_option_values().boxed(),
            &expected,
        )
        .await
    }

    pub async fn wait_for_toggles(&self, expected: &[Toggle]) -> DriverResult<()> {
        let expected = expected.to_vec();
        let this = self;
        wait_for_equality(
            "toggle presentations",
            self.timeouts.default_wait,
            self.timeouts.poll_interval,
            move || this.toggles_now().boxed(),
            &expected,
        )
        .await
    }

    // ── Shared wait helpers ─────────────────────────────────────────────

    pub(crate) async fn wait_for_selector(
        &self,
        what: &str,
        selector: &str,
        opts: FindOptions,
        timeout: Duration,
    ) -> DriverResult<()> {
        let this = self;
        let opts = &opts;
        wait_until(what, timeout, self.timeouts.poll_interval, move || {
            async move { Ok(this.scope.has_selector(selector, opts).await?) }.boxed()
        })
        .await
    }

    pub(crate) async fn wait_for_no_selector(
        &self,
        what: &str,
        selector: &str,
        opts: FindOptions,
        timeout: Duration,
    ) -> DriverResult<()> {
        let this = self;
        let opts = &opts;
        wait_for_absence(what, timeout, self.timeouts.poll_interval, move || {
            async move { Ok(this.scope.has_selector(selector, opts).await?) }.boxed()
        })
        .await
    }

    pub(crate) async fn click_safely(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        match self.scope.click(el).await {
            Err(ScopeError::ClickIntercepted(_)) => self.scope.pointer_click(el).await,
            other => other,
        }
    }
}

/// Human-readable name of the targeted option, for error messages.
pub(crate) fn describe(label: Option<&str>, value: Option<&str>) -> String {
    label.or(value).unwrap_or_default().to_string()
}

/// Full criteria, for not-found/not-confirmed diagnostics.
pub(crate) fn criteria(label: Option<&str>, value: Option<&str>) -> String {
    format!("label={label:?} value={value:?}")
}
