//! Selection executor: click an option and verify the widget's committed
//! state converged, with the retry discipline around transient failures.

use futures::FutureExt;
use tracing::debug;

use crate::error::{DriverError, DriverResult, ScopeError};
use crate::interaction::retry::{retry_transient, MAX_ATTEMPTS};
use crate::interaction::wait::wait_until;
use crate::scope::{ElementHandle, FindOptions};

use super::{criteria, describe, ComboSelect};

impl ComboSelect {
    /// Select the option matching the criteria and wait for the widget to
    /// report it as committed. Fails with [`DriverError::AlreadyApplied`]
    /// when the criteria already describe the committed selection.
    pub async fn select(&self, label: Option<&str>, value: Option<&str>) -> DriverResult<()> {
        self.select_allow_if_selected(label, value, false).await
    }

    /// Like [`select`](Self::select), but with `allow_if_selected` the
    /// already-selected guard is skipped and re-selecting is a success.
    pub async fn select_allow_if_selected(
        &self,
        label: Option<&str>,
        value: Option<&str>,
        allow_if_selected: bool,
    ) -> DriverResult<()> {
        if label.is_none() && value.is_none() {
            return Err(DriverError::MissingCriteria);
        }

        let this = self;
        retry_transient("select", MAX_ATTEMPTS, move |attempt| {
            async move {
                debug!(
                    selector = this.locators.base(),
                    ?label,
                    ?value,
                    allow_if_selected,
                    attempt,
                    "select"
                );
                // The guard runs once, before anything was clicked; on a
                // retry the first attempt may already have committed.
                if attempt == 1 && !allow_if_selected {
                    this.guard_already_selected(label, value).await?;
                }
                let (resolved, allow_blank) = this.select_value_and_close(label, value).await?;
                let expected = value.map(str::to_string).or(resolved);
                this.wait_for_committed(label, expected.as_deref(), allow_blank)
                    .await
            }
            .boxed()
        })
        .await
    }

    /// Resolve and click the option, then wait for the committed state.
    /// Returns the option's value attribute.
    pub async fn select_option(
        &self,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<Option<String>> {
        let this = self;
        retry_transient("select_option", MAX_ATTEMPTS, move |_| {
            async move { this.select_option_value(label, value, true).await }.boxed()
        })
        .await
    }

    /// One resolve-and-click pass without the top-level retry. Never clicks
    /// a disabled option.
    pub async fn select_option_value(
        &self,
        label: Option<&str>,
        value: Option<&str>,
        wait_for_selection: bool,
    ) -> DriverResult<Option<String>> {
        if label.is_none() && value.is_none() {
            return Err(DriverError::MissingCriteria);
        }

        let option = self.resolve_option(label, value).await?;
        if self.scope.attr(&option, "data-disabled").await?.as_deref() == Some("true") {
            return Err(DriverError::OptionDisabled {
                option: describe(label, value),
            });
        }

        let option_value = self.scope.attr(&option, "data-value").await?;
        debug!(
            selector = self.locators.base(),
            ?label,
            option_value = ?option_value,
            "clicking option"
        );
        self.click_option_element(&option).await?;

        if wait_for_selection {
            self.wait_for_committed(label, option_value.as_deref(), false)
                .await?;
        }
        Ok(option_value)
    }

    /// Toggle off a currently selected option (multi-select widgets). Fails
    /// with [`DriverError::NotSelected`] when the option is not selected.
    pub async fn deselect(&self, label: Option<&str>, value: Option<&str>) -> DriverResult<()> {
        if label.is_none() && value.is_none() {
            return Err(DriverError::MissingCriteria);
        }

        let this = self;
        retry_transient("deselect", MAX_ATTEMPTS, move |_| {
            async move {
                this.open_allow_if_open(true).await?;
                let option = this.resolve_option(label, value).await?;
                if this.scope.attr(&option, "data-disabled").await?.as_deref() == Some("true") {
                    return Err(DriverError::OptionDisabled {
                        option: describe(label, value),
                    });
                }
                let option_value = this.scope.attr(&option, "data-value").await?;
                let ov = option_value.as_deref();
                if !this.option_selected(&option, label, ov).await? {
                    return Err(DriverError::NotSelected {
                        option: describe(label, value),
                    });
                }

                this.perform_option_deselection(&option, label, ov).await?;
                this.close_if_open().await?;

                let what = format!("deselection of {}", criteria(label, value));
                wait_until(
                    &what,
                    this.timeouts.default_wait,
                    this.timeouts.poll_interval,
                    move || async move { Ok(!this.selected(label, ov).await?) }.boxed(),
                )
                .await
            }
            .boxed()
        })
        .await
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Precondition guard: fail when the requested option is already the
    /// committed selection. Checked before any click is dispatched.
    async fn guard_already_selected(
        &self,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<()> {
        if let Some(value) = value {
            if self.value_no_wait().await?.as_deref() == Some(value) {
                return Err(DriverError::AlreadyApplied {
                    option: describe(label, Some(value)),
                });
            }
            return Ok(());
        }

        let Some(label) = label else { return Ok(()) };
        match self.label_no_wait().await? {
            Some(current) if current == label => Err(DriverError::AlreadyApplied {
                option: label.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                // No rendered label; resolve the committed value back to its
                // display label before deciding.
                let Some(current_value) =
                    self.value_no_wait().await?.filter(|v| !v.is_empty())
                else {
                    return Ok(());
                };
                if self
                    .selected_label_for_value(&current_value)
                    .await?
                    .as_deref()
                    == Some(label)
                {
                    return Err(DriverError::AlreadyApplied {
                        option: label.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn select_value_and_close(
        &self,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<(Option<String>, bool)> {
        self.open_allow_if_open(true).await?;
        let mut resolved = self.select_option_value(label, value, false).await?;
        if resolved.is_none() && value.is_none() {
            resolved = Some(String::new());
        }
        // Tolerate a transitional blank hidden value only when the caller's
        // expectation is exactly what the click produced.
        let allow_blank = match value {
            Some(v) => resolved.as_deref() == Some(v),
            None => false,
        };
        self.close_if_open().await?;
        Ok((resolved, allow_blank))
    }

    /// Wait until the widget reports the expected committed state. When a
    /// hidden value input exists, value (and blank) checks are
    /// authoritative; otherwise the loose disjunction of label text, hidden
    /// value, and the option's own selected attribute applies.
    async fn wait_for_committed(
        &self,
        label: Option<&str>,
        value: Option<&str>,
        allow_blank: bool,
    ) -> DriverResult<()> {
        let variant = self.variant().await?;

        let outcome = if variant.has_hidden_value_input && value.is_some() {
            let value = value.unwrap_or_default();
            self.wait_for_selector(
                "committed hidden value",
                &self.locators.hidden_value_input_with(value),
                FindOptions::any(),
                self.timeouts.default_wait,
            )
            .await
        } else if variant.has_hidden_value_input && allow_blank {
            self.wait_for_selector(
                "committed blank value",
                &self.locators.hidden_value_input_with(""),
                FindOptions::any(),
                self.timeouts.default_wait,
            )
            .await
        } else {
            let this = self;
            wait_until(
                "committed selection",
                self.timeouts.default_wait,
                self.timeouts.poll_interval,
                move || this.selection_converged(label, value, allow_blank).boxed(),
            )
            .await
        };

        outcome.map_err(|e| match e {
            DriverError::Timeout { waited, .. } => DriverError::SelectionNotConfirmed {
                criteria: criteria(label, value),
                waited,
            },
            other => other,
        })
    }

    async fn selection_converged(
        &self,
        label: Option<&str>,
        value: Option<&str>,
        allow_blank: bool,
    ) -> DriverResult<bool> {
        if self.value_matches(value).await? {
            return Ok(true);
        }
        if self.label_matches(label).await? {
            return Ok(true);
        }
        if let Some(value) = value {
            // Multi-select widgets carry the state on the option itself.
            if self
                .scope
                .has_selector(
                    &self.locators.selected_option_by_value(value),
                    &FindOptions::any(),
                )
                .await?
            {
                return Ok(true);
            }
        }
        if allow_blank
            && self
                .scope
                .has_selector(
                    &self.locators.hidden_value_input_with(""),
                    &FindOptions::any(),
                )
                .await?
        {
            return Ok(true);
        }
        Ok(false)
    }

    async fn option_selected(
        &self,
        option: &ElementHandle,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<bool> {
        if self.scope.attr(option, "data-selected").await?.as_deref() == Some("true") {
            return Ok(true);
        }
        self.selected(label, value).await
    }

    /// Widgets vary in which sub-element dispatches the toggle; try the
    /// container, then the inner presentation-text node, then the inner
    /// presentation node, then the container again.
    async fn perform_option_deselection(
        &self,
        option: &ElementHandle,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<()> {
        self.click_option_element(option).await?;
        if !self.option_selected(option, label, value).await? {
            return Ok(());
        }

        if let Ok(text_node) = self
            .scope
            .find_within(
                option,
                "[data-testid='option-presentation-text']",
                &FindOptions::any(),
            )
            .await
        {
            self.click_option_element(&text_node).await?;
            if !self.option_selected(option, label, value).await? {
                return Ok(());
            }
        }

        if let Ok(presentation) = self
            .scope
            .find_within(
                option,
                "[data-testid='option-presentation']",
                &FindOptions::any(),
            )
            .await
        {
            self.click_option_element(&presentation).await?;
            if !self.option_selected(option, label, value).await? {
                return Ok(());
            }
        }

        self.click_option_element(option).await
    }

    /// Scroll the option into view when needed and click it. A
    /// not-interactable scroll is a timing race, not a failure; the click
    /// itself decides.
    pub(crate) async fn click_option_element(&self, el: &ElementHandle) -> DriverResult<()> {
        if !self.scope.is_visible(el).await? {
            match self.scope.scroll_into_view(el).await {
                Ok(()) | Err(ScopeError::NotInteractable(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.scope.click(el).await?)
    }
}
