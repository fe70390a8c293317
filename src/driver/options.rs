//! Option resolver: finds the target option element for a label/value pair,
//! falling back to search-box filtering with derived term variants when the
//! option is not in the initially rendered list.

use futures::FutureExt;
use tracing::debug;

use crate::error::{DriverError, DriverResult, ScopeError};
use crate::interaction::retry::{retry_transient, MAX_ATTEMPTS};
use crate::interaction::wait::wait_until;
use crate::scope::{ElementHandle, FindOptions};

use super::{criteria, ComboSelect};

/// Terms to try in the widget's search box for a label: the full label, then
/// the prefix before a parenthetical suffix (`"Denmark (+45)"` also tries
/// `"Denmark"`).
pub(crate) fn search_terms_for(label: &str) -> Vec<String> {
    let mut terms = vec![label.to_string()];
    if let Some((prefix, _)) = label.split_once(" (") {
        if !prefix.is_empty() {
            terms.push(prefix.to_string());
        }
    }
    terms
}

impl ComboSelect {
    /// Type `term` into the widget's search input, replacing any previous
    /// filter text.
    pub async fn search(&self, term: &str) -> DriverResult<()> {
        let this = self;
        retry_transient("search", MAX_ATTEMPTS, move |_| {
            async move {
                this.wait_for_selector(
                    "search input",
                    this.locators.search_input(),
                    FindOptions::visible(),
                    this.timeouts.default_wait,
                )
                .await?;
                let input = this
                    .scope
                    .find(this.locators.search_input(), &FindOptions::visible())
                    .await?;
                Ok(this.scope.set_text(&input, term).await?)
            }
            .boxed()
        })
        .await
    }

    /// Resolve the option element for the given criteria, searching when the
    /// widget supports it. A value is authoritative over a label.
    pub(crate) async fn resolve_option(
        &self,
        label: Option<&str>,
        value: Option<&str>,
    ) -> DriverResult<ElementHandle> {
        let selector = self.locators.option_selector_for(label, value);

        if !self.option_present(&selector, label).await? {
            let variant = self.variant().await?;
            if variant.has_search_input {
                if let Some(label) = label {
                    self.surface_via_search(&selector, label).await?;
                }
            }
        }

        // Final unconditional wait; a timeout here is the not-found verdict.
        let this = self;
        let sel: &str = &selector;
        let outcome = wait_until(
            "option",
            self.timeouts.default_wait,
            self.timeouts.poll_interval,
            move || this.option_present(sel, label).boxed(),
        )
        .await;
        if let Err(e) = outcome {
            return Err(match e {
                DriverError::Timeout { .. } => DriverError::OptionNotFound {
                    selector: selector.clone(),
                    criteria: criteria(label, value),
                },
                other => other,
            });
        }

        self.find_option_element(&selector, label).await
    }

    /// Whether the option is rendered: either the criteria selector matches,
    /// or (for labels) an option presentation-text node carries the exact
    /// label.
    pub(crate) async fn option_present(
        &self,
        selector: &str,
        label: Option<&str>,
    ) -> DriverResult<bool> {
        let any = FindOptions::any();
        if self.scope.has_selector(selector, &any).await? {
            return Ok(true);
        }
        if let Some(label) = label {
            return Ok(self
                .scope
                .has_selector(
                    self.locators.option_label_text(),
                    &FindOptions::any().with_exact_text(label),
                )
                .await?);
        }
        Ok(false)
    }

    /// Try each derived search term until one surfaces the option. A term
    /// "lands" when the option appears, or when the rendered option list
    /// demonstrably changed while the input still holds the term (a
    /// no-results render for that term) — then the next term gets its turn.
    async fn surface_via_search(&self, selector: &str, label: &str) -> DriverResult<()> {
        for term in search_terms_for(label) {
            let previous_text = self.options_container_text().await?;
            debug!(
                selector = self.locators.base(),
                term = %term,
                "filtering options via search input"
            );
            self.search(&term).await?;

            let this = self;
            let term_ref: &str = &term;
            let prev = previous_text.as_deref();
            let outcome = wait_until(
                "option or filtered render",
                self.timeouts.default_wait,
                self.timeouts.poll_interval,
                move || {
                    async move {
                        if this.option_present(selector, Some(label)).await? {
                            return Ok(true);
                        }
                        this.options_container_updated(term_ref, prev).await
                    }
                    .boxed()
                },
            )
            .await;

            match outcome {
                Ok(()) => {
                    if self.option_present(selector, Some(label)).await? {
                        return Ok(());
                    }
                    // The render changed but the option is not there; the
                    // next term variant may match.
                }
                Err(DriverError::Timeout { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Guard against matching on a stale render: the no-results indicator is
    /// up, the input still holds the typed term, and the container's text
    /// differs from what was recorded before typing.
    async fn options_container_updated(
        &self,
        term: &str,
        previous_text: Option<&str>,
    ) -> DriverResult<bool> {
        let any = FindOptions::any();
        if !self
            .scope
            .has_selector(self.locators.no_options(), &any)
            .await?
        {
            return Ok(false);
        }
        if self.search_input_value().await?.as_deref() != Some(term) {
            return Ok(false);
        }
        let Some(previous_text) = previous_text else {
            return Ok(false);
        };
        Ok(self.options_container_text().await?.as_deref() != Some(previous_text))
    }

    async fn options_container_text(&self) -> DriverResult<Option<String>> {
        match self
            .scope
            .find(self.locators.options_container(), &FindOptions::any())
            .await
        {
            Ok(el) => Ok(Some(self.scope.text(&el).await?)),
            Err(ScopeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn search_input_value(&self) -> DriverResult<Option<String>> {
        match self
            .scope
            .find(self.locators.search_input(), &FindOptions::any())
            .await
        {
            Ok(el) => Ok(self.scope.input_value(&el).await?),
            Err(ScopeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the clickable option container for a matched node. A
    /// value-scoped match is the container itself; a presentation or
    /// label-text match walks up to its enclosing option container, since
    /// the hit target and the data-bearing node can differ.
    async fn find_option_element(
        &self,
        selector: &str,
        label: Option<&str>,
    ) -> DriverResult<ElementHandle> {
        let any = FindOptions::any();

        if selector.starts_with(self.locators.option_container()) {
            return Ok(self.scope.find(selector, &any).await?);
        }

        if self.scope.has_selector(selector, &any).await? {
            let node = self.scope.find(selector, &any).await?;
            return Ok(self
                .scope
                .enclosing(&node, self.locators.option_container_class())
                .await?);
        }

        let Some(label) = label else {
            return Ok(self.scope.find(selector, &any).await?);
        };
        let text_node = self
            .scope
            .find(
                self.locators.option_label_text(),
                &FindOptions::any().with_exact_text(label),
            )
            .await?;
        Ok(self
            .scope
            .enclosing(&text_node, self.locators.option_container_class())
            .await?)
    }
}
