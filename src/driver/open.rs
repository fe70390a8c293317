//! Open/close controller: drives the widget between closed and open, with
//! click-target fallbacks on the way in and escape/outside-click fallbacks
//! on the way out.

use futures::FutureExt;
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::interaction::retry::MAX_ATTEMPTS;
use crate::scope::{FindOptions, Key};

use super::ComboSelect;

impl ComboSelect {
    /// Open the widget. Fails with [`DriverError::AlreadyOpen`] when it is
    /// already open.
    pub async fn open(&self) -> DriverResult<()> {
        self.open_allow_if_open(false).await
    }

    /// Open the widget; with `allow_if_open`, an already-open widget is a
    /// no-op instead of an error.
    pub async fn open_allow_if_open(&self, allow_if_open: bool) -> DriverResult<()> {
        if self.is_open().await? {
            if allow_if_open {
                return Ok(());
            }
            return Err(DriverError::AlreadyOpen {
                selector: self.locators.base().to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_open().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    debug!(
                        selector = self.locators.base(),
                        attempt,
                        error = %e,
                        "open attempt failed"
                    );
                    if attempt >= MAX_ATTEMPTS {
                        return Err(DriverError::OpenFailed {
                            selector: self.locators.base().to_string(),
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_open(&self) -> DriverResult<()> {
        self.wait_for_selector(
            "closed widget marker",
            self.locators.base_closed(),
            FindOptions::any(),
            self.timeouts.state_wait,
        )
        .await?;
        self.click_open_target().await?;
        self.wait_for_selector(
            "options container",
            self.locators.options_container(),
            FindOptions::any(),
            self.timeouts.default_wait,
        )
        .await
    }

    /// Click-target priority: dedicated select container, then the current
    /// selection region, then the widget root.
    async fn click_open_target(&self) -> DriverResult<()> {
        let any = FindOptions::any();
        let target = if self
            .scope
            .has_selector(self.locators.select_container(), &any)
            .await?
        {
            self.locators.select_container()
        } else if self
            .scope
            .has_selector(self.locators.current_selected(), &any)
            .await?
        {
            self.locators.current_selected()
        } else {
            self.locators.base()
        };

        let el = self.scope.find(target, &any).await?;
        self.scope.scroll_into_view(&el).await?;
        self.click_safely(&el).await?;
        Ok(())
    }

    /// Strict close: defocus via the search input and wait for the opened
    /// marker to disappear.
    pub async fn close(&self) -> DriverResult<()> {
        self.wait_for_selector(
            "opened widget",
            self.locators.opened_current_selected(),
            FindOptions::visible(),
            self.timeouts.default_wait,
        )
        .await?;
        let input = self
            .scope
            .find(self.locators.search_input(), &FindOptions::visible())
            .await?;
        self.scope.click(&input).await?;
        self.wait_for_no_selector(
            "opened widget",
            self.locators.opened_current_selected(),
            FindOptions::visible(),
            self.timeouts.default_wait,
        )
        .await
    }

    /// Best-effort close. Runs up to three rounds of defocus / escape /
    /// outside-click, then one last escape-and-click fallback. Failure to
    /// close is not fatal; callers needing a closed widget poll explicitly.
    pub async fn close_if_open(&self) -> DriverResult<()> {
        if !self.is_open().await? {
            return Ok(());
        }

        let mut rounds = 0;
        while self.is_open().await? && rounds < MAX_ATTEMPTS {
            self.close_round().await;
            if self.closed_after_short_wait().await {
                return Ok(());
            }
            rounds += 1;
        }

        if !self.is_open().await? {
            return Ok(());
        }

        debug!(
            selector = self.locators.base(),
            "widget still open after close rounds, trying body escape"
        );
        let _ = self.scope.send_key_to_body(Key::Escape).await;
        if self.closed_after_short_wait().await {
            return Ok(());
        }
        self.click_outside().await;
        self.closed_after_short_wait().await;
        Ok(())
    }

    async fn close_round(&self) {
        self.defocus_search_input().await;
        self.send_close_escape().await;
        self.click_outside().await;
    }

    async fn defocus_search_input(&self) {
        let any = FindOptions::any();
        match self.scope.has_selector(self.locators.search_input(), &any).await {
            Ok(true) => {}
            _ => return,
        }
        if let Ok(input) = self.scope.find(self.locators.search_input(), &any).await {
            let _ = self.click_safely(&input).await;
            let _ = self.scope.send_key(&input, Key::Escape).await;
            let _ = self.scope.send_key(&input, Key::Tab).await;
        }
    }

    async fn send_close_escape(&self) {
        if let Ok(container) = self
            .scope
            .find(self.locators.select_container(), &FindOptions::any())
            .await
        {
            if self.scope.send_key(&container, Key::Escape).await.is_ok() {
                return;
            }
        }
        let _ = self.scope.send_key_to_body(Key::Escape).await;
    }

    async fn click_outside(&self) {
        if let Some(target) = &self.outside_target {
            if let Ok(el) = self.scope.find(target, &FindOptions::any()).await {
                let _ = self.scope.pointer_click(&el).await;
                return;
            }
        }
        if let Ok(body) = self.scope.find("body", &FindOptions::any()).await {
            let _ = self.scope.pointer_click(&body).await;
        }
    }

    async fn closed_after_short_wait(&self) -> bool {
        let this = self;
        crate::interaction::wait::wait_for_absence(
            "options container",
            self.timeouts.short_wait,
            self.timeouts.poll_interval,
            move || {
                async move {
                    Ok(this
                        .scope
                        .has_selector(this.locators.options_container(), &FindOptions::any())
                        .await?)
                }
                .boxed()
            },
        )
        .await
        .is_ok()
    }
}
