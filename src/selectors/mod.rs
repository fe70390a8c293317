//! Locator model: deterministic CSS attribute selectors for one widget
//! instance, built purely from its identity and match criteria. Building a
//! selector never touches the live page.
//!
//! The widget markup contract (produced by the page, consumed read-only
//! here): a root carrying `data-component`/`data-id`/`data-opened`, a
//! `current-selected` region with an optional hidden value input, an
//! `options-container` keyed by the same id, option nodes carrying
//! `data-value`/`data-disabled`/`data-selected`, and optionally a search
//! input and a no-options indicator.

/// `data-component` value identifying the widget root.
pub const WIDGET_COMPONENT: &str = "combo-select";

/// Precomputed selectors for every region of a single widget instance.
///
/// Distinct ids never collide: the id is embedded in every root- and
/// options-container-scoped selector.
#[derive(Debug, Clone)]
pub struct WidgetLocators {
    base: String,
    base_closed: String,
    base_opened: String,
    current_selected: String,
    closed_current_selected: String,
    opened_current_selected: String,
    current_option: String,
    hidden_value_input: String,
    options_container: String,
    option_container: String,
    option_presentation: String,
    option_label_text: String,
    search_input: String,
    no_options: String,
    select_container: String,
    toggle_presentations: String,
    current_selected_presentation_text: String,
}

impl WidgetLocators {
    pub fn new(id: &str) -> Self {
        let base = format!("[data-component='{WIDGET_COMPONENT}'][data-id='{id}']");
        let current_selected = format!("{base} [data-class='current-selected']");
        let options_container = format!("[data-class='options-container'][data-id='{id}']");
        let option_container = format!("{options_container} [data-class='select-option']");
        Self {
            base_closed: format!("{base}[data-opened='false']"),
            base_opened: format!("{base}[data-opened='true']"),
            closed_current_selected: format!(
                "{base}[data-opened='false'] [data-class='current-selected']"
            ),
            opened_current_selected: format!(
                "{base}[data-opened='true'] [data-class='current-selected']"
            ),
            current_option: format!("{current_selected} [data-class='current-option']"),
            hidden_value_input: format!("{current_selected} input[type='hidden']"),
            option_presentation: format!(
                "{options_container} [data-testid='option-presentation']"
            ),
            option_label_text: format!(
                "{options_container} [data-testid='option-presentation-text']"
            ),
            search_input: format!("{base} [data-class='search-text-input']"),
            no_options: format!("{options_container} [data-class='no-options-container']"),
            select_container: format!("{base} [data-class='select-container']"),
            toggle_presentations: format!("{base} [data-testid='option-presentation']"),
            current_selected_presentation_text: format!(
                "{current_selected} [data-testid='option-presentation-text']"
            ),
            base,
            current_selected,
            options_container,
            option_container,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn base_closed(&self) -> &str {
        &self.base_closed
    }

    pub fn base_opened(&self) -> &str {
        &self.base_opened
    }

    pub fn current_selected(&self) -> &str {
        &self.current_selected
    }

    pub fn closed_current_selected(&self) -> &str {
        &self.closed_current_selected
    }

    pub fn opened_current_selected(&self) -> &str {
        &self.opened_current_selected
    }

    pub fn current_option(&self) -> &str {
        &self.current_option
    }

    pub fn hidden_value_input(&self) -> &str {
        &self.hidden_value_input
    }

    pub fn hidden_value_input_with(&self, value: &str) -> String {
        format!("{}[value='{value}']", self.hidden_value_input)
    }

    pub fn options_container(&self) -> &str {
        &self.options_container
    }

    pub fn option_container(&self) -> &str {
        &self.option_container
    }

    /// Unscoped option-container class, for walking up from an inner
    /// presentation node to its enclosing clickable option.
    pub fn option_container_class(&self) -> &'static str {
        "[data-class='select-option']"
    }

    pub fn option_by_value(&self, value: &str) -> String {
        format!("{}[data-value='{value}']", self.option_container)
    }

    pub fn selected_option_by_value(&self, value: &str) -> String {
        format!("{}[data-selected='true']", self.option_by_value(value))
    }

    pub fn selected_options(&self) -> String {
        format!("{}[data-selected='true']", self.option_container)
    }

    pub fn option_presentation(&self) -> &str {
        &self.option_presentation
    }

    pub fn option_presentation_by_label(&self, label: &str) -> String {
        format!("{}[data-text='{label}']", self.option_presentation)
    }

    pub fn option_label_text(&self) -> &str {
        &self.option_label_text
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn no_options(&self) -> &str {
        &self.no_options
    }

    pub fn select_container(&self) -> &str {
        &self.select_container
    }

    pub fn toggle_presentations(&self) -> &str {
        &self.toggle_presentations
    }

    pub fn current_selected_presentation_text(&self) -> &str {
        &self.current_selected_presentation_text
    }

    pub fn current_selected_presentation_by_label(&self, label: &str) -> String {
        format!(
            "{} [data-testid='option-presentation'][data-text='{label}']",
            self.current_selected
        )
    }

    /// Selector for the option matching the given criteria. A supplied value
    /// is authoritative: it addresses the option container directly and wins
    /// even when a label is also given. A label alone addresses the option's
    /// presentation node by its display-text attribute.
    pub fn option_selector_for(&self, label: Option<&str>, value: Option<&str>) -> String {
        if let Some(value) = value {
            return self.option_by_value(value);
        }
        match label {
            Some(label) => self.option_presentation_by_label(label),
            None => self.option_presentation.clone(),
        }
    }
}
