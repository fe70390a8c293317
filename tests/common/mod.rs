//! In-process [`Scope`] implementation backed by a small DOM arena and a
//! scripted combobox widget. Re-renders replace nodes wholesale, commits can
//! be delayed by a configurable number of calls, and individual failures
//! (stale clicks, intercepted clicks) can be injected, so every recovery
//! path in the driver is reachable without a browser.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use combo_driver::{ElementHandle, FindOptions, Key, Scope, ScopeError, TextFilter, Visibility};

// ── DOM arena ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<u64>,
    parent: Option<u64>,
    visible: bool,
}

#[derive(Debug)]
struct Dom {
    nodes: HashMap<u64, Node>,
    root: u64,
    next_id: u64,
}

impl Dom {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            1,
            Node {
                tag: "body".to_string(),
                attrs: BTreeMap::new(),
                text: String::new(),
                children: Vec::new(),
                parent: None,
                visible: true,
            },
        );
        Self {
            nodes,
            root: 1,
            next_id: 2,
        }
    }

    fn add(
        &mut self,
        parent: u64,
        tag: &str,
        attrs: &[(&str, &str)],
        text: &str,
        visible: bool,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                tag: tag.to_string(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                text: text.to_string(),
                children: Vec::new(),
                parent: Some(parent),
                visible,
            },
        );
        self.nodes.get_mut(&parent).unwrap().children.push(id);
        id
    }

    fn clear_children(&mut self, id: u64) {
        let children = std::mem::take(&mut self.nodes.get_mut(&id).unwrap().children);
        for child in children {
            self.drop_subtree(child);
        }
    }

    fn drop_subtree(&mut self, id: u64) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }

    fn doc_order(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.walk(self.root, &mut out);
        out
    }

    fn walk(&self, id: u64, out: &mut Vec<u64>) {
        out.push(id);
        for &child in &self.nodes[&id].children {
            self.walk(child, out);
        }
    }

    fn effective_visible(&self, id: u64) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = &self.nodes[&n];
            if !node.visible {
                return false;
            }
            cur = node.parent;
        }
        true
    }

    fn deep_text(&self, id: u64) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, id: u64, parts: &mut Vec<String>) {
        let node = &self.nodes[&id];
        let trimmed = node.text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
        for &child in &node.children {
            self.collect_text(child, parts);
        }
    }

    /// Self-first chain of ancestors up to the root.
    fn chain(&self, id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            out.push(n);
            cur = self.nodes[&n].parent;
        }
        out
    }
}

// ── Selector engine (the attribute-selector subset the driver emits) ────

#[derive(Debug)]
struct Compound {
    tag: Option<String>,
    attrs: Vec<(String, Option<String>)>,
}

fn split_compounds(selector: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quote = false;
    for ch in selector.chars() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                cur.push(ch);
            }
            ' ' if !in_quote => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            _ => cur.push(ch),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn parse_compound(s: &str) -> Compound {
    let Some(bracket) = s.find('[') else {
        return Compound {
            tag: Some(s.to_string()),
            attrs: Vec::new(),
        };
    };
    let tag = if bracket > 0 {
        Some(s[..bracket].to_string())
    } else {
        None
    };
    let mut attrs = Vec::new();
    for part in s[bracket..].split(']') {
        let part = part.trim_start_matches('[');
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((name, value)) => attrs.push((
                name.to_string(),
                Some(value.trim_matches('\'').to_string()),
            )),
            None => attrs.push((part.to_string(), None)),
        }
    }
    Compound { tag, attrs }
}

fn parse_selector(selector: &str) -> Vec<Compound> {
    split_compounds(selector)
        .iter()
        .map(|c| parse_compound(c))
        .collect()
}

fn compound_matches(node: &Node, c: &Compound) -> bool {
    if let Some(tag) = &c.tag {
        if &node.tag != tag {
            return false;
        }
    }
    c.attrs.iter().all(|(name, value)| match value {
        Some(v) => node.attrs.get(name) == Some(v),
        None => node.attrs.contains_key(name),
    })
}

fn matches_path(dom: &Dom, id: u64, compounds: &[Compound]) -> bool {
    let Some((last, ancestors)) = compounds.split_last() else {
        return false;
    };
    if !compound_matches(&dom.nodes[&id], last) {
        return false;
    }
    let mut want = ancestors.len();
    let mut cur = dom.nodes[&id].parent;
    while want > 0 {
        let Some(n) = cur else { return false };
        if compound_matches(&dom.nodes[&n], &ancestors[want - 1]) {
            want -= 1;
        }
        cur = dom.nodes[&n].parent;
    }
    true
}

fn query(dom: &Dom, selector: &str) -> Vec<u64> {
    let compounds = parse_selector(selector);
    if compounds.is_empty() {
        return Vec::new();
    }
    dom.doc_order()
        .into_iter()
        .filter(|&id| matches_path(dom, id, &compounds))
        .collect()
}

// ── Scripted widget ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OptDef {
    pub label: String,
    pub value: String,
    pub disabled: bool,
}

impl OptDef {
    pub fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            disabled: false,
        }
    }

    pub fn disabled(label: &str, value: &str) -> Self {
        Self {
            disabled: true,
            ..Self::new(label, value)
        }
    }
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub id: String,
    pub multi: bool,
    pub searchable: bool,
    pub options: Vec<OptDef>,
    /// Lazy widgets render only the first N options until a search narrows
    /// the list; `None` renders everything.
    pub initial_visible: Option<usize>,
    /// Scope calls between an option click and the committed state becoming
    /// observable (single-select only).
    pub commit_delay: u64,
    /// Some widgets have no dedicated select-container wrapper; clicks land
    /// on the current-selected region instead.
    pub has_select_container: bool,
    /// Bare widgets render no current-selected region at all; the widget
    /// root is the only clickable surface.
    pub has_current_selected: bool,
}

impl WidgetConfig {
    pub fn single(id: &str, options: Vec<OptDef>) -> Self {
        Self {
            id: id.to_string(),
            multi: false,
            searchable: true,
            options,
            initial_visible: None,
            commit_delay: 2,
            has_select_container: true,
            has_current_selected: true,
        }
    }

    pub fn multi(id: &str, options: Vec<OptDef>) -> Self {
        Self {
            id: id.to_string(),
            multi: true,
            searchable: false,
            options,
            initial_visible: None,
            commit_delay: 0,
            has_select_container: true,
            has_current_selected: true,
        }
    }
}

/// Search matches against the option name before any parenthetical suffix,
/// the way country-code pickers filter.
fn search_matches(label: &str, term: &str) -> bool {
    let name = label.split(" (").next().unwrap_or(label);
    name.to_lowercase().contains(&term.to_lowercase())
}

fn surfaced_options(cfg: &WidgetConfig, filter: Option<&str>) -> Vec<OptDef> {
    match filter {
        Some(term) if !term.is_empty() => cfg
            .options
            .iter()
            .filter(|o| search_matches(&o.label, term))
            .cloned()
            .collect(),
        _ => match cfg.initial_visible {
            Some(n) => cfg.options.iter().take(n).cloned().collect(),
            None => cfg.options.clone(),
        },
    }
}

struct State {
    dom: Dom,
    cfg: WidgetConfig,
    opened: bool,
    filter: Option<String>,
    committed_value: Option<String>,
    committed_label: Option<String>,
    selected_values: Vec<String>,
    tick: u64,
    pending_commit: Option<(u64, String, String)>,
    // instrumentation
    clicks: usize,
    pointer_clicks: usize,
    keys: usize,
    option_clicks: Vec<String>,
    typed_terms: Vec<String>,
    stale_option_clicks: usize,
    intercept_open_clicks: usize,
    stubborn_deselect: bool,
    last_open_click: Option<String>,
}

impl State {
    fn step(&mut self) {
        self.tick += 1;
        if let Some((due, value, label)) = self.pending_commit.clone() {
            if self.tick >= due {
                self.pending_commit = None;
                self.committed_value = Some(value);
                self.committed_label = Some(label);
                render(self);
            }
        }
    }
}

fn render(st: &mut State) {
    let body = st.dom.root;
    st.dom.clear_children(body);

    st.dom
        .add(body, "div", &[("data-testid", "outside")], "elsewhere", true);

    let opened = if st.opened { "true" } else { "false" };
    let base = st.dom.add(
        body,
        "div",
        &[
            ("data-component", "combo-select"),
            ("data-id", &st.cfg.id),
            ("data-opened", opened),
        ],
        "",
        true,
    );
    let container = if st.cfg.has_select_container {
        st.dom
            .add(base, "div", &[("data-class", "select-container")], "", true)
    } else {
        base
    };
    if st.cfg.has_current_selected {
        render_current_selected(st, container);
    }

    if st.cfg.searchable && st.opened {
        let filter = st.filter.clone().unwrap_or_default();
        st.dom.add(
            container,
            "input",
            &[("data-class", "search-text-input"), ("value", &filter)],
            "",
            true,
        );
    }

    // Multi-select widgets keep their option list in the DOM and only hide
    // it; single-select widgets unmount it entirely.
    if st.opened || st.cfg.multi {
        let oc = st.dom.add(
            body,
            "div",
            &[
                ("data-class", "options-container"),
                ("data-id", &st.cfg.id),
            ],
            "",
            st.opened,
        );
        let surfaced = surfaced_options(&st.cfg, st.filter.as_deref());
        if surfaced.is_empty() {
            st.dom.add(
                oc,
                "div",
                &[("data-class", "no-options-container")],
                "No options",
                true,
            );
        }
        for opt in &surfaced {
            let selected = if st.cfg.multi {
                st.selected_values.contains(&opt.value)
            } else {
                st.committed_value.as_deref() == Some(opt.value.as_str())
            };
            let node = st.dom.add(
                oc,
                "div",
                &[
                    ("data-class", "select-option"),
                    ("data-value", &opt.value),
                    ("data-text", &opt.label),
                    ("data-selected", if selected { "true" } else { "false" }),
                    ("data-disabled", if opt.disabled { "true" } else { "false" }),
                ],
                "",
                true,
            );
            let pres = st.dom.add(
                node,
                "div",
                &[
                    ("data-testid", "option-presentation"),
                    ("data-text", &opt.label),
                    ("data-value", &opt.value),
                ],
                "",
                true,
            );
            st.dom.add(
                pres,
                "span",
                &[("data-testid", "option-presentation-text")],
                &opt.label,
                true,
            );
        }
    }
}

fn render_current_selected(st: &mut State, container: u64) {
    let current = st
        .dom
        .add(container, "div", &[("data-class", "current-selected")], "", true);

    if st.cfg.multi {
        let selected = st.selected_values.clone();
        for value in &selected {
            let label = st
                .cfg
                .options
                .iter()
                .find(|o| &o.value == value)
                .map(|o| o.label.clone())
                .unwrap_or_default();
            let pres = st.dom.add(
                current,
                "div",
                &[
                    ("data-testid", "option-presentation"),
                    ("data-text", &label),
                    ("data-value", value),
                    ("data-toggle-icon", "check"),
                    ("data-toggle-value", "true"),
                ],
                "",
                true,
            );
            st.dom.add(
                pres,
                "span",
                &[("data-testid", "option-presentation-text")],
                &label,
                true,
            );
        }
    } else {
        let value = st.committed_value.clone().unwrap_or_default();
        st.dom.add(
            current,
            "input",
            &[("type", "hidden"), ("value", &value)],
            "",
            false,
        );
        if let Some(label) = st.committed_label.clone() {
            let cur_opt = st
                .dom
                .add(current, "div", &[("data-class", "current-option")], "", true);
            let pres = st.dom.add(
                cur_opt,
                "div",
                &[
                    ("data-testid", "option-presentation"),
                    ("data-text", &label),
                    ("data-value", &value),
                ],
                "",
                true,
            );
            st.dom.add(
                pres,
                "span",
                &[("data-testid", "option-presentation-text")],
                &label,
                true,
            );
        }
    }
}

fn close_widget(st: &mut State) {
    st.opened = false;
    st.filter = None;
    render(st);
}

fn attr_of(st: &State, n: u64, name: &str) -> Option<String> {
    st.dom.nodes[&n].attrs.get(name).cloned()
}

fn chain_has(st: &State, chain: &[u64], name: &str, value: &str) -> bool {
    chain
        .iter()
        .any(|&n| attr_of(st, n, name).as_deref() == Some(value))
}

fn dispatch_click(st: &mut State, id: u64, pointer: bool) -> Result<(), ScopeError> {
    let chain = st.dom.chain(id);

    if chain_has(st, &chain, "data-class", "search-text-input") {
        close_widget(st);
        return Ok(());
    }

    if let Some(&opt_id) = chain
        .iter()
        .find(|&&n| attr_of(st, n, "data-class").as_deref() == Some("select-option"))
    {
        if st.stale_option_clicks > 0 {
            st.stale_option_clicks -= 1;
            return Err(ScopeError::Stale("option node was re-rendered".to_string()));
        }
        let value = attr_of(st, opt_id, "data-value").unwrap_or_default();
        let label = attr_of(st, opt_id, "data-text").unwrap_or_default();
        let disabled = attr_of(st, opt_id, "data-disabled").as_deref() == Some("true");
        st.option_clicks.push(value.clone());
        if disabled {
            return Ok(());
        }
        if st.cfg.multi {
            let selected_now = st.selected_values.contains(&value);
            if selected_now && st.stubborn_deselect && id == opt_id {
                // Container clicks bounce off; only inner nodes toggle off.
                return Ok(());
            }
            if selected_now {
                st.selected_values.retain(|v| v != &value);
            } else {
                st.selected_values.push(value);
            }
            render(st);
        } else {
            let due = st.tick + st.cfg.commit_delay;
            st.pending_commit = Some((due, value, label));
            if st.cfg.commit_delay == 0 {
                st.step();
            }
        }
        return Ok(());
    }

    if chain_has(st, &chain, "data-component", "combo-select") {
        if !st.opened {
            if !pointer && st.intercept_open_clicks > 0 {
                st.intercept_open_clicks -= 1;
                return Err(ScopeError::ClickIntercepted(
                    "an overlay would receive the click".to_string(),
                ));
            }
            st.opened = true;
            st.filter = None;
            let clicked =
                attr_of(st, id, "data-class").or_else(|| attr_of(st, id, "data-component"));
            st.last_open_click = clicked;
            render(st);
        }
        return Ok(());
    }

    if st.opened {
        close_widget(st);
    }
    Ok(())
}

// ── The fake scope ──────────────────────────────────────────────────────

pub struct FakeScope {
    state: Mutex<State>,
}

impl FakeScope {
    pub fn new(cfg: WidgetConfig) -> Self {
        let mut st = State {
            dom: Dom::new(),
            cfg,
            opened: false,
            filter: None,
            committed_value: None,
            committed_label: None,
            selected_values: Vec::new(),
            tick: 0,
            pending_commit: None,
            clicks: 0,
            pointer_clicks: 0,
            keys: 0,
            option_clicks: Vec::new(),
            typed_terms: Vec::new(),
            stale_option_clicks: 0,
            intercept_open_clicks: 0,
            stubborn_deselect: false,
            last_open_click: None,
        };
        render(&mut st);
        Self {
            state: Mutex::new(st),
        }
    }

    /// Mark an option committed/selected without any clicks happening.
    pub fn preselect(&self, value: &str) {
        let mut st = self.state.lock().unwrap();
        let label = st
            .cfg
            .options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.clone())
            .unwrap_or_default();
        if st.cfg.multi {
            st.selected_values.push(value.to_string());
        } else {
            st.committed_value = Some(value.to_string());
            st.committed_label = Some(label);
        }
        render(&mut st);
    }

    /// Commit a value without rendering a display label, like widgets that
    /// only carry the hidden input until the next hydration pass.
    pub fn commit_value_only(&self, value: &str) {
        let mut st = self.state.lock().unwrap();
        st.committed_value = Some(value.to_string());
        st.committed_label = None;
        render(&mut st);
    }

    /// Fail the next option click with a stale-reference error.
    pub fn inject_stale_option_click(&self) {
        self.state.lock().unwrap().stale_option_clicks += 1;
    }

    /// Intercept the next direct click on the closed widget's open target.
    pub fn inject_intercepted_open_click(&self) {
        self.state.lock().unwrap().intercept_open_clicks += 1;
    }

    /// Selected options ignore direct container clicks when toggling off.
    pub fn set_stubborn_deselect(&self) {
        self.state.lock().unwrap().stubborn_deselect = true;
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().unwrap().clicks
    }

    pub fn pointer_clicks(&self) -> usize {
        self.state.lock().unwrap().pointer_clicks
    }

    pub fn keys(&self) -> usize {
        self.state.lock().unwrap().keys
    }

    pub fn option_clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().option_clicks.clone()
    }

    pub fn typed_terms(&self) -> Vec<String> {
        self.state.lock().unwrap().typed_terms.clone()
    }

    /// `data-class` of the node whose click most recently opened the widget.
    pub fn last_open_click(&self) -> Option<String> {
        self.state.lock().unwrap().last_open_click.clone()
    }

    pub fn is_widget_open(&self) -> bool {
        self.state.lock().unwrap().opened
    }

    pub fn committed(&self) -> (Option<String>, Option<String>) {
        let st = self.state.lock().unwrap();
        (st.committed_label.clone(), st.committed_value.clone())
    }

    pub fn selected_values(&self) -> Vec<String> {
        self.state.lock().unwrap().selected_values.clone()
    }
}

fn passes(st: &State, id: u64, opts: &FindOptions) -> bool {
    let visible = st.dom.effective_visible(id);
    let vis_ok = match opts.visibility {
        Visibility::Visible => visible,
        Visibility::Hidden => !visible,
        Visibility::Any => true,
    };
    if !vis_ok {
        return false;
    }
    match &opts.text {
        None => true,
        Some(TextFilter::Exact(t)) => st.dom.deep_text(id) == *t,
        Some(TextFilter::Contains(t)) => st.dom.deep_text(id).contains(t.as_str()),
    }
}

/// Matches the production backend's handle model: handles re-resolve by
/// selector plus position in the unfiltered match list, and go stale when
/// that position no longer resolves.
fn resolve(st: &State, el: &ElementHandle) -> Result<u64, ScopeError> {
    query(&st.dom, &el.selector)
        .get(el.index)
        .copied()
        .ok_or_else(|| ScopeError::Stale(el.selector.clone()))
}

fn matches_with_opts(st: &State, selector: &str, opts: &FindOptions) -> Vec<(usize, u64)> {
    query(&st.dom, selector)
        .into_iter()
        .enumerate()
        .filter(|&(_, id)| passes(st, id, opts))
        .collect()
}

fn handle(selector: &str, index: usize, token: u64) -> ElementHandle {
    ElementHandle {
        selector: selector.to_string(),
        index,
        token,
    }
}

#[async_trait]
impl Scope for FakeScope {
    async fn find(&self, selector: &str, opts: &FindOptions) -> Result<ElementHandle, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        matches_with_opts(&st, selector, opts)
            .first()
            .map(|&(idx, id)| handle(selector, idx, id))
            .ok_or_else(|| ScopeError::NotFound(selector.to_string()))
    }

    async fn find_all(
        &self,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<Vec<ElementHandle>, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        Ok(matches_with_opts(&st, selector, opts)
            .into_iter()
            .map(|(idx, id)| handle(selector, idx, id))
            .collect())
    }

    async fn has_selector(&self, selector: &str, opts: &FindOptions) -> Result<bool, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        Ok(!matches_with_opts(&st, selector, opts).is_empty())
    }

    async fn click(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        st.clicks += 1;
        dispatch_click(&mut st, id, false)
    }

    async fn pointer_click(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        st.pointer_clicks += 1;
        dispatch_click(&mut st, id, true)
    }

    async fn scroll_into_view(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        resolve(&st, el)?;
        Ok(())
    }

    async fn set_text(&self, el: &ElementHandle, text: &str) -> Result<(), ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        let is_search = st.dom.nodes[&id].attrs.get("data-class").map(String::as_str)
            == Some("search-text-input");
        st.dom
            .nodes
            .get_mut(&id)
            .unwrap()
            .attrs
            .insert("value".to_string(), text.to_string());
        if is_search {
            st.typed_terms.push(text.to_string());
            st.filter = Some(text.to_string());
            render(&mut st);
        }
        Ok(())
    }

    async fn send_key(&self, el: &ElementHandle, key: Key) -> Result<(), ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        resolve(&st, el)?;
        st.keys += 1;
        if key == Key::Escape && st.opened {
            close_widget(&mut st);
        }
        Ok(())
    }

    async fn send_key_to_body(&self, key: Key) -> Result<(), ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        st.keys += 1;
        if key == Key::Escape && st.opened {
            close_widget(&mut st);
        }
        Ok(())
    }

    async fn attr(&self, el: &ElementHandle, name: &str) -> Result<Option<String>, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        Ok(st.dom.nodes[&id].attrs.get(name).cloned())
    }

    async fn input_value(&self, el: &ElementHandle) -> Result<Option<String>, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        Ok(st.dom.nodes[&id].attrs.get("value").cloned())
    }

    async fn text(&self, el: &ElementHandle) -> Result<String, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        Ok(st.dom.deep_text(id))
    }

    async fn is_visible(&self, el: &ElementHandle) -> Result<bool, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        Ok(st.dom.effective_visible(id))
    }

    async fn enclosing(
        &self,
        el: &ElementHandle,
        ancestor_selector: &str,
    ) -> Result<ElementHandle, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let id = resolve(&st, el)?;
        let compounds = parse_selector(ancestor_selector);
        for node in st.dom.chain(id) {
            if compounds.len() == 1 && compound_matches(&st.dom.nodes[&node], &compounds[0]) {
                let idx = query(&st.dom, ancestor_selector)
                    .iter()
                    .position(|&n| n == node)
                    .unwrap_or(0);
                return Ok(handle(ancestor_selector, idx, node));
            }
        }
        Err(ScopeError::NotFound(ancestor_selector.to_string()))
    }

    async fn find_within(
        &self,
        el: &ElementHandle,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<ElementHandle, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let scope_id = resolve(&st, el)?;
        let global = query(&st.dom, selector);
        let mut descendants = Vec::new();
        st.dom.walk(scope_id, &mut descendants);
        for node in descendants.into_iter().skip(1) {
            if let Some(idx) = global.iter().position(|&n| n == node) {
                if passes(&st, node, opts) {
                    return Ok(handle(selector, idx, node));
                }
            }
        }
        Err(ScopeError::NotFound(selector.to_string()))
    }

    async fn find_all_within(
        &self,
        el: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, ScopeError> {
        let mut st = self.state.lock().unwrap();
        st.step();
        let scope_id = resolve(&st, el)?;
        let global = query(&st.dom, selector);
        let mut descendants = Vec::new();
        st.dom.walk(scope_id, &mut descendants);
        Ok(descendants
            .into_iter()
            .skip(1)
            .filter_map(|node| {
                global
                    .iter()
                    .position(|&n| n == node)
                    .map(|idx| handle(selector, idx, node))
            })
            .collect())
    }
}
