//! CDP-backed [`Scope`] implementation over a `chromiumoxide` page.
//!
//! Elements are re-resolved by selector + match index on every call; no CDP
//! object ids are held between calls. A handle whose node was replaced
//! between calls stops resolving and surfaces as `Stale`, which is exactly
//! the class the driver's retry discipline recovers from.
//!
//! All selector and text literals are embedded into evaluated scripts via
//! `serde_json::to_string`, never by raw interpolation.

use anyhow::anyhow;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::page::Page;

use super::{ElementHandle, FindOptions, Key, Scope, TextFilter, Visibility};
use crate::error::ScopeError;

/// JS helpers shared by the evaluated snippets: visibility and trimmed-text
/// probes matching the find filters.
const HELPERS_JS: &str = r#"
    const __vis = (el) => {
        const r = el.getBoundingClientRect();
        if (r.width === 0 && r.height === 0) return false;
        const s = getComputedStyle(el);
        return s.display !== 'none' && s.visibility !== 'hidden' && parseFloat(s.opacity) !== 0;
    };
    const __txt = (el) => (el.textContent || '').trim();
"#;

pub struct CdpScope {
    page: Page,
}

impl CdpScope {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval(&self, js: &str) -> Result<serde_json::Value, ScopeError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| ScopeError::Other(anyhow!("script evaluation failed: {e}")))?
            .into_value::<serde_json::Value>()
            .map_err(|e| ScopeError::Other(anyhow!("script result parse failed: {e}")))
    }

    /// Run `body` (JS statements with `el` in scope, returning a result
    /// object) against the element the handle resolves to.
    async fn eval_on(
        &self,
        el: &ElementHandle,
        body: &str,
    ) -> Result<serde_json::Value, ScopeError> {
        let js = format!(
            r#"(() => {{
                {helpers}
                const el = document.querySelectorAll({sel})[{idx}];
                if (!el) return {{ stale: true }};
                {body}
            }})()"#,
            helpers = HELPERS_JS,
            sel = js_str(&el.selector)?,
            idx = el.index,
        );
        let value = self.eval(&js).await?;
        classify(value, &format!("{} [{}]", el.selector, el.index))
    }

    async fn matching_indexes(
        &self,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<Vec<usize>, ScopeError> {
        let js = format!(
            r#"(() => {{
                {helpers}
                const out = [];
                const list = document.querySelectorAll({sel});
                for (let i = 0; i < list.length; i++) {{
                    const el = list[i];
                    {filters}
                    out.push(i);
                }}
                return out;
            }})()"#,
            helpers = HELPERS_JS,
            sel = js_str(selector)?,
            filters = filter_js(opts)?,
        );
        let value = self.eval(&js).await?;
        let indexes = value
            .as_array()
            .ok_or_else(|| ScopeError::Other(anyhow!("expected index array")))?
            .iter()
            .filter_map(|v| v.as_u64().map(|n| n as usize))
            .collect();
        Ok(indexes)
    }

    async fn center_of(&self, el: &ElementHandle) -> Result<(f64, f64), ScopeError> {
        let value = self
            .eval_on(
                el,
                r#"el.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
                   const rect = el.getBoundingClientRect();
                   return { ok: true, value: { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 } };"#,
            )
            .await?;
        let x = value["x"].as_f64().unwrap_or(0.0);
        let y = value["y"].as_f64().unwrap_or(0.0);
        Ok((x, y))
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> Result<(), ScopeError> {
        let mut params = DispatchMouseEventParams::new(kind, x, y);
        params.button = Some(MouseButton::Left);
        params.click_count = Some(1);
        self.page
            .execute(params)
            .await
            .map_err(|e| ScopeError::Other(anyhow!("mouse event dispatch failed: {e}")))?;
        Ok(())
    }

    async fn dispatch_key(&self, target_js: &str, key: Key) -> Result<(), ScopeError> {
        let (code, key_code) = key_to_code(key);
        let js = format!(
            r#"(() => {{
                const el = {target_js};
                if (!el) return {{ stale: true }};
                const opts = {{
                    key: {key},
                    code: {code},
                    keyCode: {key_code},
                    which: {key_code},
                    bubbles: true,
                    cancelable: true
                }};
                el.dispatchEvent(new KeyboardEvent('keydown', opts));
                el.dispatchEvent(new KeyboardEvent('keypress', opts));
                el.dispatchEvent(new KeyboardEvent('keyup', opts));
                return {{ ok: true }};
            }})()"#,
            key = js_str(key.name())?,
            code = js_str(code)?,
            key_code = key_code,
        );
        let value = self.eval(&js).await?;
        classify(value, target_js).map(|_| ())
    }
}

#[async_trait]
impl Scope for CdpScope {
    async fn find(&self, selector: &str, opts: &FindOptions) -> Result<ElementHandle, ScopeError> {
        let indexes = self.matching_indexes(selector, opts).await?;
        match indexes.first() {
            Some(&index) => Ok(ElementHandle {
                selector: selector.to_string(),
                index,
                token: 0,
            }),
            None => Err(ScopeError::NotFound(selector.to_string())),
        }
    }

    async fn find_all(
        &self,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<Vec<ElementHandle>, ScopeError> {
        let indexes = self.matching_indexes(selector, opts).await?;
        Ok(indexes
            .into_iter()
            .map(|index| ElementHandle {
                selector: selector.to_string(),
                index,
                token: 0,
            })
            .collect())
    }

    async fn has_selector(&self, selector: &str, opts: &FindOptions) -> Result<bool, ScopeError> {
        Ok(!self.matching_indexes(selector, opts).await?.is_empty())
    }

    async fn click(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        self.eval_on(
            el,
            r#"el.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
               const rect = el.getBoundingClientRect();
               if (rect.width === 0 && rect.height === 0) return { not_interactable: true };
               const x = rect.left + rect.width / 2;
               const y = rect.top + rect.height / 2;
               const top = document.elementFromPoint(x, y);
               if (top && !(el === top || el.contains(top) || top.contains(el))) {
                   return { intercepted: true };
               }
               const opts = { bubbles: true, cancelable: true, clientX: x, clientY: y, button: 0 };
               el.dispatchEvent(new MouseEvent('mousemove', opts));
               el.dispatchEvent(new MouseEvent('mousedown', opts));
               el.dispatchEvent(new MouseEvent('mouseup', opts));
               el.dispatchEvent(new MouseEvent('click', opts));
               return { ok: true };"#,
        )
        .await
        .map(|_| ())
    }

    async fn pointer_click(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        let (x, y) = self.center_of(el).await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y)
            .await
    }

    async fn scroll_into_view(&self, el: &ElementHandle) -> Result<(), ScopeError> {
        self.eval_on(
            el,
            r#"el.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
               return { ok: true };"#,
        )
        .await
        .map(|_| ())
    }

    async fn set_text(&self, el: &ElementHandle, text: &str) -> Result<(), ScopeError> {
        let body = format!(
            r#"el.focus();
               const text = {text};
               const setter = Object.getOwnPropertyDescriptor(
                   window.HTMLInputElement.prototype, 'value'
               )?.set || Object.getOwnPropertyDescriptor(
                   window.HTMLTextAreaElement.prototype, 'value'
               )?.set;
               if (setter) {{ setter.call(el, text); }} else {{ el.value = text; }}
               el.dispatchEvent(new Event('input', {{ bubbles: true }}));
               el.dispatchEvent(new Event('change', {{ bubbles: true }}));
               return {{ ok: true }};"#,
            text = js_str(text)?,
        );
        self.eval_on(el, &body).await.map(|_| ())
    }

    async fn send_key(&self, el: &ElementHandle, key: Key) -> Result<(), ScopeError> {
        let target = format!(
            "document.querySelectorAll({})[{}]",
            js_str(&el.selector)?,
            el.index
        );
        self.dispatch_key(&target, key).await
    }

    async fn send_key_to_body(&self, key: Key) -> Result<(), ScopeError> {
        self.dispatch_key("document.body", key).await
    }

    async fn attr(
        &self,
        el: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, ScopeError> {
        let body = format!(
            "return {{ ok: true, value: el.getAttribute({}) }};",
            js_str(name)?
        );
        let value = self.eval_on(el, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn input_value(&self, el: &ElementHandle) -> Result<Option<String>, ScopeError> {
        let value = self
            .eval_on(
                el,
                "return { ok: true, value: ('value' in el) ? el.value : null };",
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn text(&self, el: &ElementHandle) -> Result<String, ScopeError> {
        let value = self
            .eval_on(el, "return { ok: true, value: __txt(el) };")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_visible(&self, el: &ElementHandle) -> Result<bool, ScopeError> {
        let value = self
            .eval_on(el, "return { ok: true, value: __vis(el) };")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn enclosing(
        &self,
        el: &ElementHandle,
        ancestor_selector: &str,
    ) -> Result<ElementHandle, ScopeError> {
        let body = format!(
            r#"const anc = el.closest({sel});
               if (!anc) return {{ missing: true }};
               const list = Array.from(document.querySelectorAll({sel}));
               return {{ ok: true, value: list.indexOf(anc) }};"#,
            sel = js_str(ancestor_selector)?,
        );
        let value = self.eval_on(el, &body).await?;
        let index = value.as_i64().unwrap_or(-1);
        if index < 0 {
            return Err(ScopeError::NotFound(ancestor_selector.to_string()));
        }
        Ok(ElementHandle {
            selector: ancestor_selector.to_string(),
            index: index as usize,
            token: 0,
        })
    }

    async fn find_within(
        &self,
        el: &ElementHandle,
        selector: &str,
        opts: &FindOptions,
    ) -> Result<ElementHandle, ScopeError> {
        let body = format!(
            r#"const all = Array.from(document.querySelectorAll({sel}));
               for (const cand of el.querySelectorAll({sel})) {{
                   {filters}
                   return {{ ok: true, value: all.indexOf(cand) }};
               }}
               return {{ missing: true }};"#,
            sel = js_str(selector)?,
            filters = filter_js_for(opts, "cand")?,
        );
        let value = self.eval_on(el, &body).await?;
        let index = value.as_i64().unwrap_or(-1);
        if index < 0 {
            return Err(ScopeError::NotFound(selector.to_string()));
        }
        Ok(ElementHandle {
            selector: selector.to_string(),
            index: index as usize,
            token: 0,
        })
    }

    async fn find_all_within(
        &self,
        el: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, ScopeError> {
        let body = format!(
            r#"const all = Array.from(document.querySelectorAll({sel}));
               const out = [];
               for (const cand of el.querySelectorAll({sel})) {{
                   out.push(all.indexOf(cand));
               }}
               return {{ ok: true, value: out }};"#,
            sel = js_str(selector)?,
        );
        let value = self.eval_on(el, &body).await?;
        let indexes = value.as_array().cloned().unwrap_or_default();
        Ok(indexes
            .iter()
            .filter_map(|v| v.as_u64())
            .map(|index| ElementHandle {
                selector: selector.to_string(),
                index: index as usize,
                token: 0,
            })
            .collect())
    }
}

fn js_str(s: &str) -> Result<String, ScopeError> {
    serde_json::to_string(s).map_err(|e| ScopeError::Other(anyhow!(e)))
}

/// Map a result object from an evaluated snippet onto the error taxonomy.
fn classify(value: serde_json::Value, context: &str) -> Result<serde_json::Value, ScopeError> {
    let flag = |name: &str| value.get(name).and_then(|v| v.as_bool()).unwrap_or(false);
    if flag("stale") {
        return Err(ScopeError::Stale(context.to_string()));
    }
    if flag("intercepted") {
        return Err(ScopeError::ClickIntercepted(context.to_string()));
    }
    if flag("not_interactable") {
        return Err(ScopeError::NotInteractable(context.to_string()));
    }
    if flag("missing") {
        return Err(ScopeError::NotFound(context.to_string()));
    }
    Ok(value.get("value").cloned().unwrap_or(serde_json::Value::Null))
}

fn filter_js(opts: &FindOptions) -> Result<String, ScopeError> {
    filter_js_for(opts, "el")
}

fn filter_js_for(opts: &FindOptions, var: &str) -> Result<String, ScopeError> {
    let mut parts = Vec::new();
    match opts.visibility {
        Visibility::Visible => parts.push(format!("if (!__vis({var})) continue;")),
        Visibility::Hidden => parts.push(format!("if (__vis({var})) continue;")),
        Visibility::Any => {}
    }
    match &opts.text {
        Some(TextFilter::Exact(t)) => {
            parts.push(format!("if (__txt({var}) !== {}) continue;", js_str(t)?));
        }
        Some(TextFilter::Contains(t)) => {
            parts.push(format!("if (!__txt({var}).includes({})) continue;", js_str(t)?));
        }
        None => {}
    }
    Ok(parts.join("\n                    "))
}

fn key_to_code(key: Key) -> (&'static str, u32) {
    match key {
        Key::Enter => ("Enter", 13),
        Key::Tab => ("Tab", 9),
        Key::Escape => ("Escape", 27),
    }
}
