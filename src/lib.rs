//! Resilient interaction driver for stateful, asynchronously rendered
//! dropdown/combobox widgets.
//!
//! The driver opens a widget, filters and resolves its options, commits
//! selections, and verifies convergence to the expected state against a page
//! that re-renders and replaces DOM nodes on its own schedule. Waiting is
//! always bounded predicate polling, and whole operations retry on the
//! transient error classes (stale references, internal sub-wait timeouts).
//!
//! Browser access goes through the [`scope::Scope`] capability trait; a
//! CDP-backed implementation over `chromiumoxide` ships in [`scope::cdp`].

pub mod config;
pub mod driver;
pub mod error;
pub mod interaction;
pub mod scope;
pub mod selectors;

pub use config::Timeouts;
pub use driver::{ComboSelect, SelectOption, Toggle, WidgetVariant};
pub use error::{DriverError, DriverResult, ScopeError};
pub use scope::cdp::CdpScope;
pub use scope::{ElementHandle, FindOptions, Key, Scope, TextFilter, Visibility};
pub use selectors::WidgetLocators;
