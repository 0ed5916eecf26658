#![forbid(unsafe_code)]

//! Global HTML attribute namespace.
//!
//! A fixed registry of the attribute names every element accepts. The
//! definition compiler validates `observedAttributes` entries against it.
//!
//! Lookups are case-sensitive: `contenteditable` is valid, `contentEditable`
//! is not. [`suggest_global_attribute`] recovers the intended spelling for
//! names that differ only in case or hyphenation.
//!
//! The module also owns the attribute/property name mapping used when an
//! observed attribute is compared against a public property:
//! `is-record-detail` ↔ `isRecordDetail`.

use std::sync::LazyLock;

use ahash::{AHashMap, AHashSet};

/// Documentation link appended to invalid attribute diagnostics.
pub const GLOBAL_ATTRIBUTES_URL: &str =
    "https://developer.mozilla.org/en-US/docs/Web/HTML/Global_attributes";

/// Every recognized global attribute, in canonical spelling.
pub const GLOBAL_HTML_ATTRIBUTES: &[&str] = &[
    "accesskey",
    "autocapitalize",
    "autofocus",
    "class",
    "contenteditable",
    "contextmenu",
    "dir",
    "draggable",
    "dropzone",
    "enterkeyhint",
    "exportparts",
    "hidden",
    "id",
    "inert",
    "inputmode",
    "is",
    "itemid",
    "itemprop",
    "itemref",
    "itemscope",
    "itemtype",
    "lang",
    "nonce",
    "part",
    "popover",
    "role",
    "slot",
    "spellcheck",
    "style",
    "tabindex",
    "title",
    "translate",
    // ARIA
    "aria-activedescendant",
    "aria-atomic",
    "aria-autocomplete",
    "aria-busy",
    "aria-checked",
    "aria-colcount",
    "aria-colindex",
    "aria-colspan",
    "aria-controls",
    "aria-current",
    "aria-describedby",
    "aria-details",
    "aria-disabled",
    "aria-errormessage",
    "aria-expanded",
    "aria-flowto",
    "aria-haspopup",
    "aria-hidden",
    "aria-invalid",
    "aria-keyshortcuts",
    "aria-label",
    "aria-labelledby",
    "aria-level",
    "aria-live",
    "aria-modal",
    "aria-multiline",
    "aria-multiselectable",
    "aria-orientation",
    "aria-owns",
    "aria-placeholder",
    "aria-posinset",
    "aria-pressed",
    "aria-readonly",
    "aria-relevant",
    "aria-required",
    "aria-roledescription",
    "aria-rowcount",
    "aria-rowindex",
    "aria-rowspan",
    "aria-selected",
    "aria-setsize",
    "aria-sort",
    "aria-valuemax",
    "aria-valuemin",
    "aria-valuenow",
    "aria-valuetext",
];

static ATTRIBUTE_SET: LazyLock<AHashSet<&'static str>> =
    LazyLock::new(|| GLOBAL_HTML_ATTRIBUTES.iter().copied().collect());

/// Folded spelling (lowercase, no hyphens) → canonical name.
static FOLDED: LazyLock<AHashMap<String, &'static str>> = LazyLock::new(|| {
    GLOBAL_HTML_ATTRIBUTES
        .iter()
        .map(|name| (fold(name), *name))
        .collect()
});

fn fold(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `name` is a global attribute, spelled exactly.
#[must_use]
pub fn is_global_attribute(name: &str) -> bool {
    ATTRIBUTE_SET.contains(name)
}

/// The canonical spelling `name` most likely meant.
///
/// Returns `None` when `name` is already valid or when no global attribute
/// matches it ignoring case and hyphens.
///
/// ```
/// use tessera_core::attributes::suggest_global_attribute;
///
/// assert_eq!(suggest_global_attribute("contentEditable"), Some("contenteditable"));
/// assert_eq!(suggest_global_attribute("content-editable"), Some("contenteditable"));
/// assert_eq!(suggest_global_attribute("isRecordDetail"), None);
/// ```
#[must_use]
pub fn suggest_global_attribute(name: &str) -> Option<&'static str> {
    if is_global_attribute(name) {
        return None;
    }
    FOLDED.get(&fold(name)).copied()
}

/// Map an attribute name to its property name: `is-record-detail` →
/// `isRecordDetail`. Names without hyphens come back unchanged.
#[must_use]
pub fn attribute_to_property(attr: &str) -> String {
    let mut out = String::with_capacity(attr.len());
    let mut upper_next = false;
    for ch in attr.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Map a property name to its attribute name: `isRecordDetail` →
/// `is-record-detail`.
#[must_use]
pub fn property_to_attribute(prop: &str) -> String {
    let mut out = String::with_capacity(prop.len() + 4);
    for ch in prop.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
