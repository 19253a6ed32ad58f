use scraper::{ElementRef, Html};
use tracing::debug;

use crate::driver::BrowserDriver;
use crate::error::CaptureError;
use crate::types::{BrowserState, FormField, InteractiveElement};

/// Text under these elements is never rendered.
const NON_RENDERED: &[&str] = &["script", "style"];

const FORM_FIELD_TAGS: &[&str] = &["input", "textarea", "select"];

/// The attributes selector derivation looks at. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementAttributes {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub classes: Vec<String>,
    pub href: Option<String>,
    pub input_type: Option<String>,
    pub text: String,
}

impl ElementAttributes {
    fn from_element(el: ElementRef<'_>) -> Self {
        let value = el.value();
        let attr = |name: &str| {
            value
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        Self {
            tag: value.name().to_string(),
            id: attr("id"),
            name: attr("name"),
            classes: value.classes().map(String::from).collect(),
            href: attr("href"),
            input_type: attr("type"),
            text: element_text(el),
        }
    }
}

/// Derives a selector from element attributes, in strict precedence:
/// id, name, class list, anchor href, input type, tag with text, bare tag.
///
/// Ids that are not valid CSS identifiers use the `[id='..']` form; classes
/// that are not valid identifiers are left out of the class chain.
pub fn derive_selector(attrs: &ElementAttributes) -> String {
    if let Some(id) = &attrs.id {
        return if is_css_ident(id) {
            format!("#{}", id)
        } else {
            format!("[id='{}']", quote(id))
        };
    }
    if let Some(name) = &attrs.name {
        return format!("[name='{}']", quote(name));
    }
    let classes: String = attrs
        .classes
        .iter()
        .filter(|class| is_css_ident(class))
        .map(|class| format!(".{}", class))
        .collect();
    if !classes.is_empty() {
        return classes;
    }
    if attrs.tag == "a" {
        if let Some(href) = &attrs.href {
            return format!("a[href*='{}']", quote(href));
        }
    }
    if attrs.tag == "input" {
        if let Some(input_type) = &attrs.input_type {
            return format!("input[type='{}']", quote(input_type));
        }
    }
    if !attrs.text.is_empty() {
        return format!("{}:contains('{}')", attrs.tag, quote(&attrs.text));
    }
    attrs.tag.clone()
}

/// Whether `value` can follow `#` or `.` without escaping.
fn is_css_ident(value: &str) -> bool {
    let ident_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii();
    let mut chars = value.chars();
    let starts_ok = match chars.next() {
        Some('-') => chars
            .clone()
            .next()
            .is_some_and(|c| !c.is_ascii_digit() && ident_char(c)),
        Some(c) => !c.is_ascii_digit() && ident_char(c),
        None => false,
    };
    starts_ok && value.chars().all(ident_char)
}

/// Escapes a value for use inside a single-quoted selector string.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_interactive(el: ElementRef<'_>) -> bool {
    match el.value().name() {
        "a" | "button" => true,
        "input" => el
            .value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("submit")),
        _ => false,
    }
}

/// Builds a snapshot from already-fetched page data. Pure.
pub fn parse_page(current_url: String, page_title: String, page_source: String) -> BrowserState {
    let document = Html::parse_document(&page_source);
    let mut interactive_elements = Vec::new();
    let mut form_fields = Vec::new();
    let mut text_nodes = Vec::new();

    for node in document.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let parent_tag = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()));
            if parent_tag.is_some_and(|tag| NON_RENDERED.contains(&tag.as_str())) {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                text_nodes.push(trimmed.to_string());
            }
            continue;
        }

        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };

        if is_interactive(el) {
            let attrs = ElementAttributes::from_element(el);
            interactive_elements.push(InteractiveElement {
                tag: attrs.tag.clone(),
                id: attrs.id.clone().unwrap_or_default(),
                text: attrs.text.clone(),
                selector: derive_selector(&attrs),
            });
        }

        if FORM_FIELD_TAGS.contains(&el.value().name()) {
            let attrs = ElementAttributes::from_element(el);
            form_fields.push(FormField {
                field_type: attrs.input_type.clone().unwrap_or_else(|| "text".to_string()),
                id: attrs.id.clone().unwrap_or_default(),
                name: attrs.name.clone().unwrap_or_default(),
                placeholder: el.value().attr("placeholder").unwrap_or_default().to_string(),
                selector: derive_selector(&attrs),
            });
        }
    }

    BrowserState {
        current_url,
        page_title,
        page_source,
        interactive_elements,
        visible_text_content: text_nodes.join(" "),
        form_fields,
    }
}

/// Reads URL, title and markup from the driver and builds a fresh snapshot.
pub async fn capture_state(driver: &dyn BrowserDriver) -> Result<BrowserState, CaptureError> {
    let current_url = driver
        .current_url()
        .await
        .map_err(|source| CaptureError::Driver { what: "url", source })?;
    let page_title = driver
        .get_title()
        .await
        .map_err(|source| CaptureError::Driver { what: "title", source })?;
    let page_source = driver
        .get_page_source()
        .await
        .map_err(|source| CaptureError::Driver {
            what: "page source",
            source,
        })?;

    let state = parse_page(current_url, page_title, page_source);
    debug!(
        url = %state.current_url,
        interactive = state.interactive_elements.len(),
        fields = state.form_fields.len(),
        "Captured browser state"
    );
    Ok(state)
}
