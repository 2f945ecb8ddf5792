use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};

static OCTET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[a-fA-F0-9]{2}").expect("valid octet regex"));

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an HTML fragment with entities decoded.
pub fn strip_tags(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return input.to_string();
    }
    let fragment = Html::parse_fragment(input);
    fragment.root_element().text().collect::<Vec<_>>().join("")
}

/// Single-line plain text for titles, ids and venue fields.
pub fn sanitize_text_field(input: &str) -> String {
    let stripped = strip_tags(input);
    let without_octets = OCTET_RE.replace_all(&stripped, "");
    clean_text(&without_octets)
}

/// Elements kept in event descriptions. Everything else is unwrapped to its children.
const ALLOWED_TAGS: [&str; 25] = [
    "a", "abbr", "b", "blockquote", "br", "code", "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "li", "ol", "p", "pre", "s", "small", "strong", "sub", "sup", "ul",
];
const VOID_TAGS: [&str; 2] = ["br", "hr"];
/// Dropped together with their content.
const BLOCKED_TAGS: [&str; 7] = [
    "script", "style", "iframe", "object", "embed", "noscript", "template",
];

/// Post-body HTML restricted to basic formatting and http(s) links. Attributes other than a
/// link's `href` are removed and text is re-escaped.
pub fn sanitize_html(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    let mut out = String::with_capacity(input.len());
    write_children(fragment.root_element(), &mut out);
    out.trim().to_string()
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&escape_html(text));
        } else if let Some(child) = ElementRef::wrap(child) {
            write_element(child, out);
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if BLOCKED_TAGS.contains(&name) {
        return;
    }
    if !ALLOWED_TAGS.contains(&name) {
        write_children(element, out);
        return;
    }

    out.push('<');
    out.push_str(name);
    if name == "a" {
        if let Some(href) = element.value().attr("href").and_then(safe_url) {
            out.push_str(" href=\"");
            out.push_str(&href);
            out.push('"');
        }
    }
    out.push('>');
    if VOID_TAGS.contains(&name) {
        return;
    }
    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escaped http(s) URL, or `None` for anything else.
pub fn safe_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    match url.scheme() {
        "http" | "https" => Some(escape_html(trimmed)),
        _ => None,
    }
}

/// Lowercase token safe for use inside a CSS class name.
pub fn class_token(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

pub fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
