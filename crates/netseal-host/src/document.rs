//! The loaded entry document and the sub-resources it references.

use netseal_core::{Origin, ResourceKind, ResourceUrl};
use netseal_security::{EnforcedPolicies, FetchDirective};

/// A document delivered to the content window.
#[derive(Debug, Clone)]
pub struct Document {
    url: ResourceUrl,
    origin: Origin,
    policies: EnforcedPolicies,
    subresources: Vec<Subresource>,
}

impl Document {
    /// Build a document from its URL, delivered policies and markup.
    pub fn new(url: ResourceUrl, policies: EnforcedPolicies, markup: &str) -> Self {
        Self {
            origin: url.origin(),
            url,
            policies,
            subresources: scan_subresources(markup),
        }
    }

    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Content policies delivered with the document.
    pub fn policies(&self) -> &EnforcedPolicies {
        &self.policies
    }

    /// Resources the markup references, in document order.
    pub fn subresources(&self) -> &[Subresource] {
        &self.subresources
    }
}

/// A resource referenced from markup by `src` or `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subresource {
    /// Reference as written, unresolved.
    pub reference: String,
    pub kind: ResourceKind,
    pub directive: FetchDirective,
}

/// Find the `src`/`href` references that a document loads on its own.
///
/// Anchors and other navigational links are not loads and are skipped, as
/// are `<link>` elements other than stylesheets, icons and preloads.
pub fn scan_subresources(markup: &str) -> Vec<Subresource> {
    let mut found = Vec::new();
    let mut rest = markup;

    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        if rest.starts_with("!--") {
            match rest.find("-->") {
                Some(end) => {
                    rest = &rest[end + 3..];
                    continue;
                }
                None => break,
            }
        }

        let end = rest.find('>').unwrap_or(rest.len());
        let tag = &rest[..end];
        rest = &rest[end..];

        let name_end = tag
            .find(|c: char| c.is_ascii_whitespace() || c == '/')
            .unwrap_or(tag.len());
        let name = tag[..name_end].to_ascii_lowercase();
        let attrs = &tag[name_end..];

        let entry = match name.as_str() {
            "script" => attribute(attrs, "src")
                .map(|r| (r, ResourceKind::Script, FetchDirective::Script)),
            "img" => attribute(attrs, "src").map(|r| (r, ResourceKind::Image, FetchDirective::Img)),
            "iframe" | "frame" => {
                attribute(attrs, "src").map(|r| (r, ResourceKind::Document, FetchDirective::Frame))
            }
            "audio" | "video" | "source" => {
                attribute(attrs, "src").map(|r| (r, ResourceKind::Other, FetchDirective::Media))
            }
            "link" => link_target(attrs),
            _ => None,
        };

        if let Some((reference, kind, directive)) = entry {
            if !reference.is_empty() {
                found.push(Subresource {
                    reference,
                    kind,
                    directive,
                });
            }
        }
    }

    found
}

fn link_target(attrs: &str) -> Option<(String, ResourceKind, FetchDirective)> {
    let rel = attribute(attrs, "rel")?.to_ascii_lowercase();
    let href = attribute(attrs, "href")?;
    let rels: Vec<&str> = rel.split_ascii_whitespace().collect();

    if rels.contains(&"stylesheet") {
        Some((href, ResourceKind::Style, FetchDirective::Style))
    } else if rels.contains(&"icon") {
        Some((href, ResourceKind::Image, FetchDirective::Img))
    } else if rels.contains(&"preload") {
        match attribute(attrs, "as").as_deref() {
            Some("font") => Some((href, ResourceKind::Font, FetchDirective::Font)),
            Some("script") => Some((href, ResourceKind::Script, FetchDirective::Script)),
            Some("style") => Some((href, ResourceKind::Style, FetchDirective::Style)),
            Some("image") => Some((href, ResourceKind::Image, FetchDirective::Img)),
            _ => Some((href, ResourceKind::Fetch, FetchDirective::Connect)),
        }
    } else {
        None
    }
}

/// Value of attribute `name` within a tag's attribute text.
fn attribute(attrs: &str, name: &str) -> Option<String> {
    let bytes = attrs.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'/') {
            i += 1;
        }
        let key = &attrs[key_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = None;
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let (value_start, value_end) = match bytes.get(i) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let start = i + 1;
                    let end = attrs[start..]
                        .find(quote as char)
                        .map_or(attrs.len(), |e| start + e);
                    i = (end + 1).min(attrs.len());
                    (start, end)
                }
                _ => {
                    let start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    (start, i)
                }
            };
            value = Some(attrs[value_start..value_end].trim().to_string());
        }

        if key.is_empty() {
            if value.is_none() {
                i += attrs[i..].chars().next().map_or(1, char::len_utf8);
            }
            continue;
        }
        if key.eq_ignore_ascii_case(name) {
            return Some(value.unwrap_or_default());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_loads_in_order() {
        let markup = r#"<!DOCTYPE html>
<html><head>
<link rel="icon" type="image/png" href="images/favicon.ico">
<link href='assets/main.css' rel=stylesheet>
<link rel="preload" href="assets/fonts/Roboto.woff2" as="font">
<script src="assets/main.js" defer></script>
<a href="https://github.com/gchq/CyberChef">source</a>
</head><body>
<!-- <img src="https://commented.example/x.png"> -->
<IMG SRC="https://example.com/x.png" alt="remote">
</body></html>"#;

        let found = scan_subresources(markup);
        let refs: Vec<_> = found.iter().map(|s| s.reference.as_str()).collect();
        assert_eq!(
            refs,
            vec![
                "images/favicon.ico",
                "assets/main.css",
                "assets/fonts/Roboto.woff2",
                "assets/main.js",
                "https://example.com/x.png",
            ]
        );
        assert_eq!(found[1].directive, FetchDirective::Style);
        assert_eq!(found[2].kind, ResourceKind::Font);
        assert_eq!(found[4].directive, FetchDirective::Img);
    }

    #[test]
    fn test_inline_script_has_no_reference() {
        let found = scan_subresources("<script>fetch('https://example.com')</script><img src=''>");
        assert!(found.is_empty());
    }

    #[test]
    fn test_non_ascii_after_keyless_value() {
        let found = scan_subresources("<html><img =\"x\"é src=a.png></html>");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].reference, "a.png");

        assert_eq!(attribute(" =é src=b.png", "src"), Some("b.png".to_string()));
        assert_eq!(attribute("=\"ü\"ü=\"ß\" src='ç.png'", "src"), Some("ç.png".to_string()));
    }

    #[test]
    fn test_attribute_parsing() {
        assert_eq!(attribute(r#" data-src="x" src="y""#, "src"), Some("y".to_string()));
        assert_eq!(attribute(" async src=a.js", "src"), Some("a.js".to_string()));
        assert_eq!(attribute(" async", "async"), Some(String::new()));
        assert_eq!(attribute(r#" alt="a > b""#, "src"), None);
    }
}
