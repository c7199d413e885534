//! Scheme-aware URL parsing for resource requests.

use std::fmt;
use std::path::{Path, PathBuf};

use url::{Host, Url};

/// Result type for URL operations.
pub type UrlResult<T> = Result<T, UrlError>;

/// Errors from URL parsing and resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("missing scheme: {0}")]
    MissingScheme(String),

    #[error("invalid scheme: {0}")]
    InvalidScheme(String),

    #[error("malformed URL {input}: {source}")]
    Malformed {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot resolve {reference} against {base}")]
    CannotBeABase { base: String, reference: String },

    #[error("not an absolute file path: {0}")]
    RelativePath(String),
}

/// Extract the scheme of `url` without allocating.
///
/// Leading ASCII whitespace and control characters are skipped, the same
/// way a browser strips them before parsing. Returns `None` when the input
/// has no syntactically valid scheme.
pub fn scheme_of(url: &str) -> Option<&str> {
    let trimmed = url.trim_start_matches(|c: char| c <= ' ');
    let end = trimmed.find(':')?;
    let scheme = &trimmed[..end];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}

/// An absolute URL with a lower-cased scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUrl {
    inner: Url,
}

impl ResourceUrl {
    /// Parse an absolute URL.
    pub fn parse(input: &str) -> UrlResult<Self> {
        let trimmed = input.trim_matches(|c: char| c <= ' ');
        if scheme_of(trimmed).is_none() {
            return Err(if trimmed.contains(':') {
                UrlError::InvalidScheme(trimmed.to_string())
            } else {
                UrlError::MissingScheme(trimmed.to_string())
            });
        }

        Url::parse(trimmed)
            .map(|inner| Self { inner })
            .map_err(|source| UrlError::Malformed {
                input: trimmed.to_string(),
                source,
            })
    }

    /// Build a `file:` URL from an absolute filesystem path.
    pub fn from_file_path(path: &Path) -> UrlResult<Self> {
        Url::from_file_path(path)
            .map(|inner| Self { inner })
            .map_err(|()| UrlError::RelativePath(path.display().to_string()))
    }

    /// The full URL text.
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    /// The lower-cased scheme, without the trailing colon.
    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    /// Everything after `scheme:`.
    pub fn rest(&self) -> &str {
        &self.as_str()[self.scheme().len() + 1..]
    }

    /// Whether this URL uses a network scheme.
    pub fn is_network(&self) -> bool {
        crate::is_network_scheme(self.scheme())
    }

    /// Host part (lower-cased, IPv6 without brackets) when the URL has an
    /// authority. `file:///` yields an empty host.
    pub fn host(&self) -> Option<String> {
        if !self.inner.has_authority() {
            return None;
        }
        Some(match self.inner.host() {
            Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => String::new(),
        })
    }

    /// Explicit or scheme-default port.
    pub fn port(&self) -> Option<u16> {
        if !self.inner.has_authority() {
            return None;
        }
        self.inner.port().or_else(|| default_port(self.scheme()))
    }

    /// Path component, without query or fragment.
    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// The origin this URL belongs to.
    ///
    /// `file:` URLs share one origin per host, so documents in a bundle can
    /// match `'self'`.
    pub fn origin(&self) -> Origin {
        if self.scheme() == "blob" {
            if let Ok(inner) = ResourceUrl::parse(self.path()) {
                return inner.origin();
            }
        }

        match self.host() {
            Some(host) => Origin::Tuple {
                scheme: self.scheme().to_string(),
                host,
                port: self.port(),
            },
            None => Origin::Opaque,
        }
    }

    /// Resolve `reference` against this URL.
    pub fn join(&self, reference: &str) -> UrlResult<Self> {
        let reference = reference.trim_matches(|c: char| c <= ' ');

        if scheme_of(reference).is_some() {
            return Self::parse(reference);
        }
        if self.inner.cannot_be_a_base() {
            return Err(UrlError::CannotBeABase {
                base: self.to_string(),
                reference: reference.to_string(),
            });
        }

        self.inner
            .join(reference)
            .map(|inner| Self { inner })
            .map_err(|source| UrlError::Malformed {
                input: reference.to_string(),
                source,
            })
    }

    /// Convert a `file:` URL back into a filesystem path.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.scheme() != "file" {
            return None;
        }
        self.inner.to_file_path().ok()
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL origin, as used for `'self'` matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Scheme, host and effective port.
    Tuple {
        scheme: String,
        host: String,
        port: Option<u16>,
    },
    /// Origins that never match anything but themselves by identity (`data:`).
    Opaque,
}

impl Origin {
    /// Whether `url` is same-origin with `self`.
    pub fn matches(&self, url: &ResourceUrl) -> bool {
        match (self, url.origin()) {
            (Origin::Tuple { .. }, other @ Origin::Tuple { .. }) => *self == other,
            _ => false,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Tuple { scheme, host, port } => {
                if host.contains(':') {
                    write!(f, "{}://[{}]", scheme, host)?;
                } else {
                    write!(f, "{}://{}", scheme, host)?;
                }
                match port {
                    Some(p) if default_port(scheme) != Some(*p) => write!(f, ":{}", p),
                    _ => Ok(()),
                }
            }
            Origin::Opaque => f.write_str("null"),
        }
    }
}

/// Default port for a scheme, if it has one.
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_of() {
        assert_eq!(scheme_of("https://example.com"), Some("https"));
        assert_eq!(scheme_of("  WSS://echo"), Some("WSS"));
        assert_eq!(scheme_of("data:text/plain,hi"), Some("data"));
        assert_eq!(scheme_of("/relative/path"), None);
        assert_eq!(scheme_of("1http://bad"), None);
        assert_eq!(scheme_of(""), None);
    }

    #[test]
    fn test_parse_lowercases_scheme() {
        let url = ResourceUrl::parse("HTTPS://Example.com/a?b#c").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.as_str(), "https://example.com/a?b#c");
        assert_eq!(url.host().as_deref(), Some("example.com"));
        assert_eq!(url.port(), Some(443));
        assert_eq!(url.path(), "/a");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ResourceUrl::parse("index.html"),
            Err(UrlError::MissingScheme(_))
        ));
        assert!(matches!(
            ResourceUrl::parse("9x:foo"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            ResourceUrl::parse("https://exa mple.com/"),
            Err(UrlError::Malformed { .. })
        ));
        assert!(matches!(
            ResourceUrl::parse("ws://[::1/socket"),
            Err(UrlError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_normalizes() {
        let url = ResourceUrl::parse("  https://example.com:443").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
        assert_eq!(url.path(), "/");
        assert_eq!(url.port(), Some(443));

        let data = ResourceUrl::parse("data:text/plain,a%20b").unwrap();
        assert_eq!(data.rest(), "text/plain,a%20b");
        assert_eq!(data.host(), None);
        assert_eq!(data.port(), None);
    }

    #[test]
    fn test_join_relative() {
        let base = ResourceUrl::parse("file:///opt/bundle/app/index.html").unwrap();
        assert_eq!(
            base.join("assets/main.js").unwrap().as_str(),
            "file:///opt/bundle/app/assets/main.js"
        );
        assert_eq!(
            base.join("../version.json").unwrap().as_str(),
            "file:///opt/bundle/version.json"
        );
        assert_eq!(
            base.join("/etc/hosts").unwrap().as_str(),
            "file:///etc/hosts"
        );
        assert_eq!(
            base.join("https://example.com/x.png").unwrap().as_str(),
            "https://example.com/x.png"
        );
        assert_eq!(
            base.join("./a/./b/../c.js?v=2#top").unwrap().as_str(),
            "file:///opt/bundle/app/a/c.js?v=2#top"
        );
        assert_eq!(
            base.join("../../../../../etc/passwd").unwrap().as_str(),
            "file:///etc/passwd"
        );
        assert_eq!(base.join("#intro").unwrap().path(), "/opt/bundle/app/index.html");
    }

    #[test]
    fn test_join_scheme_relative_takes_base_scheme() {
        let base = ResourceUrl::parse("https://cdn.example.com/a/b").unwrap();
        assert_eq!(
            base.join("//evil.example/x").unwrap().as_str(),
            "https://evil.example/x"
        );
    }

    #[test]
    fn test_join_against_opaque_base_fails() {
        let base = ResourceUrl::parse("data:text/html,hello").unwrap();
        assert!(matches!(
            base.join("x.png"),
            Err(UrlError::CannotBeABase { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_path_round_trip_with_spaces() {
        let path = Path::new("/tmp/my bundle/index.html");
        let url = ResourceUrl::from_file_path(path).unwrap();
        assert_eq!(url.as_str(), "file:///tmp/my%20bundle/index.html");
        assert_eq!(url.to_file_path().unwrap(), path);

        let odd = Path::new("/tmp/100% #1?/é.html");
        let url = ResourceUrl::from_file_path(odd).unwrap();
        assert!(!url.as_str().contains('#'));
        assert_eq!(url.to_file_path().unwrap(), odd);
    }

    #[test]
    fn test_file_path_rejections() {
        assert!(matches!(
            ResourceUrl::from_file_path(Path::new("bundle/index.html")),
            Err(UrlError::RelativePath(_))
        ));
        let remote = ResourceUrl::parse("file://server/share/a.txt").unwrap();
        assert_eq!(remote.to_file_path(), None);
        let https = ResourceUrl::parse("https://example.com/a.txt").unwrap();
        assert_eq!(https.to_file_path(), None);
    }

    #[test]
    fn test_origin_matching() {
        let doc = ResourceUrl::parse("file:///app/index.html").unwrap();
        let origin = doc.origin();
        assert!(origin.matches(&ResourceUrl::parse("file:///app/img/logo.png").unwrap()));
        assert!(!origin.matches(&ResourceUrl::parse("https://example.com/").unwrap()));
        assert!(!origin.matches(&ResourceUrl::parse("data:image/png;base64,AA==").unwrap()));
    }

    #[test]
    fn test_blob_origin_is_inner_origin() {
        let blob = ResourceUrl::parse("blob:file:///3").unwrap();
        let doc = ResourceUrl::parse("file:///app/index.html").unwrap();
        assert_eq!(blob.origin(), doc.origin());
    }

    #[test]
    fn test_ipv6_port() {
        let url = ResourceUrl::parse("ws://[::1]:9000/socket").unwrap();
        assert_eq!(url.host().as_deref(), Some("::1"));
        assert_eq!(url.port(), Some(9000));
        assert_eq!(url.origin().to_string(), "ws://[::1]:9000");
    }
}
