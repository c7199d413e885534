//! Content policy enforced inside the hosted document.
//!
//! The request gate writes the policy header onto every response; the host
//! parses the header it actually received and checks each primitive's target
//! against it before a request is issued. That makes the header layer
//! independent of request interception.

use std::fmt;

use http::header::CONTENT_SECURITY_POLICY;
use http::HeaderMap;
use netseal_core::{default_port, is_network_scheme, Origin, ResourceUrl};

/// Fetch directives a primitive can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchDirective {
    Default,
    Connect,
    Img,
    Font,
    Script,
    Style,
    Worker,
    Child,
    Frame,
    Media,
    Object,
}

impl FetchDirective {
    /// Directive name as written in the header.
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default-src",
            Self::Connect => "connect-src",
            Self::Img => "img-src",
            Self::Font => "font-src",
            Self::Script => "script-src",
            Self::Style => "style-src",
            Self::Worker => "worker-src",
            Self::Child => "child-src",
            Self::Frame => "frame-src",
            Self::Media => "media-src",
            Self::Object => "object-src",
        }
    }

    /// Directives consulted, in order, when this one is absent.
    fn fallbacks(self) -> &'static [FetchDirective] {
        use FetchDirective::*;
        match self {
            Default => &[Default],
            Worker => &[Worker, Child, Script, Default],
            Frame => &[Frame, Child, Default],
            Child => &[Child, Default],
            Connect => &[Connect, Default],
            Img => &[Img, Default],
            Font => &[Font, Default],
            Script => &[Script, Default],
            Style => &[Style, Default],
            Media => &[Media, Default],
            Object => &[Object, Default],
        }
    }
}

impl fmt::Display for FetchDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single source expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `'none'`
    None,
    /// `'self'`
    SelfOrigin,
    /// `*`
    Wildcard,
    /// `data:`, `blob:`, `https:` ...
    Scheme(String),
    /// `https://example.com:8443/path`, `*.example.com`
    Host {
        scheme: Option<String>,
        host: String,
        port: Option<PortSource>,
        path: Option<String>,
    },
    /// Keywords that never match a URL (`'unsafe-inline'`, nonces, hashes).
    Keyword(String),
}

/// Port part of a host source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    Any,
    Exact(u16),
}

impl Source {
    fn parse(token: &str) -> Option<Self> {
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "'none'" => return Some(Self::None),
            "'self'" => return Some(Self::SelfOrigin),
            "*" => return Some(Self::Wildcard),
            _ => {}
        }

        if lower.starts_with('\'') {
            return Some(Self::Keyword(lower));
        }

        if let Some(scheme) = lower.strip_suffix(':') {
            if !scheme.is_empty() && !scheme.contains('/') {
                return Some(Self::Scheme(scheme.to_string()));
            }
        }

        let (scheme, rest) = match lower.split_once("://") {
            Some((s, r)) => (Some(s.to_string()), r),
            None => (None, lower.as_str()),
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], Some(rest[i..].to_string())),
            None => (rest, None),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, "*")) => (h, Some(PortSource::Any)),
            Some((h, p)) => (h, Some(PortSource::Exact(p.parse().ok()?))),
            None => (authority, None),
        };

        if host.is_empty() {
            return None;
        }

        Some(Self::Host {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    fn matches(&self, url: &ResourceUrl, self_origin: &Origin) -> bool {
        match self {
            Self::None | Self::Keyword(_) => false,
            Self::SelfOrigin => self_origin.matches(url),
            Self::Wildcard => {
                // `*` covers network schemes and the document's own scheme,
                // never data:, blob: or filesystem:.
                is_network_scheme(url.scheme())
                    || matches!(self_origin, Origin::Tuple { scheme, .. } if scheme == url.scheme())
            }
            Self::Scheme(scheme) => scheme_matches(scheme, url.scheme()),
            Self::Host {
                scheme,
                host,
                port,
                path,
            } => {
                let scheme_ok = match scheme {
                    Some(s) => scheme_matches(s, url.scheme()),
                    None => match self_origin {
                        Origin::Tuple { scheme: own, .. } => {
                            scheme_matches(own, url.scheme()) || is_network_scheme(url.scheme())
                        }
                        Origin::Opaque => is_network_scheme(url.scheme()),
                    },
                };
                scheme_ok
                    && host_matches(host, url.host().as_deref())
                    && port_matches(*port, url)
                    && path_matches(path.as_deref(), url.path())
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("'none'"),
            Self::SelfOrigin => f.write_str("'self'"),
            Self::Wildcard => f.write_str("*"),
            Self::Scheme(s) => write!(f, "{}:", s),
            Self::Keyword(k) => f.write_str(k),
            Self::Host {
                scheme,
                host,
                port,
                path,
            } => {
                if let Some(s) = scheme {
                    write!(f, "{}://", s)?;
                }
                f.write_str(host)?;
                match port {
                    Some(PortSource::Any) => f.write_str(":*")?,
                    Some(PortSource::Exact(p)) => write!(f, ":{}", p)?,
                    None => {}
                }
                if let Some(p) = path {
                    f.write_str(p)?;
                }
                Ok(())
            }
        }
    }
}

/// Sources listed for one directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList(Vec<Source>);

impl SourceList {
    fn parse(value: &str) -> Self {
        Self(value.split_whitespace().filter_map(Source::parse).collect())
    }

    /// Whether `url` matches any source in the list.
    pub fn allows(&self, url: &ResourceUrl, self_origin: &Origin) -> bool {
        self.0.iter().any(|s| s.matches(url, self_origin))
    }

    /// Parsed sources.
    pub fn sources(&self) -> &[Source] {
        &self.0
    }
}

/// One parsed policy header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPolicy {
    directives: Vec<(String, SourceList)>,
}

impl ContentPolicy {
    /// Parse a header value. Unknown directives are kept but never consulted;
    /// a directive repeated later in the same header is ignored.
    pub fn parse(header: &str) -> Self {
        let mut directives: Vec<(String, SourceList)> = Vec::new();
        for part in header.split(';') {
            let mut tokens = part.trim().splitn(2, char::is_whitespace);
            let name = match tokens.next() {
                Some(n) if !n.is_empty() => n.to_ascii_lowercase(),
                _ => continue,
            };
            if directives.iter().any(|(n, _)| *n == name) {
                continue;
            }
            let list = SourceList::parse(tokens.next().unwrap_or(""));
            directives.push((name, list));
        }
        Self { directives }
    }

    /// Source list for `name`, if the directive is present.
    pub fn directive(&self, name: &str) -> Option<&SourceList> {
        self.directives
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, l)| l)
    }

    /// Whether `url` may be loaded under `directive`.
    ///
    /// Absent directives fall back along the usual chain ending in
    /// `default-src`; with no applicable directive the load is allowed.
    pub fn allows(&self, directive: FetchDirective, url: &ResourceUrl, self_origin: &Origin) -> bool {
        directive
            .fallbacks()
            .iter()
            .find_map(|d| self.directive(d.name()))
            .map_or(true, |list| list.allows(url, self_origin))
    }
}

/// Every policy delivered with a document. A load must satisfy all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforcedPolicies(Vec<ContentPolicy>);

impl EnforcedPolicies {
    /// Collect the policy headers of a delivered response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self(
            headers
                .get_all(CONTENT_SECURITY_POLICY)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(ContentPolicy::parse)
                .collect(),
        )
    }

    /// Whether the document received no policy at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `url` may be loaded under `directive` by every policy.
    pub fn allows(&self, directive: FetchDirective, url: &ResourceUrl, self_origin: &Origin) -> bool {
        self.0.iter().all(|p| p.allows(directive, url, self_origin))
    }
}

fn scheme_matches(source: &str, target: &str) -> bool {
    source == target
        || matches!(
            (source, target),
            ("http", "https") | ("ws", "wss") | ("http", "ws") | ("https", "wss") | ("http", "wss")
        )
}

fn host_matches(source: &str, target: Option<&str>) -> bool {
    let Some(target) = target else {
        return false;
    };
    match source.strip_prefix("*.") {
        Some(suffix) => target.len() > suffix.len() && target.ends_with(&format!(".{}", suffix)),
        None => source == target,
    }
}

fn port_matches(source: Option<PortSource>, url: &ResourceUrl) -> bool {
    match source {
        Some(PortSource::Any) => true,
        Some(PortSource::Exact(p)) => url.port() == Some(p),
        None => url.port() == default_port(url.scheme()),
    }
}

fn path_matches(source: Option<&str>, target: &str) -> bool {
    match source {
        None => true,
        Some(p) if p.ends_with('/') => target.starts_with(p),
        Some(p) => target == p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::OFFLINE_HEADER;

    fn url(s: &str) -> ResourceUrl {
        ResourceUrl::parse(s).unwrap()
    }

    fn doc_origin() -> Origin {
        url("file:///opt/bundle/index.html").origin()
    }

    #[test]
    fn test_offline_policy_blocks_connections() {
        let policy = ContentPolicy::parse(OFFLINE_HEADER);
        let origin = doc_origin();
        for target in [
            "https://example.com",
            "https://api.github.com",
            "wss://echo.websocket.events",
            "file:///opt/bundle/data.json",
        ] {
            assert!(!policy.allows(FetchDirective::Connect, &url(target), &origin), "{}", target);
        }
    }

    #[test]
    fn test_offline_policy_images() {
        let policy = ContentPolicy::parse(OFFLINE_HEADER);
        let origin = doc_origin();
        assert!(policy.allows(FetchDirective::Img, &url("file:///opt/bundle/img/a.png"), &origin));
        assert!(policy.allows(FetchDirective::Img, &url("data:image/png;base64,AA=="), &origin));
        assert!(policy.allows(FetchDirective::Img, &url("blob:file:///1"), &origin));
        assert!(!policy.allows(FetchDirective::Img, &url("https://example.com/x.png"), &origin));
    }

    #[test]
    fn test_fallback_to_default_src() {
        let policy = ContentPolicy::parse("default-src 'self'");
        let origin = doc_origin();
        assert!(!policy.allows(FetchDirective::Connect, &url("https://example.com"), &origin));
        assert!(policy.allows(FetchDirective::Connect, &url("file:///opt/bundle/a"), &origin));
    }

    #[test]
    fn test_worker_falls_back_through_child() {
        let policy = ContentPolicy::parse("default-src 'none'; child-src blob:");
        let origin = doc_origin();
        assert!(policy.allows(FetchDirective::Worker, &url("blob:file:///2"), &origin));
        assert!(!policy.allows(FetchDirective::Worker, &url("file:///opt/w.js"), &origin));
    }

    #[test]
    fn test_host_source() {
        let policy = ContentPolicy::parse("connect-src 'self' https://example.com *.cdn.test:*");
        let origin = doc_origin();
        assert!(policy.allows(FetchDirective::Connect, &url("https://example.com/a"), &origin));
        assert!(!policy.allows(FetchDirective::Connect, &url("https://example.com:8443/"), &origin));
        assert!(!policy.allows(FetchDirective::Connect, &url("https://api.github.com"), &origin));
        assert!(policy.allows(FetchDirective::Connect, &url("https://a.cdn.test:9000/"), &origin));
        assert!(!policy.allows(FetchDirective::Connect, &url("https://cdn.test/"), &origin));
        assert!(!policy.allows(FetchDirective::Connect, &url("wss://echo.websocket.events"), &origin));
    }

    #[test]
    fn test_https_source_matches_wss() {
        let policy = ContentPolicy::parse("connect-src https://echo.example");
        assert!(policy.allows(
            FetchDirective::Connect,
            &url("wss://echo.example/"),
            &doc_origin()
        ));
    }

    #[test]
    fn test_wildcard_excludes_local_data_schemes() {
        let policy = ContentPolicy::parse("img-src *");
        let origin = doc_origin();
        assert!(policy.allows(FetchDirective::Img, &url("https://example.com/x.png"), &origin));
        assert!(policy.allows(FetchDirective::Img, &url("file:///opt/a.png"), &origin));
        assert!(!policy.allows(FetchDirective::Img, &url("data:image/png;base64,AA=="), &origin));
    }

    #[test]
    fn test_first_directive_wins() {
        let policy = ContentPolicy::parse("connect-src 'none'; connect-src *");
        assert!(!policy.allows(
            FetchDirective::Connect,
            &url("https://example.com"),
            &doc_origin()
        ));
    }

    #[test]
    fn test_no_policy_allows() {
        let policies = EnforcedPolicies::from_headers(&HeaderMap::new());
        assert!(policies.is_empty());
        assert!(policies.allows(
            FetchDirective::Connect,
            &url("https://example.com"),
            &doc_origin()
        ));
    }

    #[test]
    fn test_all_delivered_policies_apply() {
        let mut headers = HeaderMap::new();
        headers.append(CONTENT_SECURITY_POLICY, "connect-src *".parse().unwrap());
        headers.append(CONTENT_SECURITY_POLICY, "connect-src 'none'".parse().unwrap());
        let policies = EnforcedPolicies::from_headers(&headers);
        assert!(!policies.allows(
            FetchDirective::Connect,
            &url("https://example.com"),
            &doc_origin()
        ));
    }

    #[test]
    fn test_source_display_round_trip() {
        for token in ["'none'", "'self'", "*", "data:", "https://example.com:8443/api/", "*.cdn.test:*"] {
            let source = Source::parse(token).unwrap();
            assert_eq!(source.to_string(), token);
        }
    }
}
