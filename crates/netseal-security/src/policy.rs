//! The fixed network-isolation policy.

use std::collections::BTreeSet;

use http::HeaderValue;
use netseal_core::is_network_scheme;
use serde::Serialize;

/// Result type for policy construction.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors from policy construction. All of them are configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("network scheme cannot be allowed: {0}")]
    NetworkSchemeAllowed(String),

    #[error("invalid scheme: {0:?}")]
    InvalidScheme(String),

    #[error("invalid directive name: {0:?}")]
    InvalidDirectiveName(String),

    #[error("directive {name} has an invalid value: {value:?}")]
    InvalidDirectiveValue { name: String, value: String },

    #[error("directive listed twice: {0}")]
    DuplicateDirective(String),

    #[error("unknown directive: {0}")]
    UnknownDirective(String),

    #[error("policy has no directives")]
    Empty,
}

/// Local schemes the bundle uses: on-disk files, embedded data, in-memory blobs.
pub const OFFLINE_SCHEMES: [&str; 3] = ["file", "data", "blob"];

/// Directives of the offline policy, in header order.
pub const OFFLINE_DIRECTIVES: [(&str, &str); 12] = [
    ("default-src", "'self'"),
    ("base-uri", "'self'"),
    ("script-src", "'self' 'unsafe-inline' 'unsafe-eval'"),
    ("style-src", "'self' 'unsafe-inline'"),
    ("img-src", "'self' data: blob:"),
    ("font-src", "'self' data:"),
    ("worker-src", "'self' blob:"),
    ("child-src", "'self' blob:"),
    ("connect-src", "'none'"),
    ("object-src", "'none'"),
    ("media-src", "'none'"),
    ("frame-src", "'none'"),
];

/// Rendered header value of the offline policy.
pub const OFFLINE_HEADER: &str = "default-src 'self'; base-uri 'self'; \
script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; \
img-src 'self' data: blob:; font-src 'self' data:; worker-src 'self' blob:; \
child-src 'self' blob:; connect-src 'none'; object-src 'none'; media-src 'none'; \
frame-src 'none'";

/// Immutable isolation policy.
///
/// Constructed once at startup and shared read-only. The allowed scheme set
/// never contains a network scheme; the header value is rendered once from
/// the ordered directives.
#[derive(Debug, Clone)]
pub struct Policy {
    allowed_schemes: BTreeSet<String>,
    directives: Vec<(String, String)>,
    header_value: HeaderValue,
}

impl Policy {
    /// The offline policy every deployment uses.
    pub fn offline() -> Self {
        Self {
            allowed_schemes: OFFLINE_SCHEMES.iter().map(|s| s.to_string()).collect(),
            directives: OFFLINE_DIRECTIVES
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            header_value: HeaderValue::from_static(OFFLINE_HEADER),
        }
    }

    /// Start an empty policy.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Start from the offline policy.
    pub fn offline_builder() -> PolicyBuilder {
        PolicyBuilder {
            allowed_schemes: OFFLINE_SCHEMES.iter().map(|s| s.to_string()).collect(),
            directives: OFFLINE_DIRECTIVES
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            unknown: Vec::new(),
        }
    }

    /// Whether `scheme` (any case) is an allowed local scheme.
    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_schemes.contains(&scheme.to_ascii_lowercase())
    }

    /// Directives in header order.
    pub fn directives(&self) -> &[(String, String)] {
        &self.directives
    }

    /// Value of a single directive.
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header value carrying every directive.
    pub fn header_value(&self) -> &HeaderValue {
        &self.header_value
    }

    /// Header value as text.
    pub fn header_str(&self) -> &str {
        // Built from validated visible ASCII, so this never falls back.
        self.header_value.to_str().unwrap_or_default()
    }

    /// Get a summary of the policy.
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            allowed_schemes: self.allowed_schemes.iter().cloned().collect(),
            denied_schemes: netseal_core::NETWORK_SCHEMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            directives: self.directives.len(),
            header: self.header_str().to_string(),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::offline()
    }
}

/// Summary of a policy.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub allowed_schemes: Vec<String>,
    pub denied_schemes: Vec<String>,
    pub directives: usize,
    pub header: String,
}

/// Builder for [`Policy`]; validation happens in [`PolicyBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    allowed_schemes: Vec<String>,
    directives: Vec<(String, String)>,
    unknown: Vec<String>,
}

impl PolicyBuilder {
    /// Allow a local scheme.
    pub fn allow_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.allowed_schemes.push(scheme.into());
        self
    }

    /// Append a directive.
    pub fn directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.push((name.into(), value.into()));
        self
    }

    /// Replace the value of an existing directive, keeping its position.
    ///
    /// Replacing a directive that is not present is reported by `build`.
    pub fn replace_directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .directives
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.unknown.push(name),
        }
        self
    }

    /// Validate and build the policy.
    pub fn build(self) -> PolicyResult<Policy> {
        let mut allowed_schemes = BTreeSet::new();
        for scheme in self.allowed_schemes {
            let scheme = scheme.trim().trim_end_matches(':').to_ascii_lowercase();
            if is_network_scheme(&scheme) {
                return Err(PolicyError::NetworkSchemeAllowed(scheme));
            }
            if !is_valid_scheme(&scheme) {
                return Err(PolicyError::InvalidScheme(scheme));
            }
            allowed_schemes.insert(scheme);
        }

        if let Some(name) = self.unknown.into_iter().next() {
            return Err(PolicyError::UnknownDirective(name));
        }

        if self.directives.is_empty() {
            return Err(PolicyError::Empty);
        }

        let mut directives: Vec<(String, String)> = Vec::with_capacity(self.directives.len());
        for (name, value) in self.directives {
            let name = name.trim().to_ascii_lowercase();
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");

            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(PolicyError::InvalidDirectiveName(name));
            }
            if value.is_empty()
                || value
                    .chars()
                    .any(|c| c == ';' || c == ',' || (!c.is_ascii_graphic() && c != ' '))
            {
                return Err(PolicyError::InvalidDirectiveValue { name, value });
            }
            if directives.iter().any(|(n, _)| *n == name) {
                return Err(PolicyError::DuplicateDirective(name));
            }
            directives.push((name, value));
        }

        let rendered = render(&directives);
        let header_value = HeaderValue::from_str(&rendered).map_err(|_| {
            PolicyError::InvalidDirectiveValue {
                name: "*".to_string(),
                value: rendered.clone(),
            }
        })?;

        Ok(Policy {
            allowed_schemes,
            directives,
            header_value,
        })
    }
}

fn render(directives: &[(String, String)]) -> String {
    directives
        .iter()
        .map(|(name, value)| format!("{} {}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
