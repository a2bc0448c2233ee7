use std::sync::LazyLock;

use regex::Regex;

use crate::error::InvalidUrlError;

static ABSOLUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:([A-Za-z][A-Za-z0-9+.\-]*):)?//([^/?#]*)(.*)$").unwrap());

const DOMAIN_PROPERTY_PREFIX: &str = "sc-domain:";

/// Query/fragment policy. The default keeps both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalizer {
    pub drop_query: bool,
    pub drop_fragment: bool,
}

/// Canonical key with the default policy.
pub fn normalize(raw: &str, base_domain: Option<&str>) -> Result<String, InvalidUrlError> {
    Normalizer::default().normalize(raw, base_domain)
}

#[derive(Debug, PartialEq, Eq)]
enum Base {
    /// URL-prefix property or bare host. Scheme is only compared when given.
    Origin { scheme: Option<String>, host: String },
    /// `sc-domain:` property: the domain and all of its subdomains.
    Domain(String),
}

impl Base {
    fn parse(base: &str) -> Option<Base> {
        let base = base.trim();
        if base.is_empty() {
            return None;
        }
        if let Some(domain) = base.strip_prefix(DOMAIN_PROPERTY_PREFIX) {
            let domain = domain.trim().trim_end_matches('/').to_ascii_lowercase();
            return (!domain.is_empty()).then_some(Base::Domain(domain));
        }
        if let Some(caps) = ABSOLUTE_RE.captures(base) {
            return Some(Base::Origin {
                scheme: caps.get(1).map(|m| m.as_str().to_ascii_lowercase()),
                host: caps[2].to_ascii_lowercase(),
            });
        }
        let host = base
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        (!host.is_empty()).then_some(Base::Origin { scheme: None, host })
    }

    fn matches(&self, scheme: Option<&str>, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Base::Origin {
                scheme: base_scheme,
                host: base_host,
            } => {
                let scheme_ok = match (base_scheme, scheme) {
                    (Some(b), Some(s)) => b.eq_ignore_ascii_case(s),
                    _ => true,
                };
                scheme_ok && *base_host == host
            }
            Base::Domain(domain) => {
                host == *domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|sub| sub.ends_with('.'))
            }
        }
    }
}

impl Normalizer {
    /// Turn a raw URL or path into the join key shared by every source.
    ///
    /// Strips the base origin when it matches, removes trailing slashes
    /// (the root stays `/`) and applies the query/fragment policy. Anything
    /// non-blank yields a key, however odd it looks.
    pub fn normalize(&self, raw: &str, base_domain: Option<&str>) -> Result<String, InvalidUrlError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidUrlError { raw: raw.to_string() });
        }
        let base = base_domain.and_then(Base::parse);

        let (origin, rest) = split_origin(trimmed, base.as_ref());
        let (path, query, fragment) = split_suffix(rest);

        let path = path.trim_end_matches(|c: char| c == '/' || c.is_whitespace());
        let path = if path.is_empty() { "/" } else { path };

        let mut key = origin.unwrap_or_default();
        key.push_str(path);
        if !self.drop_query {
            key.push_str(query);
        }
        if !self.drop_fragment {
            key.push_str(fragment);
        }
        // a dropped fragment can leave trailing blanks behind the query
        key.truncate(key.trim_end().len());
        Ok(key)
    }
}

/// Returns the origin to keep (lowercased) and the remainder of the url.
fn split_origin<'a>(raw: &'a str, base: Option<&Base>) -> (Option<String>, &'a str) {
    if let Some(caps) = ABSOLUTE_RE.captures(raw) {
        let scheme = caps.get(1).map(|m| m.as_str());
        let host = caps.get(2).map_or("", |m| m.as_str());
        let rest_start = caps.get(3).map_or(raw.len(), |m| m.start());
        if base.is_some_and(|b| b.matches(scheme, host)) {
            return (None, single_leading_slash(&raw[rest_start..]));
        }
        let origin = match scheme {
            Some(s) => format!("{}://{}", s.to_ascii_lowercase(), host.to_ascii_lowercase()),
            None => format!("//{}", host.to_ascii_lowercase()),
        };
        return (Some(origin), &raw[rest_start..]);
    }

    // "www.example.com/page" without a scheme
    if let Some(base) = base {
        let host_end = raw.find(['/', '?', '#']).unwrap_or(raw.len());
        let host = &raw[..host_end];
        if !host.is_empty() && base.matches(None, host) {
            return (None, single_leading_slash(&raw[host_end..]));
        }
    }
    (None, raw)
}

/// `//a` left behind a stripped origin would read as a host on the next pass.
fn single_leading_slash(rest: &str) -> &str {
    let tail = rest.trim_start_matches('/');
    if rest.len() - tail.len() > 1 {
        &rest[rest.len() - tail.len() - 1..]
    } else {
        rest
    }
}

/// Split into (path, "?query", "#fragment"). A `?` after `#` belongs to the fragment.
fn split_suffix(rest: &str) -> (&str, &str, &str) {
    let (before_fragment, fragment) = match rest.find('#') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let (path, query) = match before_fragment.find('?') {
        Some(i) => before_fragment.split_at(i),
        None => (before_fragment, ""),
    };
    (path, query, fragment)
}
