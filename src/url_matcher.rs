/// URL normalization and rule pattern matching for Tab Muter
///
/// Every comparison happens on protocol-stripped URLs, so `http://`,
/// `https://` and bare hostnames all compare equal. Matching is
/// case-sensitive and covers the whole remaining URL (path, query,
/// fragment, credentials and port included).
use log::warn;
use regex::Regex;
use url::Url;

use crate::error::{MuteError, Result};

/// Remove leading `scheme://` or `scheme:/` prefixes
///
/// Prefixes are stripped repeatedly, so the result never starts with
/// another scheme and stripping twice is the same as stripping once.
///
/// Examples:
/// - https://www.example.com/page → www.example.com/page
/// - file:/tmp/a.html → tmp/a.html
/// - www.example.com → www.example.com
pub fn strip_protocol(url: &str) -> &str {
    let mut rest = url;
    while let Some(stripped) = strip_one_scheme(rest) {
        rest = stripped;
    }
    rest
}

fn strip_one_scheme(url: &str) -> Option<&str> {
    let colon = url.find(':')?;
    let mut scheme = url[..colon].chars();

    let first = scheme.next()?;
    if !first.is_ascii_alphabetic()
        || !scheme.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }

    let after = &url[colon + 1..];
    after.strip_prefix("//").or_else(|| after.strip_prefix('/'))
}

/// Two URLs match when they are equal once their protocols are stripped
pub fn urls_match(a: &str, b: &str) -> bool {
    strip_protocol(a) == strip_protocol(b)
}

/// Build the matcher for a single rule pattern
///
/// Wildcard mode: `*` matches any run of non-space characters and the
/// pattern is anchored at both ends. Regex mode: the protocol-stripped
/// pattern is the regex body, unanchored, so authors add their own anchors.
pub fn compile_pattern(pattern: &str, use_regex: bool) -> Result<Regex> {
    let stripped = strip_protocol(pattern.trim());

    let source = if use_regex {
        stripped.to_string()
    } else {
        let body = stripped
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\S*");
        format!("^{}$", body)
    };

    Regex::new(&source).map_err(|e| MuteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Test one rule pattern against a URL
///
/// An empty URL or empty pattern never matches. A pattern that fails to
/// compile is logged and treated as a non-match.
pub fn url_pattern_match(pattern: &str, url: &str, use_regex: bool) -> bool {
    if url.trim().is_empty() || strip_protocol(pattern.trim()).is_empty() {
        return false;
    }

    match compile_pattern(pattern, use_regex) {
        Ok(re) => re.is_match(strip_protocol(url)),
        Err(e) => {
            warn!("Skipping rule: {}", e);
            false
        }
    }
}

/// True if any pattern in the list matches the URL
pub fn is_in_list(patterns: &[String], url: &str, use_regex: bool) -> bool {
    patterns
        .iter()
        .any(|pattern| url_pattern_match(pattern, url, use_regex))
}

/// True if any entry normalizes to exactly this URL
pub fn is_exact_url_in_list(patterns: &[String], url: &str) -> bool {
    !url.trim().is_empty() && patterns.iter().any(|entry| urls_match(entry, url))
}

/// True if the derived domain pattern of the URL is literally in the list
///
/// No wildcard evaluation happens here: `example.com/*` is not "in the list"
/// for `sub.example.com`, even though `*.example.com/*` would match it.
pub fn is_domain_in_list(patterns: &[String], url: &str, use_regex: bool) -> bool {
    if url.trim().is_empty() {
        return false;
    }

    let pattern = domain_pattern(url, use_regex);
    patterns.iter().any(|entry| *entry == pattern)
}

/// Derive the "this host, any path" rule for a URL
///
/// Examples:
/// - https://www.example.com/page?q=1 → www.example.com/*
/// - http://user:pw@localhost:3000/x → localhost:3000/* (regex mode: localhost:3000/.*)
pub fn domain_pattern(url: &str, use_regex: bool) -> String {
    let suffix = if use_regex { "/.*" } else { "/*" };
    format!("{}{}", host_and_port(url).unwrap_or_default(), suffix)
}

/// Extract `host[:port]` from a URL, dropping credentials, path, query and fragment
pub fn host_and_port(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Ok(parsed) = Url::parse(url) {
        if let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) {
            return Some(match parsed.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            });
        }
    }

    // Scheme-less input such as "www.example.com/path"
    let authority = strip_protocol(url).split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Whether two URLs point at the same host and port
pub fn same_domain(a: &str, b: &str) -> bool {
    host_and_port(a) == host_and_port(b)
}
