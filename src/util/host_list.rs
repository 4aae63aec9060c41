//! Host-list canonicalization (§6, Glossary).
//!
//! `exec_host` strings look like `NODE12/0+NODE03/1+NODE12/2+-1/0`: a
//! `+`-separated list of `<token>/<slot>` pairs, where some tokens are
//! negative placeholder slots rather than real hostnames. The canonical form
//! extracts the real hostname tokens, uppercases them, dedupes, sorts, and
//! wraps them as `{H1_C,H2_C,...}`.

use regex::Regex;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z]+\d+$").expect("static regex is valid"))
}

/// Parse an `exec_host` string into its canonical host-list form. Returns
/// `None` if no token matches `[A-Z]+\d+` (case-insensitive).
pub fn canonicalize(exec_host: &str) -> Option<String> {
    let token_re = token_pattern();
    let mut hosts: Vec<String> = exec_host
        .split('+')
        .filter_map(|part| part.split('/').next())
        .filter(|prefix| token_re.is_match(prefix))
        .map(|prefix| prefix.to_uppercase())
        .collect();
    if hosts.is_empty() {
        return None;
    }
    hosts.sort();
    hosts.dedup();
    let joined = hosts
        .into_iter()
        .map(|h| format!("{h}_C"))
        .collect::<Vec<_>>()
        .join(",");
    Some(format!("{{{joined}}}"))
}
