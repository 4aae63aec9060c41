//! Folder discovery: parse an HTTP directory index for anchors matching the
//! configured folder pattern, sorted chronologically (§4.2).
//!
//! Grounded on `FolderDiscovery` in
//! `examples/original_source/.../extractors/http_extractor.py`, which parses
//! anchor `href`s rather than raw page text — an index page commonly has
//! unrelated links ("../", CSS, JS assets) interleaved with the folder
//! listing, and matching only anchor hrefs avoids false positives from those.

use crate::error::SourceError;
use crate::Result;
use anyhow::Context;
use regex::Regex;

/// Extract `href="..."` targets from an HTML page. This is intentionally
/// not a full HTML parser — directory index pages generated by common HTTP
/// servers (Apache/nginx autoindex) emit simple, well-formed anchor tags,
/// and a regex scan is sufficient and avoids pulling in an HTML-parsing
/// dependency the rest of this crate has no other use for.
fn extract_hrefs(html: &str) -> Vec<String> {
    let anchor_re = Regex::new(r#"(?i)<a\s+[^>]*href\s*=\s*["']([^"']+)["']"#).unwrap();
    anchor_re
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Discover candidate folder names from an index page, keeping entries that
/// match `folder_pattern` (default `^\d{4}-\d{2}/?$`), sorted chronologically.
pub fn discover_folders(index_html: &str, folder_pattern: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(folder_pattern)
        .with_context(|| format!("compiling folder pattern `{folder_pattern}`"))?;
    let mut folders: Vec<String> = extract_hrefs(index_html)
        .into_iter()
        .map(|href| href.trim_end_matches('/').to_string())
        .filter(|name| pattern.is_match(name))
        .collect();
    folders.sort();
    folders.dedup();
    Ok(folders)
}

/// Fetch and parse the index at `base_url` using a blocking client.
pub fn fetch_index(client: &reqwest::blocking::Client, base_url: &str) -> Result<String> {
    let response = client
        .get(base_url)
        .send()
        .map_err(|e| SourceError::IndexUnreachable {
            url: base_url.to_string(),
            source: e.into(),
        })?;
    let response = response
        .error_for_status()
        .map_err(|e| SourceError::IndexUnreachable {
            url: base_url.to_string(),
            source: e.into(),
        })?;
    response
        .text()
        .with_context(|| format!("reading index body from {base_url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INDEX: &str = r#"
        <html><body>
        <a href="../">Parent Directory</a>
        <a href="2016-10/">2016-10/</a>
        <a href="2016-09/">2016-09/</a>
        <a href="2016-11/">2016-11/</a>
        <a href="style.css">style.css</a>
        <a href="README.txt">README.txt</a>
        </body></html>
    "#;

    #[test]
    fn keeps_only_monthly_folders_sorted() {
        let folders = discover_folders(SAMPLE_INDEX, r"^\d{4}-\d{2}/?$").unwrap();
        assert_eq!(folders, vec!["2016-09", "2016-10", "2016-11"]);
    }

    #[test]
    fn ignores_unrelated_links() {
        let folders = discover_folders(SAMPLE_INDEX, r"^\d{4}-\d{2}/?$").unwrap();
        assert!(!folders.iter().any(|f| f.contains("README")));
        assert!(!folders.contains(&"..".to_string()));
    }

    #[test]
    fn invalid_pattern_errors_cleanly() {
        assert!(discover_folders(SAMPLE_INDEX, "(unclosed").is_err());
    }

    #[test]
    fn empty_index_yields_empty_list() {
        assert_eq!(discover_folders("<html></html>", r"^\d{4}-\d{2}/?$").unwrap(), Vec::<String>::new());
    }
}
