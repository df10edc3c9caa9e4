//! URL to site-rule matching.
//!
//! Matching is deliberately loose: a pattern matches when the host equals it,
//! when the host is a subdomain of it, or when `host + path` simply starts with
//! it. The last branch is what makes path-scoped patterns such as
//! `youtube.com/shorts` work, and it also lets a short pattern like `x` match any
//! `x...` host. That permissiveness is product behaviour and is kept as is.

use crate::models::{SiteCategory, SiteRule};
use url::Url;

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Host of `url` without a leading `www.`, or an empty string if the URL does
/// not parse.
pub fn extract_domain(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => strip_www(parsed.host_str().unwrap_or("")).to_string(),
        Err(_) => String::new(),
    }
}

pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let hostname = strip_www(parsed.host_str().unwrap_or("")).to_lowercase();
    let full_path = format!("{}{}", hostname, parsed.path()).to_lowercase();

    let pattern = pattern.to_lowercase();
    let pattern = strip_www(&pattern);

    full_path.starts_with(pattern)
        || hostname == pattern
        || hostname.ends_with(&format!(".{}", pattern))
}

/// First enabled rule of an enabled category matching `url`, in category then
/// site order.
pub fn find_matching_rule<'a>(url: &str, categories: &'a [SiteCategory]) -> Option<&'a SiteRule> {
    categories
        .iter()
        .filter(|category| category.enabled)
        .flat_map(|category| category.sites.iter())
        .find(|site| site.enabled && matches_pattern(url, &site.pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockMode;

    fn category(enabled: bool, sites: Vec<SiteRule>) -> SiteCategory {
        SiteCategory {
            id: "c".to_string(),
            name: "Test".to_string(),
            enabled,
            sites,
            is_custom: true,
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.reddit.com/r/rust"), "reddit.com");
        assert_eq!(extract_domain("https://old.reddit.com/"), "old.reddit.com");
        assert_eq!(extract_domain("not a url"), "");
    }

    #[test]
    fn test_matches_host_and_subdomain() {
        assert!(matches_pattern("https://reddit.com/", "reddit.com"));
        assert!(matches_pattern("https://sub.reddit.com/x", "reddit.com"));
        assert!(matches_pattern("https://www.reddit.com/x", "www.reddit.com"));
        assert!(!matches_pattern("https://notreddit.com", "reddit.com"));
        assert!(!matches_pattern("https://example.com", "reddit.com"));
    }

    #[test]
    fn test_matches_path_scoped_pattern() {
        assert!(matches_pattern("https://youtube.com/shorts/abc", "youtube.com/shorts"));
        assert!(matches_pattern("https://www.YouTube.com/Shorts/abc", "youtube.com/shorts"));
        assert!(!matches_pattern("https://youtube.com/watch?v=1", "youtube.com/shorts"));
    }

    #[test]
    fn test_loose_prefix_is_preserved() {
        assert!(matches_pattern("https://xkcd.com/", "x"));
        assert!(matches_pattern("https://foo.x/", "x"));
    }

    #[test]
    fn test_malformed_url_never_matches() {
        assert!(!matches_pattern("::::", "reddit.com"));
        assert!(!matches_pattern("", ""));
    }

    #[test]
    fn test_first_enabled_match_wins() {
        let mut disabled = SiteRule::new("a", "reddit.com", BlockMode::Block);
        disabled.enabled = false;
        let categories = vec![
            category(false, vec![SiteRule::new("b", "reddit.com", BlockMode::Block)]),
            category(
                true,
                vec![
                    disabled,
                    SiteRule::new("c", "reddit.com", BlockMode::Friction),
                    SiteRule::new("d", "reddit.com", BlockMode::Block),
                ],
            ),
        ];

        let rule = find_matching_rule("https://reddit.com/r/all", &categories).unwrap();
        assert_eq!(rule.id, "c");
        assert!(find_matching_rule("https://example.com", &categories).is_none());
    }
}
