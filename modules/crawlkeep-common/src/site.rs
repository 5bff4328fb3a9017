use regex::Regex;
use std::sync::OnceLock;

fn site_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid site-name regex"))
}

/// Derive a canonical site name from a seed URL: the host with dots
/// replaced by underscores. Falls back to the raw input if it doesn't
/// parse as a URL (mirrors the original's permissive behavior).
pub fn site_name_from_url(seed_url: &str) -> String {
    match url::Url::parse(seed_url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or(seed_url);
            host.replace('.', "_")
        }
        Err(_) => seed_url.replace('.', "_"),
    }
}

/// Validate an operator-supplied site name against `^[A-Za-z0-9_]+$`.
pub fn is_valid_site_name(name: &str) -> bool {
    !name.is_empty() && site_name_re().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_site_name_from_host() {
        assert_eq!(site_name_from_url("https://example.com/foo"), "example_com");
    }

    #[test]
    fn derives_site_name_from_subdomain() {
        assert_eq!(site_name_from_url("https://blog.example.co.uk"), "blog_example_co_uk");
    }

    #[test]
    fn validates_operator_supplied_names() {
        assert!(is_valid_site_name("my_site_1"));
        assert!(!is_valid_site_name("my site"));
        assert!(!is_valid_site_name("my-site"));
        assert!(!is_valid_site_name(""));
    }
}
