use md5::{Digest, Md5};

/// The on-disk filename for a fetched page's raw body: the hex-encoded
/// MD5 of the URL, with a `.html` extension. Collisions are not a
/// concern here — MD5 is used purely as a stable, filesystem-safe key,
/// not for any security property.
pub fn url_to_filename(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    format!("{:x}.html", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_hashes_to_same_filename() {
        let a = url_to_filename("https://example.com/a");
        let b = url_to_filename("https://example.com/a");
        assert_eq!(a, b);
        assert!(a.ends_with(".html"));
    }

    #[test]
    fn different_urls_hash_differently() {
        let a = url_to_filename("https://example.com/a");
        let b = url_to_filename("https://example.com/b");
        assert_ne!(a, b);
    }
}
