//! URL helpers.

use mosaic_core::TrailingSlashPolicy;

/// Split a URL into its path and the remainder (`?query#fragment`).
///
/// Absolute URLs lose their scheme and host.
pub fn split_url(url: &str) -> (&str, &str) {
    let without_origin = match url.find("://") {
        Some(scheme_end) => {
            let after = &url[scheme_end + 3..];
            after.find('/').map_or("/", |slash| &after[slash..])
        }
        None => url,
    };

    match without_origin.find(|c| c == '?' || c == '#') {
        Some(idx) => (&without_origin[..idx], &without_origin[idx..]),
        None => (without_origin, ""),
    }
}

/// Normalize a path for matching: leading slash, no trailing slash except for `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// The URL the trailing-slash policy wants instead of `url`, if any.
pub fn trailing_slash_redirect(url: &str, policy: TrailingSlashPolicy) -> Option<String> {
    let (path, rest) = split_url(url);
    if path == "/" || path.is_empty() {
        return None;
    }

    match policy {
        TrailingSlashPolicy::DoNothing => None,
        TrailingSlashPolicy::RedirectToNonTrailingSlash if path.ends_with('/') => {
            Some(format!("{}{}", normalize_path(path), rest))
        }
        TrailingSlashPolicy::RedirectToTrailingSlash if !path.ends_with('/') => {
            Some(format!("{}/{}", path, rest))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_url() {
        assert_eq!(split_url("/news/1?x=1#top"), ("/news/1", "?x=1#top"));
        assert_eq!(split_url("/news#top"), ("/news", "#top"));
        assert_eq!(split_url("/news"), ("/news", ""));
        assert_eq!(split_url("https://example.com/a/b?q"), ("/a/b", "?q"));
        assert_eq!(split_url("https://example.com"), ("/", ""));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/news/"), "/news");
        assert_eq!(normalize_path("news"), "/news");
    }

    #[test]
    fn test_trailing_slash_redirect() {
        use TrailingSlashPolicy::*;

        assert_eq!(trailing_slash_redirect("/news/", DoNothing), None);
        assert_eq!(
            trailing_slash_redirect("/news/?a=1", RedirectToNonTrailingSlash),
            Some("/news?a=1".to_string())
        );
        assert_eq!(trailing_slash_redirect("/news", RedirectToNonTrailingSlash), None);
        assert_eq!(
            trailing_slash_redirect("/news?a=1", RedirectToTrailingSlash),
            Some("/news/?a=1".to_string())
        );
        assert_eq!(trailing_slash_redirect("/", RedirectToTrailingSlash), None);
    }
}
