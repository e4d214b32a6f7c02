//! URL localization seam.

use mosaic_core::I18nSettings;

use crate::url::split_url;

/// Strips locale information from URLs before route matching.
pub trait UrlLocalizer: Send + Sync {
    /// The URL with any locale marker removed.
    fn unlocalize(&self, url: &str) -> String;

    /// The locale a URL is expressed in.
    fn locale_of(&self, url: &str) -> Option<String>;
}

/// Localizer for pages without localized URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLocalizer;

impl UrlLocalizer for NoopLocalizer {
    fn unlocalize(&self, url: &str) -> String {
        url.to_string()
    }

    fn locale_of(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Localizer for `/{locale}/...` URLs. The default locale has no prefix.
#[derive(Debug, Clone)]
pub struct PrefixLocalizer {
    default_locale: String,
    prefixed: Vec<String>,
}

impl PrefixLocalizer {
    /// Create a localizer.
    pub fn new(default_locale: impl Into<String>, supported: &[&str]) -> Self {
        let default_locale = default_locale.into();
        let prefixed = supported
            .iter()
            .filter(|l| **l != default_locale)
            .map(|l| l.to_string())
            .collect();
        Self {
            default_locale,
            prefixed,
        }
    }

    /// Build from i18n settings.
    pub fn from_settings(settings: &I18nSettings) -> Self {
        let supported: Vec<&str> = settings.supported_locales.iter().map(String::as_str).collect();
        Self::new(settings.default_locale.clone(), &supported)
    }

    fn prefix_of<'a>(&self, path: &'a str) -> Option<(&str, &'a str)> {
        let trimmed = path.strip_prefix('/')?;
        let (first, rest) = match trimmed.find('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
            None => (trimmed, ""),
        };
        self.prefixed
            .iter()
            .find(|l| l.as_str() == first)
            .map(|l| (l.as_str(), rest))
    }
}

impl UrlLocalizer for PrefixLocalizer {
    fn unlocalize(&self, url: &str) -> String {
        let (path, rest) = split_url(url);
        match self.prefix_of(path) {
            Some((_, "")) => format!("/{}", rest),
            Some((_, remainder)) => format!("{}{}", remainder, rest),
            None => url.to_string(),
        }
    }

    fn locale_of(&self, url: &str) -> Option<String> {
        let (path, _) = split_url(url);
        Some(
            self.prefix_of(path)
                .map_or_else(|| self.default_locale.clone(), |(locale, _)| locale.to_string()),
        )
    }
}
