//! Spinner markup.

use mosaic_core::SpinnerSettings;

/// Markup used when no custom spinner is configured.
pub const DEFAULT_SPINNER_MARKUP: &str = r#"<div class="mosaic-spinner" role="progressbar">Loading...</div>"#;

/// Spinner markup split into inert markup and the scripts it embeds.
///
/// Inserted markup does not run its scripts, so they are executed separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinnerMarkup {
    /// Markup with every `<script>` block removed.
    pub markup: String,
    /// Bodies of the removed `<script>` blocks, in document order.
    pub scripts: Vec<String>,
}

impl SpinnerMarkup {
    /// Split markup into markup and scripts.
    pub fn parse(source: &str) -> Self {
        let (markup, scripts) = extract_scripts(source);
        Self { markup, scripts }
    }

    /// Markup for the configured spinner.
    pub fn from_settings(settings: &SpinnerSettings) -> Self {
        Self::parse(settings.custom_html.as_deref().unwrap_or(DEFAULT_SPINNER_MARKUP))
    }
}

/// Remove `<script>` blocks from markup, returning the rest and the script bodies.
///
/// Tag matching is case-insensitive. An unterminated block runs to the end of
/// the input.
pub fn extract_scripts(source: &str) -> (String, Vec<String>) {
    let lower = source.to_ascii_lowercase();
    let mut markup = String::with_capacity(source.len());
    let mut scripts = Vec::new();
    let mut pos = 0;

    while let Some(start) = lower[pos..].find("<script").map(|i| i + pos) {
        markup.push_str(&source[pos..start]);

        let Some(body_start) = lower[start..].find('>').map(|i| i + start + 1) else {
            pos = source.len();
            break;
        };
        let (body_end, next) = match lower[body_start..].find("</script>") {
            Some(i) => (body_start + i, body_start + i + "</script>".len()),
            None => (source.len(), source.len()),
        };

        let body = source[body_start..body_end].trim();
        if !body.is_empty() {
            scripts.push(body.to_string());
        }
        pos = next;
    }

    markup.push_str(&source[pos..]);
    (markup, scripts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_scripts() {
        let spinner = SpinnerMarkup::parse("<div>wait</div>");

        assert_eq!(spinner.markup, "<div>wait</div>");
        assert!(spinner.scripts.is_empty());
    }

    #[test]
    fn test_scripts_are_extracted_in_order() {
        let source = r#"<div id="s"></div><script>start()</script><p>x</p><SCRIPT type="text/javascript">
            tick()
        </SCRIPT>"#;

        let spinner = SpinnerMarkup::parse(source);

        assert_eq!(spinner.markup, r#"<div id="s"></div><p>x</p>"#);
        assert_eq!(spinner.scripts, vec!["start()".to_string(), "tick()".to_string()]);
    }

    #[test]
    fn test_unterminated_script() {
        let (markup, scripts) = extract_scripts("<b>hi</b><script>run()");

        assert_eq!(markup, "<b>hi</b>");
        assert_eq!(scripts, vec!["run()".to_string()]);
    }

    #[test]
    fn test_default_markup() {
        let spinner = SpinnerMarkup::from_settings(&SpinnerSettings::default());
        assert_eq!(spinner.markup, DEFAULT_SPINNER_MARKUP);
    }
}
