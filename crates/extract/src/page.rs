use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Rendered content of one tab, as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    /// Markup of the document body.
    pub html: String,
    /// Rendered visible text. May be empty when the host only supplies markup.
    pub text: String,
}

impl PageContent {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            html: html.into(),
            text: text.into(),
        }
    }

    /// Page known only by its markup (saved HTML files, tests).
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self::new(url, "", html, "")
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Visible text, falling back to the text nodes of the markup.
    pub fn visible_text(&self) -> String {
        if !self.text.trim().is_empty() {
            return self.text.clone();
        }
        let document = self.document();
        let mut out = String::new();
        for chunk in document.root_element().text() {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(chunk);
        }
        out
    }

    pub(crate) fn url_lower(&self) -> String {
        self.url.to_lowercase()
    }

    pub(crate) fn html_lower(&self) -> String {
        self.html.to_lowercase()
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector `{}`: {}", css, e))
}

/// Text content of an element with surrounding whitespace trimmed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

static LEADING_FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
        .expect("leading float regex is valid")
});

/// Lenient number parse: the longest numeric prefix after leading whitespace.
///
/// `"12.5 ms"` gives `12.5`, `"n/a"` gives `None`.
pub fn parse_leading_float(s: &str) -> Option<f64> {
    let m = LEADING_FLOAT.find(s.trim_start())?;
    m.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}
