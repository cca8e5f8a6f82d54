//! Markdown file and image references: `[legend](path)` and `![legend](path)`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?P<legend>.*?)\]\((?P<path>.*?)\)").unwrap());
static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[(?P<legend>.*?)\]\((?P<path>.*?)\)").unwrap());

const SEPARATORS: &[char] = &['/', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Link,
    Image,
}

/// A file reference found in Markdown text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: RefKind,
    pub legend: String,
    pub path: String,
}

impl Reference {
    pub fn link(legend: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Link,
            legend: legend.into(),
            path: path.into(),
        }
    }

    pub fn image(legend: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Image,
            legend: legend.into(),
            path: path.into(),
        }
    }

    /// Last segment of the path, whatever separator the author used.
    pub fn filename(&self) -> &str {
        filename(&self.path)
    }

    fn from_captures(kind: RefKind, caps: &Captures<'_>) -> Self {
        Self {
            kind,
            legend: caps["legend"].to_string(),
            path: caps["path"].to_string(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == RefKind::Image {
            f.write_str("!")?;
        }
        write!(f, "[{}]({})", self.legend, self.path)
    }
}

/// Every `[legend](path)` in `text`, images included, in order of appearance.
/// Paths are not validated: web URLs come out like any other path.
pub fn find_file_references(text: &str) -> impl Iterator<Item = Reference> + '_ {
    LINK_RE
        .captures_iter(text)
        .map(|caps| Reference::from_captures(RefKind::Link, &caps))
}

/// Every `![legend](path)` in `text`.
pub fn find_image_references(text: &str) -> impl Iterator<Item = Reference> + '_ {
    IMAGE_RE
        .captures_iter(text)
        .map(|caps| Reference::from_captures(RefKind::Image, &caps))
}

/// Basename of a `/` or `\` separated path. Trailing separators are ignored.
pub fn filename(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATORS);
    trimmed.rsplit(SEPARATORS).next().unwrap_or(trimmed)
}

/// Scheme and host the API is served from, e.g. `https://oser-cs.fr`.
pub fn site_domain(secure: bool, host: &str) -> String {
    let scheme = if secure { "https://" } else { "http://" };
    format!("{}{}", scheme, host)
}

/// Prefix local image paths with `domain` so that a foreign server can render
/// them. Images that already point to the web are left alone.
pub fn prefix_image_paths(domain: &str, content: &str) -> String {
    IMAGE_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let reference = Reference::from_captures(RefKind::Image, caps);
            if reference.path.starts_with("http") {
                return reference.to_string();
            }
            Reference::image(reference.legend, format!("{}{}", domain, reference.path)).to_string()
        })
        .into_owned()
}
