use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use url::{Position, Url};

/// Board shown at `/`, aggregating every other board.
pub const ALL_BOARD: &str = "all";

static ROUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?:(?P<board>[a-z0-9]{1,10})(?:/(?:(?P<catalog>catalog)|(?P<thread>\d+))?)?)?$")
        .expect("valid route regex")
});

static BASE: Lazy<Url> = Lazy::new(|| Url::parse("http://localhost/").expect("valid base url"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed URL {url:?}: {reason}")]
pub struct ParseError {
    pub url: String,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(url: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where the user is: a board index, a board catalog or a thread.
///
/// Equality is page identity. Fragments and query parameters other than `last` are kept in
/// [`PageDescriptor::href`] but never make two descriptors differ.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    board: String,
    thread: Option<u64>,
    /// Only the last N replies of a thread are shown; 0 shows all.
    last_n: u32,
    catalog: bool,
    href: String,
}

impl PageDescriptor {
    /// Parses an absolute or root-relative URL.
    pub fn parse(href: &str) -> Result<Self, ParseError> {
        let url = match Url::parse(href) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => BASE
                .join(href)
                .map_err(|err| ParseError::new(href, err.to_string()))?,
            Err(err) => return Err(ParseError::new(href, err.to_string())),
        };
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, ParseError> {
        let caps = ROUTE_RE
            .captures(url.path())
            .ok_or_else(|| ParseError::new(url, "path does not name a board or thread"))?;

        let board = caps
            .name("board")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| ALL_BOARD.to_string());
        let thread = match caps.name("thread") {
            Some(m) => Some(
                m.as_str()
                    .parse::<u64>()
                    .map_err(|err| ParseError::new(url, format!("thread id: {err}")))?,
            ),
            None => None,
        };
        let last_n = match thread {
            Some(_) => url
                .query_pairs()
                .find(|(key, _)| key == "last")
                .and_then(|(_, value)| value.parse::<u32>().ok())
                .unwrap_or(0),
            None => 0,
        };

        Ok(Self {
            board,
            thread,
            last_n,
            catalog: caps.name("catalog").is_some(),
            href: url[Position::BeforePath..].to_string(),
        })
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    pub fn thread(&self) -> Option<u64> {
        self.thread
    }

    pub fn last_n(&self) -> u32 {
        self.last_n
    }

    pub fn is_catalog(&self) -> bool {
        self.catalog
    }

    /// Path, query and fragment, as pushed to the browser history.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Whether both descriptors show the same page. Only this decides whether following a
    /// link is a real navigation or a scroll within the current page.
    pub fn matches(&self, other: &PageDescriptor) -> bool {
        self.board == other.board
            && self.thread == other.thread
            && self.last_n == other.last_n
            && self.catalog == other.catalog
    }
}

impl PartialEq for PageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for PageDescriptor {}

impl fmt::Display for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href)
    }
}

pub fn matches(a: &PageDescriptor, b: &PageDescriptor) -> bool {
    a.matches(b)
}
