use std::fmt;

/// How much of each matched message a server should return.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Detail {
    #[default]
    None,
    Id,
    Attributes,
    Body,
    All,
}

impl Detail {
    /// The spelling used in query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Detail::None => "none",
            Detail::Id => "id",
            Detail::Attributes => "attributes",
            Detail::Body => "body",
            Detail::All => "all",
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Range-scan parameters for the list-shaped commands.
///
/// Every field is independently optional; an unset field falls back to the
/// backend's default (scan from the head, no limit, skip hidden messages)
/// and is omitted from the wire encoding. Getters return the zero value for
/// an unset field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Filters {
    match_hidden: Option<bool>,
    limit: Option<u32>,
    marker: Option<String>,
    detail: Option<Detail>,
    wait: Option<u32>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether hidden messages are included in range scans.
    pub fn set_match_hidden(&mut self, match_hidden: bool) -> &mut Self {
        self.match_hidden = Some(match_hidden);
        self
    }

    pub fn match_hidden(&self) -> bool {
        self.match_hidden.unwrap_or(false)
    }

    pub fn match_hidden_isset(&self) -> bool {
        self.match_hidden.is_some()
    }

    pub fn unset_match_hidden(&mut self) {
        self.match_hidden = None;
    }

    /// Maximum number of elements a range scan touches.
    pub fn set_limit(&mut self, limit: u32) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(0)
    }

    pub fn limit_isset(&self) -> bool {
        self.limit.is_some()
    }

    pub fn unset_limit(&mut self) {
        self.limit = None;
    }

    /// Key a range scan starts from. A key that matches no element means
    /// "start from the head".
    pub fn set_marker(&mut self, marker: impl Into<String>) -> &mut Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn marker_isset(&self) -> bool {
        self.marker.is_some()
    }

    pub fn unset_marker(&mut self) {
        self.marker = None;
    }

    pub fn set_detail(&mut self, detail: Detail) -> &mut Self {
        self.detail = Some(detail);
        self
    }

    pub fn detail(&self) -> Detail {
        self.detail.unwrap_or_default()
    }

    pub fn detail_isset(&self) -> bool {
        self.detail.is_some()
    }

    pub fn unset_detail(&mut self) {
        self.detail = None;
    }

    /// Long-poll hint, in seconds. Forwarded to the server; the memory
    /// backend ignores it.
    pub fn set_wait(&mut self, wait: u32) -> &mut Self {
        self.wait = Some(wait);
        self
    }

    pub fn wait(&self) -> u32 {
        self.wait.unwrap_or(0)
    }

    pub fn wait_isset(&self) -> bool {
        self.wait.is_some()
    }

    pub fn unset_wait(&mut self) {
        self.wait = None;
    }

    /// Clears every field and its set-ness.
    pub fn unset_all(&mut self) {
        *self = Self::default();
    }
}
