/// Per-message timing attributes.
///
/// Both fields are durations in seconds, interpreted *relative to the
/// current time* at the moment a backend consumes them. Each field carries
/// its own set-ness: an unset field is omitted from the wire encoding and
/// leaves the stored message untouched on update.
///
/// Getters return 0 for an unset field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attributes {
    ttl: Option<u32>,
    hide: Option<u32>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds until the message becomes deletable.
    pub fn set_ttl(&mut self, ttl: u32) -> &mut Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttl(&self) -> u32 {
        self.ttl.unwrap_or(0)
    }

    pub fn ttl_isset(&self) -> bool {
        self.ttl.is_some()
    }

    pub fn unset_ttl(&mut self) {
        self.ttl = None;
    }

    /// Seconds the message stays invisible to range reads. 0 unhides.
    pub fn set_hide(&mut self, hide: u32) -> &mut Self {
        self.hide = Some(hide);
        self
    }

    pub fn hide(&self) -> u32 {
        self.hide.unwrap_or(0)
    }

    pub fn hide_isset(&self) -> bool {
        self.hide.is_some()
    }

    pub fn unset_hide(&mut self) {
        self.hide = None;
    }

    /// Clears every field and its set-ness.
    pub fn unset_all(&mut self) {
        self.ttl = None;
        self.hide = None;
    }
}
