use std::time::{Duration, Instant};

/// A transient status line that clears itself once its deadline passes
#[derive(Debug, Clone, Default)]
pub struct Notice {
    current: Option<(String, Option<Instant>)>,
}

impl Notice {
    /// Show `text` until replaced or cleared.
    pub fn set(&mut self, text: impl Into<String>) {
        self.current = Some((text.into(), None));
    }

    /// Show `text` for `lifetime`, superseding whatever was shown before.
    pub fn flash(&mut self, text: impl Into<String>, lifetime: Duration) {
        self.flash_at(text, Instant::now(), lifetime);
    }

    pub fn flash_at(&mut self, text: impl Into<String>, now: Instant, lifetime: Duration) {
        self.current = Some((text.into(), Some(now + lifetime)));
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn text(&self) -> Option<&str> {
        self.current.as_ref().map(|(text, _)| text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Drop the notice if its deadline has passed. Returns true if it was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.current {
            Some((_, Some(deadline))) if now >= deadline => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}
