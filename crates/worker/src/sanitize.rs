//! Inbound prompt scrubbing.

/// Strips control markers a client could smuggle into prompt text: role
/// tags, think-block markers, end-of-turn markers, and a literal `User:`
/// label. Compiled once at startup.
pub struct Sanitizer {
    markers: regex::Regex,
}

impl Sanitizer {
    pub fn new() -> Self {
        let markers = regex::Regex::new(r"(<\|user\|>|</?think>|</?im_end>|User:)")
            .expect("marker pattern is valid");
        Self { markers }
    }

    /// Remove all markers and trim surrounding whitespace.
    pub fn clean(&self, message: &str) -> String {
        self.markers.replace_all(message, "").trim().to_owned()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}
