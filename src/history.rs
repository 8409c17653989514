//! Shell-style recall of previously submitted terminal lines.

/// Submitted lines plus a recall cursor.
///
/// `position == entries.len()` is the live draft slot; any smaller position
/// means the draft shows `entries[position]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HistoryNavigator {
    entries: Vec<String>,
    position: usize,
}

impl HistoryNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitted lines in chronological order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a submitted line and returns the cursor to the draft slot.
    ///
    /// Callers reject empty lines and in-flight runs before recording.
    pub fn record(&mut self, line: String) {
        self.entries.push(line);
        self.position = self.entries.len();
    }

    /// Steps back one entry. Returns `None` when already at the oldest entry
    /// or when nothing was ever submitted.
    pub fn recall_previous(&mut self) -> Option<&str> {
        if self.position == 0 {
            return None;
        }

        self.position -= 1;
        self.entries.get(self.position).map(String::as_str)
    }

    /// Steps forward one entry. Moving past the newest entry returns an empty
    /// draft; at the draft slot this is a no-op returning `None`.
    pub fn recall_next(&mut self) -> Option<&str> {
        if self.position >= self.entries.len() {
            return None;
        }

        self.position += 1;
        Some(
            self.entries
                .get(self.position)
                .map_or("", String::as_str),
        )
    }
}
