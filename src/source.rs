//! Program text edited alongside a session, with save tracking.

/// The program-mode source of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBuffer {
    file_id: Option<String>,
    title: String,
    text: String,
    dirty: bool,
}

impl SourceBuffer {
    /// An unsaved scratch buffer.
    #[must_use]
    pub fn scratch() -> Self {
        Self::default()
    }

    /// A buffer loaded from storage; starts clean.
    #[must_use]
    pub fn loaded(
        file_id: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            file_id: Some(file_id.into()),
            title: title.into(),
            text: text.into(),
            dirty: false,
        }
    }

    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replaces the text. Returns true when the text changed.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.text {
            return false;
        }

        self.text = text;
        self.dirty = true;
        true
    }

    /// Empties the buffer; always leaves it dirty.
    pub fn clear(&mut self) {
        self.text.clear();
        self.dirty = true;
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Only stored files with unsaved edits can be saved.
    #[must_use]
    pub fn can_save(&self) -> bool {
        self.file_id.is_some() && self.dirty
    }

    /// Plain-text file name used when exporting the buffer.
    #[must_use]
    pub fn export_file_name(&self) -> String {
        let stem = self.title.split('.').next().unwrap_or_default().trim();
        if stem.is_empty() {
            "untitled.txt".to_string()
        } else {
            format!("{stem}.txt")
        }
    }
}
