/// Submitted prompts, oldest first, with one optional selection for the host's list widget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<String>,
    selected: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prompt and select it.
    pub fn push(&mut self, prompt: impl Into<String>) {
        self.entries.push(prompt.into());
        self.selected = Some(self.entries.len() - 1);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.and_then(|i| self.entries.get(i)).map(String::as_str)
    }

    /// Select an entry; out-of-range indices are clamped to the last entry.
    pub fn select(&mut self, index: usize) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        self.selected = Some(index.min(self.entries.len() - 1));
        self.selected()
    }

    /// Move the selection towards older entries.
    pub fn select_previous(&mut self) -> Option<&str> {
        let i = match self.selected {
            Some(i) => i.saturating_sub(1),
            None => self.entries.len().checked_sub(1)?,
        };
        self.select(i)
    }

    /// Move the selection towards newer entries.
    pub fn select_next(&mut self) -> Option<&str> {
        let i = self.selected.map_or(0, |i| i + 1);
        self.select(i)
    }
}
