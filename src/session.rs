//! Connection session state management.

/// Per-connection reader state: the selected group and the current article
/// number within it. Scoped to the connection task, never shared.
#[derive(Debug, Default)]
pub struct Session {
    current_group: Option<String>,
    current_article: Option<u64>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_group(&mut self, group: String, first_article: Option<u64>) {
        self.current_group = Some(group);
        self.current_article = first_article;
    }

    #[must_use]
    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_deref()
    }

    #[must_use]
    pub fn current_article(&self) -> Option<u64> {
        self.current_article
    }

    pub fn set_current_article(&mut self, num: u64) {
        self.current_article = Some(num);
    }
}
