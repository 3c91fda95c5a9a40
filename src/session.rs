use crate::config::LabelConfig;

/// Which label (and sub-label) the next shot is filed under.
///
/// The sub-label is only ever set while the distinguished primary label is
/// active; switching to any other primary clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    primary: Option<String>,
    sub: Option<String>,
}

impl SelectionState {
    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn sub(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    /// Returns false for labels that are not configured
    pub fn select_primary(&mut self, labels: &LabelConfig, label: &str) -> bool {
        if !labels.primary.iter().any(|l| l == label) {
            log::warn!("Ignoring unknown label: {}", label);
            return false;
        }
        if label != labels.distinguished {
            self.sub = None;
        }
        self.primary = Some(label.to_string());
        true
    }

    /// Only honored while the distinguished label is active
    pub fn select_sub(&mut self, labels: &LabelConfig, sub: &str) -> bool {
        if !self.requires_sub(labels) || !labels.sub_labels.iter().any(|s| s == sub) {
            return false;
        }
        self.sub = Some(sub.to_string());
        true
    }

    pub fn requires_sub(&self, labels: &LabelConfig) -> bool {
        self.primary.as_deref() == Some(labels.distinguished.as_str())
    }
}

/// Everything that changes while the tool runs; never persisted
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub selection: SelectionState,
    pub shot_count: u32,
    pub status: String,
}

impl SessionState {
    pub fn reset_counter(&mut self) {
        self.shot_count = 0;
        self.status = "Counter reset.".to_string();
    }
}
