//! Per-rig "warn once" latch for missing scene data.

use hashbrown::HashSet;

#[derive(Clone, Debug, Default)]
pub struct LogOnce {
    rig: String,
    seen: HashSet<String>,
}

impl LogOnce {
    pub fn new(rig: impl Into<String>) -> Self {
        Self {
            rig: rig.into(),
            seen: HashSet::new(),
        }
    }

    pub fn rig(&self) -> &str {
        &self.rig
    }

    /// True the first time `category` is seen.
    pub fn first(&mut self, category: &str) -> bool {
        if self.seen.contains(category) {
            return false;
        }
        self.seen.insert(category.to_string());
        true
    }

    /// Warn about `missing` names under `category`, once per rig.
    pub fn warn_missing<S: AsRef<str>>(&mut self, category: &str, what: &str, missing: &[S]) {
        if missing.is_empty() || !self.first(category) {
            return;
        }
        let names: Vec<&str> = missing.iter().map(AsRef::as_ref).collect();
        log::warn!(
            "{} {} missing on '{}': {:?}",
            names.len(),
            what,
            self.rig,
            names
        );
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_fires_once_until_reset() {
        let mut once = LogOnce::new("ada");
        assert!(once.first("head_missing_raw_controls"));
        assert!(!once.first("head_missing_raw_controls"));
        assert!(once.first("head_missing_gui_controls"));
        once.reset();
        assert!(once.first("head_missing_raw_controls"));
    }

    #[test]
    fn empty_missing_list_does_not_latch() {
        let mut once = LogOnce::new("ada");
        once.warn_missing::<&str>("bones", "bones", &[]);
        assert!(once.first("bones"));
    }
}
