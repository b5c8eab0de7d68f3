//! Opaque handles and component selectors.

use serde::{Deserialize, Serialize};

/// Generation-checked handle to a slot in [`crate::RigInstanceRegistry`].
///
/// A handle outlives its instance safely: once the slot is reused the
/// generation no longer matches and lookups fail with `StaleHandle`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RigHandle {
    pub index: u32,
    pub generation: u32,
}

/// Which half of a rig an evaluation targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Head,
    Body,
    All,
}

impl Component {
    pub fn includes_head(self) -> bool {
        matches!(self, Component::Head | Component::All)
    }

    pub fn includes_body(self) -> bool {
        matches!(self, Component::Body | Component::All)
    }

    /// Smallest selector covering both.
    pub fn merge(self, other: Component) -> Component {
        if self == other {
            self
        } else {
            Component::All
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merging_distinct_components_covers_all() {
        assert_eq!(Component::Head.merge(Component::Head), Component::Head);
        assert_eq!(Component::Head.merge(Component::Body), Component::All);
        assert_eq!(Component::Body.merge(Component::All), Component::All);
        assert!(Component::All.includes_head() && Component::All.includes_body());
        assert!(!Component::Body.includes_head());
    }

    #[test]
    fn handles_serialize_as_plain_records() {
        let handle = RigHandle {
            index: 2,
            generation: 5,
        };
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, r#"{"index":2,"generation":5}"#);
        assert_eq!(serde_json::to_string(&Component::All).unwrap(), r#""all""#);
    }
}
