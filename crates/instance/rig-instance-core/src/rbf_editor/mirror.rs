//! Left/right name mirroring.
//!
//! A pattern must capture the side token in a group named `side`; only that
//! span is replaced.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOLVER_PATTERN: &str = r"(?P<side>_l_|_r_|_l|_r)_UERBFSolver$";
pub const DEFAULT_BONE_PATTERN: &str = r"^.+?(?P<side>_l_|_r_|_l$|_r$)";

static DEFAULT_SOLVER_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(DEFAULT_SOLVER_PATTERN).ok());
static DEFAULT_BONE_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(DEFAULT_BONE_PATTERN).ok());

fn compile(pattern: &str) -> Option<Regex> {
    let cached = match pattern {
        DEFAULT_SOLVER_PATTERN => DEFAULT_SOLVER_REGEX.as_ref(),
        DEFAULT_BONE_PATTERN => DEFAULT_BONE_REGEX.as_ref(),
        _ => None,
    };
    if let Some(regex) = cached {
        return Some(regex.clone());
    }
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(err) => {
            log::warn!("Invalid regex pattern '{pattern}': {err}");
            None
        }
    }
}

/// Mirror patterns for solver, bone and pose names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorPatterns {
    pub solver: String,
    pub bone: String,
    pub pose: String,
}

impl Default for MirrorPatterns {
    fn default() -> Self {
        Self {
            solver: DEFAULT_SOLVER_PATTERN.to_string(),
            bone: DEFAULT_BONE_PATTERN.to_string(),
            pose: DEFAULT_BONE_PATTERN.to_string(),
        }
    }
}

/// Opposite side token, keeping its shape (`_l_` to `_r_`, `_l` to `_r`).
pub fn side_replacement(side: &str) -> String {
    if side.contains("_l_") {
        side.replace("_l_", "_r_")
    } else if side.contains("_r_") {
        side.replace("_r_", "_l_")
    } else if let Some(stem) = side.strip_suffix("_l") {
        format!("{stem}_r")
    } else if let Some(stem) = side.strip_suffix("_r") {
        format!("{stem}_l")
    } else {
        side.to_string()
    }
}

/// Mirrored `name`, or `None` when the pattern does not match, has no
/// `side` group, or is not a valid regex.
pub fn mirrored_name(name: &str, pattern: &str) -> Option<String> {
    let regex = compile(pattern)?;
    let side = regex.captures(name)?.name("side")?;
    let replacement = side_replacement(side.as_str());
    if replacement == side.as_str() {
        return None;
    }
    let mut mirrored = String::with_capacity(name.len());
    mirrored.push_str(&name[..side.start()]);
    mirrored.push_str(&replacement);
    mirrored.push_str(&name[side.end()..]);
    Some(mirrored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_tokens_swap_in_place() {
        assert_eq!(side_replacement("_l_"), "_r_");
        assert_eq!(side_replacement("_r"), "_l");
        assert_eq!(side_replacement("_c"), "_c");
    }

    #[test]
    fn default_patterns_mirror_solver_and_bone_names() {
        let patterns = MirrorPatterns::default();
        assert_eq!(
            mirrored_name("upperarm_l_UERBFSolver", &patterns.solver).as_deref(),
            Some("upperarm_r_UERBFSolver")
        );
        assert_eq!(
            mirrored_name("upperarm_twist_01_l", &patterns.bone).as_deref(),
            Some("upperarm_twist_01_r")
        );
        assert_eq!(
            mirrored_name("calf_l_knee", &patterns.bone).as_deref(),
            Some("calf_r_knee")
        );
        assert_eq!(mirrored_name("spine_01", &patterns.bone), None);
    }

    #[test]
    fn only_the_captured_span_is_replaced() {
        assert_eq!(
            mirrored_name("hand_l_to_hand_l", r"(?P<side>_l)$").as_deref(),
            Some("hand_l_to_hand_r")
        );
    }

    #[test]
    fn patterns_without_side_group_or_invalid_do_not_mirror() {
        assert_eq!(mirrored_name("arm_l", r"_l$"), None);
        assert_eq!(mirrored_name("arm_l", r"(?P<side>_l"), None);
    }
}
