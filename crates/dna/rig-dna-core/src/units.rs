//! Unit and axis metadata stored in the DNA descriptor.

use serde::{Deserialize, Serialize};

/// Scene units per DNA centimeter.
pub const SCALE_FACTOR: f64 = 100.0;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationUnit {
    #[default]
    Cm,
    M,
}

impl TranslationUnit {
    /// Multiplier converting DNA translations into scene units.
    pub fn linear_modifier(self) -> f64 {
        match self {
            TranslationUnit::Cm => 1.0 / SCALE_FACTOR,
            TranslationUnit::M => 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationUnit {
    #[default]
    Degrees,
    Radians,
}

impl RotationUnit {
    pub fn angle_modifier(self) -> f64 {
        match self {
            RotationUnit::Degrees => 180.0 / std::f64::consts::PI,
            RotationUnit::Radians => std::f64::consts::PI / 180.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    Front,
    Back,
}

/// Axis directions of the asset. DNA files are authored Y-up.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub x_axis: Direction,
    pub y_axis: Direction,
    pub z_axis: Direction,
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self {
            x_axis: Direction::Right,
            y_axis: Direction::Up,
            z_axis: Direction::Front,
        }
    }
}

impl CoordinateSystem {
    pub fn is_y_up(&self) -> bool {
        self.y_axis == Direction::Up
    }
}
