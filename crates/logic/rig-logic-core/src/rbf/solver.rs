//! Pose weights from driver orientation.
//!
//! Distances are measured in degrees and fed to the kernel as
//! `x = distance / radius`.

use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use rig_dna::{RbfDistanceMethod, RbfFunctionType, RbfNormalizeMethod, RbfSolverMode, TwistAxis};

use super::model::RbfSolver;
use super::swing_twist::swing_twist;
use crate::math::rotation_difference;

pub fn axis_vector(axis: TwistAxis) -> Vector3<f64> {
    Vector3::from(axis.unit())
}

/// Angular distance in degrees between the live driver `q` and a pose orientation `p`.
pub fn distance(
    method: RbfDistanceMethod,
    axis: TwistAxis,
    q: &UnitQuaternion<f64>,
    p: &UnitQuaternion<f64>,
) -> f64 {
    let radians = match method {
        RbfDistanceMethod::Quaternion => rotation_difference(q, p),
        RbfDistanceMethod::SwingAngle => {
            let a = axis_vector(axis);
            let cos = (q * a).dot(&(p * a)).clamp(-1.0, 1.0);
            cos.acos()
        }
        RbfDistanceMethod::TwistAngle => {
            let relative = p.inverse() * q;
            let (_, twist) = swing_twist(&relative, &axis_vector(axis));
            rotation_difference(&twist, &UnitQuaternion::identity())
        }
    };
    radians.to_degrees()
}

/// Activation for a normalized distance `x = d / radius`.
pub fn kernel(function: RbfFunctionType, x: f64) -> f64 {
    let x = x.abs();
    match function {
        RbfFunctionType::Gaussian => (-x * x).exp(),
        RbfFunctionType::Exponential => (-x).exp(),
        RbfFunctionType::Linear => (1.0 - x).max(0.0),
        RbfFunctionType::Cubic => {
            if x < 1.0 {
                1.0 - (3.0 * x.powi(2) - 2.0 * x.powi(3))
            } else {
                0.0
            }
        }
        RbfFunctionType::Quintic => {
            if x < 1.0 {
                1.0 - (10.0 * x.powi(3) - 15.0 * x.powi(4) + 6.0 * x.powi(5))
            } else {
                0.0
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadiusStats {
    pub min: f64,
    pub max: f64,
    pub computed: f64,
}

/// Mean distance from the default pose (or the first pose) to every other pose.
pub fn automatic_radius(solver: &RbfSolver) -> RadiusStats {
    let origin = solver
        .poses
        .iter()
        .position(|p| p.is_default())
        .unwrap_or(0);
    let Some(origin_pose) = solver.poses.get(origin) else {
        return RadiusStats {
            min: solver.radius,
            max: solver.radius,
            computed: solver.radius,
        };
    };
    let q0 = origin_pose.driver_rotation();
    let distances: Vec<f64> = solver
        .poses
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != origin)
        .map(|(_, pose)| {
            distance(
                solver.distance_method,
                solver.twist_axis,
                &q0,
                &pose.driver_rotation(),
            )
        })
        .collect();
    if distances.is_empty() {
        return RadiusStats {
            min: solver.radius,
            max: solver.radius,
            computed: solver.radius,
        };
    }
    let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let max = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let computed = distances.iter().sum::<f64>() / distances.len() as f64;
    RadiusStats { min, max, computed }
}

pub fn effective_radius(solver: &RbfSolver) -> f64 {
    let radius = if solver.automatic_radius {
        automatic_radius(solver).computed
    } else {
        solver.radius
    };
    if radius > f64::EPSILON {
        radius
    } else {
        f64::EPSILON
    }
}

fn interpolative_weights(solver: &RbfSolver, radius: f64, activations: &DVector<f64>) -> Option<DVector<f64>> {
    let n = solver.poses.len();
    let rotations: Vec<UnitQuaternion<f64>> =
        solver.poses.iter().map(|p| p.driver_rotation()).collect();
    let kernel_matrix = DMatrix::from_fn(n, n, |i, j| {
        let d = distance(
            solver.distance_method,
            solver.twist_axis,
            &rotations[i],
            &rotations[j],
        );
        kernel(solver.function_type, d / radius)
    });
    let solved = kernel_matrix.lu().solve(activations)?;
    solved.iter().all(|w| w.is_finite()).then_some(solved)
}

/// Per-pose weights for the live driver orientation, in pose order.
pub fn pose_weights(solver: &RbfSolver, driver: &UnitQuaternion<f64>) -> Vec<f64> {
    if solver.poses.is_empty() {
        return Vec::new();
    }
    let radius = effective_radius(solver);
    let activations = DVector::from_iterator(
        solver.poses.len(),
        solver.poses.iter().map(|pose| {
            let d = distance(
                solver.distance_method,
                solver.twist_axis,
                driver,
                &pose.driver_rotation(),
            );
            kernel(solver.function_type, d / radius)
        }),
    );

    let raw = match solver.mode {
        RbfSolverMode::Additive => activations,
        RbfSolverMode::Interpolative => match interpolative_weights(solver, radius, &activations) {
            Some(weights) => weights,
            None => {
                log::warn!(
                    "RBF solver '{}' has a singular pose matrix; falling back to additive weights",
                    solver.name
                );
                activations
            }
        },
    };

    let mut weights: Vec<f64> = raw
        .iter()
        .zip(&solver.poses)
        .map(|(&w, pose)| {
            if !pose.target_enable || w < solver.weight_threshold {
                0.0
            } else {
                w
            }
        })
        .collect();

    let sum: f64 = weights.iter().sum();
    let normalize = match solver.normalize_method {
        RbfNormalizeMethod::AlwaysNormalize => sum > 0.0,
        RbfNormalizeMethod::OnlyNormalizeAboveOne => sum > 1.0,
    };
    if normalize {
        for w in &mut weights {
            *w /= sum;
        }
    }
    weights
}

/// Blended delta of one driven bone.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendedDriven {
    pub bone_name: String,
    pub joint_index: i32,
    /// Scene units.
    pub location: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
}

/// Weighted sum of every pose's driven deltas, one entry per driven bone in
/// first-seen order.
pub fn blend_driven(solver: &RbfSolver, weights: &[f64]) -> Vec<BlendedDriven> {
    struct Accumulator {
        bone_name: String,
        joint_index: i32,
        location: Vector3<f64>,
        rotation: Vector4<f64>,
        weight: f64,
        scale: Vector3<f64>,
    }

    let mut acc: Vec<Accumulator> = Vec::new();
    for (pose, &weight) in solver.poses.iter().zip(weights) {
        for driven in &pose.driven {
            let slot = match acc.iter().position(|a| a.bone_name == driven.bone_name) {
                Some(i) => i,
                None => {
                    acc.push(Accumulator {
                        bone_name: driven.bone_name.clone(),
                        joint_index: driven.joint_index,
                        location: Vector3::zeros(),
                        rotation: Vector4::zeros(),
                        weight: 0.0,
                        scale: Vector3::zeros(),
                    });
                    acc.len() - 1
                }
            };
            if weight == 0.0 {
                continue;
            }
            let a = &mut acc[slot];
            a.location += driven.location * weight;
            let mut coords = crate::math::euler_to_quaternion(&driven.euler_rotation).coords;
            if coords.w < 0.0 {
                coords = -coords;
            }
            a.rotation += coords * weight;
            a.weight += weight;
            let scale = driven
                .scale
                .map(|s| if (s - pose.scale_factor).abs() < 1e-9 { 0.0 } else { s });
            a.scale += scale * weight;
        }
    }

    acc.into_iter()
        .map(|a| {
            // Remaining weight stays at the rest orientation.
            let identity = Vector4::new(0.0, 0.0, 0.0, 1.0);
            let coords = a.rotation + identity * (1.0 - a.weight).max(0.0);
            let rotation = if coords.norm() > f64::EPSILON {
                UnitQuaternion::from_quaternion(Quaternion::from(coords))
            } else {
                UnitQuaternion::identity()
            };
            BlendedDriven {
                bone_name: a.bone_name,
                joint_index: a.joint_index,
                location: a.location,
                rotation,
                scale: a.scale,
            }
        })
        .collect()
}
