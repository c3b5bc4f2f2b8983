// src/kinematics/frames.rs - Reference-frame tree for motor-to-world chains
//
// Arena of nodes with parent indices terminating at a world root, validated
// once at construction. The matrix type is deliberately small and
// hand-rolled; rigid transforms are all this module ever composes.

use super::{CHANNEL_COUNT, Channel, Motor};
use crate::config::MotorConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("motor '{0}' has unknown parent frame '{1}'")]
    UnknownParent(String, String),
    #[error("frame chain for motor '{0}' does not terminate at world")]
    UnrootedChain(String),
}

/// Spin axis of a motor in its local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinAxis {
    X,
    Y,
    Z,
}

impl SpinAxis {
    pub fn parse(s: &str) -> Option<SpinAxis> {
        match s {
            "x" | "X" => Some(SpinAxis::X),
            "y" | "Y" => Some(SpinAxis::Y),
            "z" | "Z" => Some(SpinAxis::Z),
            _ => None,
        }
    }
}

/// Row-major homogeneous 4x4 transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [[f64; 4]; 4]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn translation(x: f64, y: f64, z: f64) -> Mat4 {
        let mut m = Mat4::IDENTITY;
        m.0[0][3] = x;
        m.0[1][3] = y;
        m.0[2][3] = z;
        m
    }

    /// Rotation of `degrees` about one of the local axes.
    pub fn rotation(axis: SpinAxis, degrees: f64) -> Mat4 {
        let r = degrees.to_radians();
        let (s, c) = r.sin_cos();
        let mut m = Mat4::IDENTITY;
        match axis {
            SpinAxis::X => {
                m.0[1][1] = c;
                m.0[1][2] = -s;
                m.0[2][1] = s;
                m.0[2][2] = c;
            }
            SpinAxis::Y => {
                m.0[0][0] = c;
                m.0[0][2] = s;
                m.0[2][0] = -s;
                m.0[2][2] = c;
            }
            SpinAxis::Z => {
                m.0[0][0] = c;
                m.0[0][1] = -s;
                m.0[1][0] = s;
                m.0[1][1] = c;
            }
        }
        m
    }

    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [[0.0; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Mat4(out)
    }

    /// Inverse of a rigid transform (orthonormal rotation + translation):
    /// transpose the rotation block and counter-rotate the translation.
    pub fn inverse_rigid(&self) -> Mat4 {
        let mut out = Mat4::IDENTITY;
        for i in 0..3 {
            for j in 0..3 {
                out.0[i][j] = self.0[j][i];
            }
        }
        for i in 0..3 {
            out.0[i][3] = -(0..3).map(|k| out.0[i][k] * self.0[k][3]).sum::<f64>();
        }
        out
    }

    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.0[i][3] + (0..3).map(|k| self.0[i][k] * p[k]).sum::<f64>();
        }
        out
    }

    pub fn translation_part(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }
}

#[derive(Debug, Clone)]
struct FrameNode {
    /// Index of the parent motor, `None` for children of the world frame.
    parent: Option<usize>,
    /// Static (rotation-independent) offset of this motor's frame relative
    /// to its parent or to world.
    offset: Mat4,
    axis: SpinAxis,
}

/// Parent-index arena describing how every motor frame composes into world.
#[derive(Debug, Clone)]
pub struct FrameTree {
    nodes: Vec<FrameNode>,
}

impl FrameTree {
    /// Builds and validates the tree: every parent reference must resolve
    /// and every chain must reach world in at most `CHANNEL_COUNT` hops.
    pub fn from_config(motors: &[MotorConfig]) -> Result<Self, FrameError> {
        let mut nodes = Vec::with_capacity(motors.len());
        for cfg in motors {
            let parent = if cfg.parent == "world" {
                None
            } else {
                let index = motors.iter().position(|m| m.name == cfg.parent).ok_or_else(
                    || FrameError::UnknownParent(cfg.name.clone(), cfg.parent.clone()),
                )?;
                Some(index)
            };
            let axis = SpinAxis::parse(&cfg.spin_axis).unwrap_or(SpinAxis::Z);
            nodes.push(FrameNode {
                parent,
                offset: Mat4::translation(cfg.offset[0], cfg.offset[1], cfg.offset[2]),
                axis,
            });
        }
        let tree = Self { nodes };
        for (i, cfg) in motors.iter().enumerate() {
            let mut cursor = Some(i);
            let mut hops = 0;
            while let Some(n) = cursor {
                cursor = tree.nodes[n].parent;
                hops += 1;
                if hops > CHANNEL_COUNT {
                    return Err(FrameError::UnrootedChain(cfg.name.clone()));
                }
            }
        }
        Ok(tree)
    }

    /// Composes `offset ∘ rotation(angle)` outward from the motor to world.
    pub fn motor_to_world(&self, channel: Channel, motors: &[Motor]) -> Mat4 {
        let mut index = channel.index();
        let mut acc = self.local_transform(index, motors);
        while let Some(parent) = self.nodes[index].parent {
            acc = self.local_transform(parent, motors).mul(&acc);
            index = parent;
        }
        acc
    }

    fn local_transform(&self, index: usize, motors: &[Motor]) -> Mat4 {
        let node = &self.nodes[index];
        let spin = Mat4::rotation(node.axis, motors[index].angle());
        node.offset.mul(&spin)
    }
}
