use crate::node::NodeArena;
use crate::rig::JointBinding;
use glam::{Mat4, Quat};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkinningMode {
    LinearBlend,
    DualQuaternion,
}

impl Default for SkinningMode {
    fn default() -> Self {
        SkinningMode::LinearBlend
    }
}

/// One joint transform as a dual quaternion: real part is the rotation, dual
/// part encodes the translation. Laid out for direct upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct JointDualQuat {
    pub real: [f32; 4],
    pub dual: [f32; 4],
}

impl JointDualQuat {
    pub const IDENTITY: Self =
        Self { real: [0.0, 0.0, 0.0, 1.0], dual: [0.0, 0.0, 0.0, 0.0] };
}

/// A joint matrix flattened row-major for upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct JointMatrix(pub [[f32; 4]; 4]);

/// Per-frame skinning data, one entry per joint, ordered by joint index.
/// Whichever representation the active mode selects is the authoritative one
/// for the frame.
#[derive(Clone, Debug)]
pub struct SkinningPalette {
    joint_matrices: Vec<Mat4>,
    joint_dual_quats: Vec<JointDualQuat>,
}

impl SkinningPalette {
    pub fn new(joint_count: usize) -> Self {
        Self {
            joint_matrices: vec![Mat4::IDENTITY; joint_count],
            joint_dual_quats: vec![JointDualQuat::IDENTITY; joint_count],
        }
    }

    pub fn joint_count(&self) -> usize {
        self.joint_matrices.len()
    }

    pub fn joint_matrices(&self) -> &[Mat4] {
        &self.joint_matrices
    }

    pub fn joint_dual_quats(&self) -> &[JointDualQuat] {
        &self.joint_dual_quats
    }

    pub fn joint_matrix_data(&self) -> Vec<JointMatrix> {
        self.joint_matrices
            .iter()
            .map(|matrix| JointMatrix(matrix.transpose().to_cols_array_2d()))
            .collect()
    }

    /// Refresh the palette from the final node globals. Every joint matrix is
    /// global * inverse bind; in dual-quaternion mode each matrix is also
    /// decomposed into a rotation/translation pair.
    pub fn update(&mut self, arena: &NodeArena, binding: &JointBinding, mode: SkinningMode) {
        let inverse_bind = binding.inverse_bind();
        for joint in 0..self.joint_matrices.len() {
            let Some(node) = binding.node_for_joint(joint as u16) else {
                continue;
            };
            let Some(node) = arena.get(node) else {
                continue;
            };
            let joint_matrix = node.global_matrix() * inverse_bind[joint];
            self.joint_matrices[joint] = joint_matrix;

            if mode == SkinningMode::DualQuaternion {
                match dual_quat_from_matrix(&joint_matrix) {
                    Some(dual_quat) => self.joint_dual_quats[joint] = dual_quat,
                    None => {
                        // Keep last frame's value for this joint; a stale
                        // transform beats a NaN palette entry mid-frame.
                        warn!(
                            "joint {joint} has a degenerate matrix, keeping previous dual quaternion"
                        );
                    }
                }
            }
        }
    }
}

fn dual_quat_from_matrix(matrix: &Mat4) -> Option<JointDualQuat> {
    if !matrix.is_finite() || matrix.determinant().abs() <= f32::EPSILON {
        return None;
    }
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    if !scale.is_finite() || !rotation.is_finite() || !translation.is_finite() {
        return None;
    }
    let rotation = rotation.normalize();
    let translation_quat =
        Quat::from_xyzw(translation.x, translation.y, translation.z, 0.0);
    let dual = (translation_quat * rotation) * 0.5;
    Some(JointDualQuat { real: rotation.to_array(), dual: dual.to_array() })
}
