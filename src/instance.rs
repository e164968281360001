use crate::ik::{IkAlgorithm, IkChain};
use crate::node::NodeArena;
use crate::rig::RigTemplate;
use crate::skinning::{SkinningMode, SkinningPalette};
use glam::{Quat, Vec3};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    /// The selected clip drives the whole skeleton.
    Single,
    /// The selected clip is blended against the current pose by the blend
    /// factor.
    Fade,
    /// The selected clip drives the skeleton, then the destination clip is
    /// blended over it by the blend factor.
    Crossfade,
    /// The skeleton is split at the split node: the destination clip drives
    /// the split subtree, the selected clip drives the rest.
    AdditiveSplit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkSettings {
    pub enabled: bool,
    pub algorithm: IkAlgorithm,
    pub target: Vec3,
    pub iterations: usize,
    pub threshold: f32,
    pub effector: u32,
    pub root: u32,
}

impl Default for IkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: IkAlgorithm::Ccd,
            target: Vec3::ZERO,
            iterations: 10,
            threshold: 0.001,
            effector: 0,
            root: 0,
        }
    }
}

/// The per-instance configuration surface a host control panel edits.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceSettings {
    pub clip: usize,
    pub dest_clip: usize,
    pub playing: bool,
    pub speed: f32,
    pub scrub: f32,
    pub blend_mode: BlendMode,
    pub blend_factor: f32,
    pub split_node: u32,
    pub skinning_mode: SkinningMode,
    pub world_translation: Vec3,
    pub world_rotation: Quat,
    pub ik: IkSettings,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            clip: 0,
            dest_clip: 0,
            playing: true,
            speed: 1.0,
            scrub: 0.0,
            blend_mode: BlendMode::Single,
            blend_factor: 1.0,
            split_node: 0,
            skinning_mode: SkinningMode::LinearBlend,
            world_translation: Vec3::ZERO,
            world_rotation: Quat::IDENTITY,
            ik: IkSettings::default(),
        }
    }
}

// Serialized mirror of the settings, with math types flattened to arrays.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IkSettingsData {
    pub enabled: bool,
    pub algorithm: IkAlgorithm,
    pub target: [f32; 3],
    pub iterations: usize,
    pub threshold: f32,
    pub effector: u32,
    pub root: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceSettingsData {
    pub clip: usize,
    pub dest_clip: usize,
    pub playing: bool,
    pub speed: f32,
    pub scrub: f32,
    pub blend_mode: BlendMode,
    pub blend_factor: f32,
    pub split_node: u32,
    pub skinning_mode: SkinningMode,
    pub world_translation: [f32; 3],
    pub world_rotation: [f32; 4],
    pub ik: IkSettingsData,
}

impl From<&InstanceSettings> for InstanceSettingsData {
    fn from(value: &InstanceSettings) -> Self {
        Self {
            clip: value.clip,
            dest_clip: value.dest_clip,
            playing: value.playing,
            speed: value.speed,
            scrub: value.scrub,
            blend_mode: value.blend_mode,
            blend_factor: value.blend_factor,
            split_node: value.split_node,
            skinning_mode: value.skinning_mode,
            world_translation: value.world_translation.to_array(),
            world_rotation: value.world_rotation.to_array(),
            ik: IkSettingsData {
                enabled: value.ik.enabled,
                algorithm: value.ik.algorithm,
                target: value.ik.target.to_array(),
                iterations: value.ik.iterations,
                threshold: value.ik.threshold,
                effector: value.ik.effector,
                root: value.ik.root,
            },
        }
    }
}

impl From<InstanceSettingsData> for InstanceSettings {
    fn from(value: InstanceSettingsData) -> Self {
        Self {
            clip: value.clip,
            dest_clip: value.dest_clip,
            playing: value.playing,
            speed: value.speed,
            scrub: value.scrub,
            blend_mode: value.blend_mode,
            blend_factor: value.blend_factor,
            split_node: value.split_node,
            skinning_mode: value.skinning_mode,
            world_translation: Vec3::from_array(value.world_translation),
            world_rotation: Quat::from_array(value.world_rotation).normalize(),
            ik: IkSettings {
                enabled: value.ik.enabled,
                algorithm: value.ik.algorithm,
                target: Vec3::from_array(value.ik.target),
                iterations: value.ik.iterations,
                threshold: value.ik.threshold,
                effector: value.ik.effector,
                root: value.ik.root,
            },
        }
    }
}

/// One vertex of the debug bone line list, ready for a line-primitive draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DebugLineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

const BONE_PARENT_COLOR: [f32; 4] = [0.1, 0.9, 0.3, 1.0];
const BONE_CHILD_COLOR: [f32; 4] = [0.9, 0.9, 0.1, 1.0];

/// One animated character: a private node arena cloned from the shared
/// template, the skinning palette it refreshes every frame, and its playback
/// and IK configuration.
pub struct ModelInstance {
    template: Arc<RigTemplate>,
    arena: NodeArena,
    palette: SkinningPalette,
    chain: Option<IkChain>,
    mask: Vec<bool>,
    mask_split_node: Option<u32>,
    pub settings: InstanceSettings,
    clip_time: f32,
}

impl ModelInstance {
    pub fn new(template: Arc<RigTemplate>) -> Self {
        let arena = template.clone_arena();
        let palette = SkinningPalette::new(template.binding().joint_count());
        let mask = vec![true; arena.len()];
        Self {
            template,
            arena,
            palette,
            chain: None,
            mask,
            mask_split_node: None,
            settings: InstanceSettings::default(),
            clip_time: 0.0,
        }
    }

    pub fn template(&self) -> &Arc<RigTemplate> {
        &self.template
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    pub fn palette(&self) -> &SkinningPalette {
        &self.palette
    }

    pub fn clip_time(&self) -> f32 {
        self.clip_time
    }

    pub fn ik_chain(&self) -> Option<&IkChain> {
        self.chain.as_ref()
    }

    /// Advance one frame. The order is fixed: world placement, animation,
    /// matrix propagation, IK, skinning. Reordering any of these reads a
    /// stale pose.
    pub fn update(&mut self, delta_seconds: f32) {
        self.apply_world_placement();
        self.apply_animation(delta_seconds);
        self.arena.update_all();
        self.apply_ik();
        self.palette.update(&self.arena, self.template.binding(), self.settings.skinning_mode);
    }

    fn apply_world_placement(&mut self) {
        let translation = self.settings.world_translation;
        let rotation = self.settings.world_rotation;
        let roots = self.arena.roots().to_vec();
        for root in roots {
            let node = self.arena.node_mut(root);
            if node.world_offset() != (translation, rotation) {
                node.set_world_offset(translation, rotation);
            }
        }
    }

    fn apply_animation(&mut self, delta_seconds: f32) {
        let clips = self.template.clips();
        let Some(clip) = clips.get(self.settings.clip) else {
            return;
        };

        let end_time = clip.end_time();
        if self.settings.playing {
            self.clip_time = wrap_clip_time(
                self.clip_time + delta_seconds * self.settings.speed,
                end_time,
            );
        } else {
            // Scrubbing clamps so the last frame stays reachable.
            self.clip_time = self.settings.scrub.clamp(0.0, end_time);
        }
        let time = self.clip_time;

        let full_mask = vec![true; self.arena.len()];
        match self.settings.blend_mode {
            BlendMode::Single => {
                clip.set_frame(&mut self.arena, &full_mask, time);
            }
            BlendMode::Fade => {
                clip.blend_frame(&mut self.arena, &full_mask, time, self.settings.blend_factor);
            }
            BlendMode::Crossfade => {
                clip.set_frame(&mut self.arena, &full_mask, time);
                if let Some(dest) = clips.get(self.settings.dest_clip) {
                    let dest_time = wrap_clip_time(time, dest.end_time());
                    dest.blend_frame(
                        &mut self.arena,
                        &full_mask,
                        dest_time,
                        self.settings.blend_factor,
                    );
                }
            }
            BlendMode::AdditiveSplit => {
                self.cross_blend_frame(
                    self.settings.clip,
                    self.settings.dest_clip,
                    time,
                    self.settings.blend_factor,
                );
            }
        }
    }

    /// Compose two clips over complementary masks split at the configured
    /// split node: the destination clip drives the split subtree, the source
    /// clip drives every other node. Each node is driven by exactly one clip.
    pub fn cross_blend_frame(&mut self, source: usize, dest: usize, time: f32, factor: f32) {
        self.refresh_split_mask();
        let clips = self.template.clips();
        let (Some(source_clip), Some(dest_clip)) = (clips.get(source), clips.get(dest)) else {
            return;
        };
        let subtree_mask = self.mask.clone();
        let complement: Vec<bool> = subtree_mask.iter().map(|included| !included).collect();

        let source_time = wrap_clip_time(time, source_clip.end_time());
        let dest_time = wrap_clip_time(time, dest_clip.end_time());
        source_clip.set_frame(&mut self.arena, &complement, source_time);
        dest_clip.blend_frame(&mut self.arena, &subtree_mask, dest_time, factor);
    }

    fn refresh_split_mask(&mut self) {
        let split = self.settings.split_node;
        if self.mask_split_node == Some(split) {
            return;
        }
        let mut mask = vec![false; self.arena.len()];
        for node in self.arena.collect_subtree(split) {
            mask[node as usize] = true;
        }
        self.mask = mask;
        self.mask_split_node = Some(split);
    }

    fn apply_ik(&mut self) {
        if !self.settings.ik.enabled {
            return;
        }
        let ik = self.settings.ik;
        let node_count = self.arena.len() as u32;
        if ik.effector >= node_count || ik.root >= node_count {
            // Reject the configuration for this frame and keep the animated
            // pose; the instance falls back to no IK.
            warn!(
                "IK node index out of range (effector {}, root {}, {} nodes); skipping IK",
                ik.effector, ik.root, node_count
            );
            self.chain = None;
            return;
        }

        let rebuild = match &self.chain {
            Some(chain) => chain.effector() != ik.effector || chain.root() != ik.root,
            None => true,
        };
        if rebuild {
            // Bone lengths come from the template's bind pose, not from the
            // currently animated arena.
            self.chain = Some(IkChain::from_effector_to_root(
                self.template.bind_arena(),
                ik.effector,
                ik.root,
                ik.iterations,
                ik.threshold,
            ));
        }
        let Some(chain) = &mut self.chain else {
            return;
        };
        chain.iterations = ik.iterations;
        chain.threshold = ik.threshold;
        chain.solve(&mut self.arena, ik.algorithm, ik.target);
    }

    /// Bone segments as (parent, child) global position pairs, for a debug
    /// line-primitive draw.
    pub fn debug_skeleton_lines(&self) -> Vec<DebugLineVertex> {
        let mut vertices = Vec::with_capacity(self.arena.len().saturating_sub(1) * 2);
        for node in self.arena.nodes() {
            let Some(parent) = node.parent else {
                continue;
            };
            let parent_position = self.arena.node(parent).global_position();
            vertices.push(DebugLineVertex {
                position: parent_position.to_array(),
                color: BONE_PARENT_COLOR,
            });
            vertices.push(DebugLineVertex {
                position: node.global_position().to_array(),
                color: BONE_CHILD_COLOR,
            });
        }
        vertices
    }

    pub fn settings_data(&self) -> InstanceSettingsData {
        InstanceSettingsData::from(&self.settings)
    }

    pub fn apply_settings_data(&mut self, data: InstanceSettingsData) {
        self.settings = InstanceSettings::from(data);
    }
}

fn wrap_clip_time(time: f32, end_time: f32) -> f32 {
    if end_time <= 0.0 {
        return 0.0;
    }
    time.rem_euclid(end_time.max(f32::EPSILON))
}
