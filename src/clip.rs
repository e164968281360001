use crate::channel::{AnimationChannel, ChannelValue};
use crate::node::NodeArena;
use std::sync::Arc;

/// A named set of animation channels, one per animated node property.
#[derive(Clone, Debug)]
pub struct AnimationClip {
    name: Arc<str>,
    channels: Vec<AnimationChannel>,
}

impl AnimationClip {
    pub fn new(name: Arc<str>, channels: Vec<AnimationChannel>) -> Self {
        Self { name, channels }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> &[AnimationChannel] {
        &self.channels
    }

    /// Clip length taken from the first channel; exporters time every channel
    /// of a clip over the same span.
    pub fn end_time(&self) -> f32 {
        self.channels.first().map(|channel| channel.max_time()).unwrap_or(0.0)
    }

    /// Sample every channel whose target the mask includes and write the pose
    /// directly into the node's base and blended values. Nodes the mask
    /// excludes keep whatever pose they had.
    pub fn set_frame(&self, arena: &mut NodeArena, mask: &[bool], time: f32) {
        for channel in &self.channels {
            if !mask.get(channel.target_node as usize).copied().unwrap_or(false) {
                continue;
            }
            let Some(node) = arena.get_mut(channel.target_node) else {
                continue;
            };
            match channel.sample(time) {
                ChannelValue::Translation(value) => node.set_translation(value),
                ChannelValue::Rotation(value) => node.set_rotation(value),
                ChannelValue::Scale(value) => node.set_scale(value),
            }
        }
        // One batched recompute for the whole node list, not one per channel.
        arena.refresh_local_matrices();
    }

    /// Same traversal as `set_frame`, but the sampled pose is blended against
    /// the pose already present. Factor 0 keeps the current pose, 1 replaces
    /// it.
    pub fn blend_frame(&self, arena: &mut NodeArena, mask: &[bool], time: f32, factor: f32) {
        for channel in &self.channels {
            if !mask.get(channel.target_node as usize).copied().unwrap_or(false) {
                continue;
            }
            let Some(node) = arena.get_mut(channel.target_node) else {
                continue;
            };
            match channel.sample(time) {
                ChannelValue::Translation(value) => node.blend_translation(value, factor),
                ChannelValue::Rotation(value) => node.blend_rotation(value, factor),
                ChannelValue::Scale(value) => node.blend_scale(value, factor),
            }
        }
        arena.refresh_local_matrices();
    }
}
