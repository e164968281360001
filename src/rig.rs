use crate::channel::{
    AnimationChannel, ChannelInterpolation, ChannelKeys, TargetPath,
};
use crate::clip::AnimationClip;
use crate::instance::ModelInstance;
use crate::node::{Node, NodeArena};
use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Maps skeleton nodes onto the joint palette. Built once per model from the
/// skin definition; many nodes are not joints and stay unmapped.
#[derive(Clone, Debug)]
pub struct JointBinding {
    node_to_joint: Vec<Option<u16>>,
    joint_to_node: Vec<u32>,
    inverse_bind: Arc<[Mat4]>,
}

impl JointBinding {
    pub fn new(
        node_to_joint: Vec<Option<u16>>,
        joint_to_node: Vec<u32>,
        inverse_bind: Arc<[Mat4]>,
    ) -> Self {
        Self { node_to_joint, joint_to_node, inverse_bind }
    }

    pub fn joint_count(&self) -> usize {
        self.inverse_bind.len()
    }

    pub fn joint_for_node(&self, node: u32) -> Option<u16> {
        self.node_to_joint.get(node as usize).copied().flatten()
    }

    pub fn node_for_joint(&self, joint: u16) -> Option<u32> {
        self.joint_to_node.get(joint as usize).copied()
    }

    pub fn inverse_bind(&self) -> &[Mat4] {
        &self.inverse_bind
    }
}

// ---------- Raw source data ----------
//
// The asset loader hands these over pre-decoded: plain typed arrays, no
// accessor or buffer-view handling here. The same structs double as the JSON
// rig document for fixtures and tooling.

#[derive(Clone, Debug, Deserialize)]
pub struct RawRig {
    pub name: String,
    pub nodes: Vec<RawNode>,
    pub skin: RawSkin,
    #[serde(default)]
    pub clips: Vec<RawClip>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<u32>,
    #[serde(default)]
    pub translation: Option<[f32; 3]>,
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawSkin {
    pub joints: Vec<u32>,
    #[serde(default)]
    pub inverse_bind_matrices: Option<Vec<[f32; 16]>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawClip {
    #[serde(default)]
    pub name: Option<String>,
    pub channels: Vec<RawChannel>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawChannel {
    pub target_node: u32,
    pub target_path: String,
    pub interpolation: String,
    pub timings: Vec<f32>,
    pub values: Vec<f32>,
}

/// Immutable per-model data shared by every instance: the bind-pose node
/// arena, the clips and the joint binding. Instances clone the arena and
/// never write back.
#[derive(Clone, Debug)]
pub struct RigTemplate {
    name: Arc<str>,
    arena: NodeArena,
    clips: Arc<[AnimationClip]>,
    binding: Arc<JointBinding>,
}

impl RigTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind_arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn clone_arena(&self) -> NodeArena {
        self.arena.clone()
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    pub fn clip_index(&self, name: &str) -> Option<usize> {
        self.clips.iter().position(|clip| clip.name() == name)
    }

    pub fn binding(&self) -> &Arc<JointBinding> {
        &self.binding
    }
}

pub fn build_rig_template(raw: RawRig) -> Result<RigTemplate> {
    let name: Arc<str> = Arc::from(raw.name);
    let mut arena = build_arena(&raw.nodes)
        .with_context(|| format!("Failed to build node hierarchy for rig '{name}'"))?;
    // Cache the bind pose once; instances start from these globals.
    arena.update_all();

    let binding = build_binding(&raw.skin, arena.len())
        .with_context(|| format!("Failed to build joint binding for rig '{name}'"))?;

    let mut clips = Vec::with_capacity(raw.clips.len());
    for (clip_index, raw_clip) in raw.clips.into_iter().enumerate() {
        let clip_name: Arc<str> = raw_clip
            .name
            .map(Arc::<str>::from)
            .unwrap_or_else(|| Arc::<str>::from(format!("animation_{clip_index}")));
        let mut channels = Vec::with_capacity(raw_clip.channels.len());
        for raw_channel in raw_clip.channels {
            let channel = build_channel(&raw_channel, arena.len())
                .with_context(|| format!("Clip '{clip_name}' has an invalid channel"))?;
            channels.push(channel);
        }
        clips.push(AnimationClip::new(clip_name, channels));
    }

    Ok(RigTemplate {
        name,
        arena,
        clips: Arc::from(clips.into_boxed_slice()),
        binding: Arc::new(binding),
    })
}

fn build_arena(raw_nodes: &[RawNode]) -> Result<NodeArena> {
    if raw_nodes.is_empty() {
        bail!("Rig must contain at least one node");
    }
    let count = raw_nodes.len();
    let mut parents: Vec<Option<u32>> = vec![None; count];
    for (index, raw) in raw_nodes.iter().enumerate() {
        for &child in &raw.children {
            if child as usize >= count {
                bail!("Node {index} lists child {child} outside the node list");
            }
            if child as usize == index {
                bail!("Node {index} lists itself as a child");
            }
            if parents[child as usize].is_some() {
                bail!("Node {child} has more than one parent");
            }
            parents[child as usize] = Some(index as u32);
        }
    }

    let mut nodes = Vec::with_capacity(count);
    for (index, raw) in raw_nodes.iter().enumerate() {
        let node_name: Arc<str> = raw
            .name
            .clone()
            .map(Arc::<str>::from)
            .unwrap_or_else(|| Arc::<str>::from(format!("node_{index}")));
        let mut node = Node::new(index as u32, node_name);
        node.parent = parents[index];
        // Child order follows the definition order of the source hierarchy.
        node.children.extend(raw.children.iter().copied());
        // Missing transform components default to identity.
        node.set_translation(raw.translation.map(Vec3::from_array).unwrap_or(Vec3::ZERO));
        let rotation = raw
            .rotation
            .map(|value| Quat::from_xyzw(value[0], value[1], value[2], value[3]))
            .unwrap_or(Quat::IDENTITY);
        if !rotation.is_finite() || rotation.length_squared() <= 0.0 {
            bail!("Node {index} has a degenerate rest rotation");
        }
        node.set_rotation(rotation.normalize());
        node.set_scale(raw.scale.map(Vec3::from_array).unwrap_or(Vec3::ONE));
        nodes.push(node);
    }

    // Every node must be reachable from a root; a child list that loops back
    // on an ancestor would otherwise hang every tree walk.
    let mut reachable = vec![false; count];
    let mut stack: Vec<usize> =
        (0..count).filter(|&index| parents[index].is_none()).collect();
    if stack.is_empty() {
        bail!("Rig hierarchy has no root node");
    }
    while let Some(index) = stack.pop() {
        if reachable[index] {
            continue;
        }
        reachable[index] = true;
        stack.extend(raw_nodes[index].children.iter().map(|&child| child as usize));
    }
    if let Some(orphan) = reachable.iter().position(|&seen| !seen) {
        bail!("Node {orphan} is not reachable from any root");
    }

    Ok(NodeArena::new(nodes))
}

fn build_binding(skin: &RawSkin, node_count: usize) -> Result<JointBinding> {
    if skin.joints.is_empty() {
        bail!("Skin has no joints");
    }
    let inverse_bind_raw = skin
        .inverse_bind_matrices
        .as_ref()
        .ok_or_else(|| anyhow!("Skin is missing its inverse bind matrices"))?;
    if inverse_bind_raw.len() != skin.joints.len() {
        bail!(
            "Skin joint count ({}) does not match its inverse bind matrices ({})",
            skin.joints.len(),
            inverse_bind_raw.len()
        );
    }
    if skin.joints.len() > u16::MAX as usize {
        bail!("Skin exceeds the joint palette limit");
    }

    let mut node_to_joint: Vec<Option<u16>> = vec![None; node_count];
    for (joint, &node) in skin.joints.iter().enumerate() {
        let slot = node_to_joint
            .get_mut(node as usize)
            .ok_or_else(|| anyhow!("Skin joint {joint} targets node {node} outside the rig"))?;
        if slot.is_some() {
            bail!("Skin binds node {node} to more than one joint");
        }
        *slot = Some(joint as u16);
    }

    let inverse_bind: Vec<Mat4> =
        inverse_bind_raw.iter().map(|values| Mat4::from_cols_array(values)).collect();

    Ok(JointBinding::new(
        node_to_joint,
        skin.joints.clone(),
        Arc::from(inverse_bind.into_boxed_slice()),
    ))
}

fn build_channel(raw: &RawChannel, node_count: usize) -> Result<AnimationChannel> {
    if raw.target_node as usize >= node_count {
        bail!("Channel targets node {} outside the rig", raw.target_node);
    }
    let target_path = match raw.target_path.as_str() {
        "translation" => TargetPath::Translation,
        "rotation" => TargetPath::Rotation,
        "scale" => TargetPath::Scale,
        other => bail!("Channel target path '{other}' is not animatable"),
    };
    let interpolation = ChannelInterpolation::from_sampler_str(&raw.interpolation);
    for &timing in &raw.timings {
        if !timing.is_finite() {
            bail!("Channel timings contain a non-finite value (node {})", raw.target_node);
        }
    }
    let component_count = match target_path {
        TargetPath::Rotation => 4,
        _ => 3,
    };
    if raw.values.len() % component_count != 0 {
        bail!(
            "Channel value array length {} is not a multiple of {component_count} (node {})",
            raw.values.len(),
            raw.target_node
        );
    }
    let keys = match target_path {
        TargetPath::Rotation => ChannelKeys::QuatKeys(
            raw.values
                .chunks_exact(4)
                .map(|chunk| Quat::from_xyzw(chunk[0], chunk[1], chunk[2], chunk[3]))
                .collect::<Vec<_>>()
                .into(),
        ),
        _ => ChannelKeys::Vec3Keys(
            raw.values
                .chunks_exact(3)
                .map(|chunk| Vec3::new(chunk[0], chunk[1], chunk[2]))
                .collect::<Vec<_>>()
                .into(),
        ),
    };
    AnimationChannel::new(
        raw.target_node,
        target_path,
        interpolation,
        Arc::from(raw.timings.clone().into_boxed_slice()),
        keys,
    )
}

pub fn parse_rig_bytes(bytes: &[u8]) -> Result<RawRig> {
    serde_json::from_slice(bytes).context("Failed to parse rig document")
}

pub fn load_rig_from_json(path: impl AsRef<Path>) -> Result<RigTemplate> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read rig document {}", path.display()))?;
    let raw = parse_rig_bytes(&bytes)
        .with_context(|| format!("Invalid rig document {}", path.display()))?;
    build_rig_template(raw)
}

/// Keyed store of shared rig templates. Hosts keep one library per scene and
/// hand out `Arc` handles; instances never copy template data.
#[derive(Default)]
pub struct RigLibrary {
    rigs: HashMap<String, Arc<RigTemplate>>,
}

impl RigLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, template: RigTemplate) -> Arc<RigTemplate> {
        let template = Arc::new(template);
        self.rigs.insert(key.into(), Arc::clone(&template));
        template
    }

    pub fn retain_from_file(&mut self, key: &str, path: impl AsRef<Path>) -> Result<Arc<RigTemplate>> {
        let template = load_rig_from_json(path)?;
        Ok(self.insert(key, template))
    }

    pub fn rig(&self, key: &str) -> Option<Arc<RigTemplate>> {
        self.rigs.get(key).cloned()
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.rigs.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rigs.keys().map(String::as_str)
    }

    pub fn instantiate(&self, key: &str) -> Option<ModelInstance> {
        self.rig(key).map(ModelInstance::new)
    }
}
