use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;
use std::sync::Arc;

/// One element of the skeleton hierarchy. The base transform holds the pose a
/// clip last wrote with `set_*`; the blended copies are what the matrices are
/// actually built from, so partial blends never disturb the base pose.
#[derive(Clone, Debug)]
pub struct Node {
    pub index: u32,
    pub name: Arc<str>,
    pub parent: Option<u32>,
    pub children: SmallVec<[u32; 4]>,
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    blended_translation: Vec3,
    blended_rotation: Quat,
    blended_scale: Vec3,
    offset_translation: Vec3,
    offset_rotation: Quat,
    local_matrix: Mat4,
    global_matrix: Mat4,
    dirty: bool,
}

impl Node {
    pub fn new(index: u32, name: Arc<str>) -> Self {
        Self {
            index,
            name,
            parent: None,
            children: SmallVec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            blended_translation: Vec3::ZERO,
            blended_rotation: Quat::IDENTITY,
            blended_scale: Vec3::ONE,
            offset_translation: Vec3::ZERO,
            offset_rotation: Quat::IDENTITY,
            local_matrix: Mat4::IDENTITY,
            global_matrix: Mat4::IDENTITY,
            dirty: true,
        }
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn blended_translation(&self) -> Vec3 {
        self.blended_translation
    }

    pub fn blended_rotation(&self) -> Quat {
        self.blended_rotation
    }

    pub fn blended_scale(&self) -> Vec3 {
        self.blended_scale
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.blended_translation = translation;
        self.dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.blended_rotation = rotation;
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.blended_scale = scale;
        self.dirty = true;
    }

    pub fn blend_translation(&mut self, translation: Vec3, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        self.blended_translation = self.translation.lerp(translation, factor);
        self.dirty = true;
    }

    pub fn blend_rotation(&mut self, rotation: Quat, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        self.blended_rotation = self.rotation.slerp(rotation, factor);
        self.dirty = true;
    }

    pub fn blend_scale(&mut self, scale: Vec3, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        self.blended_scale = self.scale.lerp(scale, factor);
        self.dirty = true;
    }

    /// World placement of the whole tree; meaningful on root nodes only.
    pub fn set_world_offset(&mut self, translation: Vec3, rotation: Quat) {
        self.offset_translation = translation;
        self.offset_rotation = rotation;
        self.dirty = true;
    }

    pub fn world_offset(&self) -> (Vec3, Quat) {
        (self.offset_translation, self.offset_rotation)
    }

    pub fn calculate_local_matrix(&mut self) {
        if !self.dirty {
            return;
        }
        self.local_matrix = Mat4::from_translation(self.offset_translation)
            * Mat4::from_quat(self.offset_rotation)
            * Mat4::from_translation(self.blended_translation)
            * Mat4::from_quat(self.blended_rotation)
            * Mat4::from_scale(self.blended_scale);
        self.dirty = false;
    }

    pub fn calculate_node_matrix(&mut self, parent_global: Mat4) {
        self.calculate_local_matrix();
        self.global_matrix = parent_global * self.local_matrix;
    }

    pub fn local_matrix(&self) -> Mat4 {
        self.local_matrix
    }

    pub fn global_matrix(&self) -> Mat4 {
        self.global_matrix
    }

    pub fn global_position(&self) -> Vec3 {
        self.global_matrix.w_axis.truncate()
    }

    pub fn global_rotation(&self) -> Quat {
        let (_, rotation, _) = self.global_matrix.to_scale_rotation_translation();
        rotation
    }
}

/// The skeleton tree as an arena indexed by node id. Children are owned
/// handles; the parent link is a plain back-reference used for matrix
/// composition and chain walking only.
#[derive(Clone, Debug)]
pub struct NodeArena {
    nodes: Vec<Node>,
    roots: Vec<u32>,
}

impl NodeArena {
    pub fn new(nodes: Vec<Node>) -> Self {
        let roots =
            nodes.iter().filter(|node| node.parent.is_none()).map(|node| node.index).collect();
        Self { nodes, roots }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[u32] {
        &self.roots
    }

    pub fn get(&self, index: u32) -> Option<&Node> {
        self.nodes.get(index as usize)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Node> {
        self.nodes.get_mut(index as usize)
    }

    pub fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }

    pub fn node_mut(&mut self, index: u32) -> &mut Node {
        &mut self.nodes[index as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Recompute the local matrix of every dirty node in one pass. Global
    /// matrices are left untouched; callers propagate afterwards.
    pub fn refresh_local_matrices(&mut self) {
        for node in &mut self.nodes {
            node.calculate_local_matrix();
        }
    }

    /// Recompute this node's global matrix and every descendant's, parent
    /// before child. The only entry point that keeps a subtree consistent
    /// after a local change.
    pub fn update_node_and_children(&mut self, index: u32) {
        let mut stack: SmallVec<[u32; 16]> = SmallVec::new();
        stack.push(index);
        while let Some(current) = stack.pop() {
            let parent_global = match self.nodes[current as usize].parent {
                Some(parent) => self.nodes[parent as usize].global_matrix,
                None => Mat4::IDENTITY,
            };
            let node = &mut self.nodes[current as usize];
            node.calculate_node_matrix(parent_global);
            stack.extend(node.children.iter().copied());
        }
    }

    pub fn update_all(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            self.update_node_and_children(root);
        }
    }

    /// Nodes in the subtree rooted at `index`, including `index` itself.
    pub fn collect_subtree(&self, index: u32) -> Vec<u32> {
        let mut result = Vec::new();
        let mut stack: SmallVec<[u32; 16]> = SmallVec::new();
        stack.push(index);
        while let Some(current) = stack.pop() {
            if (current as usize) >= self.nodes.len() {
                continue;
            }
            result.push(current);
            stack.extend(self.nodes[current as usize].children.iter().copied());
        }
        result
    }
}
