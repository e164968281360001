use crate::node::NodeArena;
use glam::{Quat, Vec3};
use log::warn;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IkAlgorithm {
    Ccd,
    Fabrik,
}

const MIN_DIRECTION_LENGTH_SQ: f32 = 1e-10;

/// An ordered joint chain for IK: index 0 is the effector, the last index is
/// the chain root. Bone lengths are fixed at construction from the pose the
/// arena held at that moment, normally the bind pose.
#[derive(Clone, Debug)]
pub struct IkChain {
    nodes: Vec<u32>,
    bone_lengths: Vec<f32>,
    pub iterations: usize,
    pub threshold: f32,
}

impl IkChain {
    /// Walk parent links from the effector until `root` is reached. A walk
    /// that runs out of parents first leaves a shorter chain ending where the
    /// walk stopped; the chain is still solvable, it just cannot reach the
    /// intended root.
    pub fn from_effector_to_root(
        arena: &NodeArena,
        effector: u32,
        root: u32,
        iterations: usize,
        threshold: f32,
    ) -> Self {
        let mut nodes = vec![effector];
        let mut current = effector;
        while current != root {
            match arena.node(current).parent {
                Some(parent) => {
                    nodes.push(parent);
                    current = parent;
                }
                None => {
                    warn!(
                        "IK root {root} is not an ancestor of effector {effector}; chain stops at node {current}"
                    );
                    break;
                }
            }
        }

        let bone_lengths = nodes
            .windows(2)
            .map(|pair| {
                arena
                    .node(pair[0])
                    .global_position()
                    .distance(arena.node(pair[1]).global_position())
            })
            .collect();

        Self { nodes, bone_lengths, iterations, threshold }
    }

    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }

    pub fn bone_lengths(&self) -> &[f32] {
        &self.bone_lengths
    }

    pub fn effector(&self) -> u32 {
        self.nodes[0]
    }

    pub fn root(&self) -> u32 {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn max_reach(&self) -> f32 {
        self.bone_lengths.iter().sum()
    }

    pub fn solve(&self, arena: &mut NodeArena, algorithm: IkAlgorithm, target: Vec3) -> bool {
        match algorithm {
            IkAlgorithm::Ccd => self.solve_ccd(arena, target),
            IkAlgorithm::Fabrik => self.solve_fabrik(arena, target),
        }
    }

    /// Cyclic coordinate descent: rotate one joint at a time, nearest the
    /// effector first, so the effector swings toward the target. The effector
    /// itself is never rotated.
    pub fn solve_ccd(&self, arena: &mut NodeArena, target: Vec3) -> bool {
        if self.nodes.len() < 2 {
            return false;
        }
        let effector = self.effector();
        for _ in 0..self.iterations {
            for chain_index in 1..self.nodes.len() {
                let joint = self.nodes[chain_index];
                let joint_position = arena.node(joint).global_position();
                let joint_rotation = arena.node(joint).global_rotation();
                let effector_position = arena.node(effector).global_position();

                let to_effector = effector_position - joint_position;
                let to_target = target - joint_position;
                if to_effector.length_squared() < MIN_DIRECTION_LENGTH_SQ
                    || to_target.length_squared() < MIN_DIRECTION_LENGTH_SQ
                {
                    continue;
                }
                let effector_to_target =
                    Quat::from_rotation_arc(to_effector.normalize(), to_target.normalize());

                apply_world_rotation(arena, joint, joint_rotation, effector_to_target);

                // Distance is re-checked after every joint, not once per round.
                if arena.node(effector).global_position().distance(target) < self.threshold {
                    return true;
                }
            }
        }
        false
    }

    /// FABRIK: iterate on a scratch copy of the joint positions, re-seating
    /// each position at its fixed bone length in alternating forward and
    /// backward passes, then convert the solved positions into joint
    /// rotations in a single adjustment pass.
    pub fn solve_fabrik(&self, arena: &mut NodeArena, target: Vec3) -> bool {
        if self.nodes.len() < 2 {
            return false;
        }
        let mut positions: SmallVec<[Vec3; 8]> =
            self.nodes.iter().map(|&node| arena.node(node).global_position()).collect();
        let base = positions[positions.len() - 1];

        for _ in 0..self.iterations {
            if positions[0].distance(target) < self.threshold {
                break;
            }
            self.fabrik_forward(&mut positions, target);
            self.fabrik_backward(&mut positions, base);
        }

        self.adjust_to_positions(arena, &positions);
        arena.node(self.effector()).global_position().distance(target) < self.threshold
    }

    /// Pin the effector to the target, then pull every position back onto its
    /// segment at the fixed bone length, walking toward the root.
    fn fabrik_forward(&self, positions: &mut [Vec3], target: Vec3) {
        positions[0] = target;
        for index in 1..positions.len() {
            let direction = positions[index] - positions[index - 1];
            if direction.length_squared() < MIN_DIRECTION_LENGTH_SQ {
                continue;
            }
            positions[index] =
                positions[index - 1] + direction.normalize() * self.bone_lengths[index - 1];
        }
    }

    /// Pin the root back to its original place and re-seat positions walking
    /// toward the effector.
    fn fabrik_backward(&self, positions: &mut [Vec3], base: Vec3) {
        let last = positions.len() - 1;
        positions[last] = base;
        for index in (0..last).rev() {
            let direction = positions[index] - positions[index + 1];
            if direction.length_squared() < MIN_DIRECTION_LENGTH_SQ {
                continue;
            }
            positions[index] =
                positions[index + 1] + direction.normalize() * self.bone_lengths[index];
        }
    }

    /// Turn the solved scratch positions into rotations, root-adjacent joint
    /// first so each child reads an up-to-date parent matrix.
    fn adjust_to_positions(&self, arena: &mut NodeArena, positions: &[Vec3]) {
        for index in (1..self.nodes.len()).rev() {
            let joint = self.nodes[index];
            let joint_position = arena.node(joint).global_position();
            let joint_rotation = arena.node(joint).global_rotation();
            let next_position = arena.node(self.nodes[index - 1]).global_position();

            let to_next = next_position - joint_position;
            let to_solved = positions[index - 1] - positions[index];
            if to_next.length_squared() < MIN_DIRECTION_LENGTH_SQ
                || to_solved.length_squared() < MIN_DIRECTION_LENGTH_SQ
            {
                continue;
            }
            let delta = Quat::from_rotation_arc(to_next.normalize(), to_solved.normalize());
            apply_world_rotation(arena, joint, joint_rotation, delta);
        }
    }
}

/// Express a world-space rotation delta in the joint's local frame, compose
/// it onto the current local rotation and propagate down to the effector.
fn apply_world_rotation(arena: &mut NodeArena, joint: u32, global_rotation: Quat, delta: Quat) {
    let local_delta = global_rotation.conjugate() * delta * global_rotation;
    let current = arena.node(joint).blended_rotation();
    arena.node_mut(joint).blend_rotation(current * local_delta, 1.0);
    arena.update_node_and_children(joint);
}
