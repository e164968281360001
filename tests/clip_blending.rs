use glam::{Quat, Vec3};
use marionette::channel::{
    AnimationChannel, ChannelInterpolation, ChannelKeys, TargetPath,
};
use marionette::clip::AnimationClip;
use marionette::node::{Node, NodeArena};
use std::sync::Arc;

fn three_bone_arena() -> NodeArena {
    let mut root = Node::new(0, Arc::from("root"));
    root.children.push(1);
    let mut mid = Node::new(1, Arc::from("mid"));
    mid.parent = Some(0);
    mid.children.push(2);
    mid.set_translation(Vec3::new(1.0, 0.0, 0.0));
    let mut tip = Node::new(2, Arc::from("tip"));
    tip.parent = Some(1);
    tip.set_translation(Vec3::new(1.0, 0.0, 0.0));
    let mut arena = NodeArena::new(vec![root, mid, tip]);
    arena.update_all();
    arena
}

fn translation_channel(node: u32, from: Vec3, to: Vec3) -> AnimationChannel {
    AnimationChannel::new(
        node,
        TargetPath::Translation,
        ChannelInterpolation::Linear,
        Arc::from([0.0_f32, 1.0]),
        ChannelKeys::Vec3Keys(Arc::from([from, to])),
    )
    .expect("valid channel")
}

fn rotation_channel(node: u32, from: Quat, to: Quat) -> AnimationChannel {
    AnimationChannel::new(
        node,
        TargetPath::Rotation,
        ChannelInterpolation::Linear,
        Arc::from([0.0_f32, 1.0]),
        ChannelKeys::QuatKeys(Arc::from([from, to])),
    )
    .expect("valid channel")
}

fn approx_vec3(actual: Vec3, expected: Vec3) {
    assert!((actual - expected).length() < 1e-4, "expected {expected:?}, got {actual:?}");
}

#[test]
fn set_frame_writes_sampled_pose_into_masked_nodes() {
    let mut arena = three_bone_arena();
    let clip = AnimationClip::new(
        Arc::from("walk"),
        vec![
            translation_channel(1, Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 0.0)),
            translation_channel(2, Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 4.0)),
        ],
    );

    let mask = vec![true, true, false];
    clip.set_frame(&mut arena, &mask, 0.5);

    approx_vec3(arena.node(1).translation(), Vec3::new(1.0, 1.0, 0.0));
    // Node 2 is excluded by the mask and keeps its pose.
    approx_vec3(arena.node(2).translation(), Vec3::new(1.0, 0.0, 0.0));
}

#[test]
fn set_then_blend_with_full_factor_is_a_no_op() {
    let mut arena = three_bone_arena();
    let clip = AnimationClip::new(
        Arc::from("walk"),
        vec![
            translation_channel(1, Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0)),
            rotation_channel(1, Quat::IDENTITY, Quat::from_rotation_z(1.0)),
        ],
    );
    let mask = vec![true; 3];

    clip.set_frame(&mut arena, &mask, 0.75);
    arena.update_all();
    let globals_before: Vec<_> =
        arena.nodes().iter().map(|node| node.global_matrix()).collect();

    clip.blend_frame(&mut arena, &mask, 0.75, 1.0);
    arena.update_all();

    for (node, before) in arena.nodes().iter().zip(globals_before) {
        let diff = (node.global_matrix().to_cols_array().iter())
            .zip(before.to_cols_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(diff < 1e-4, "node '{}' moved by {diff} in a full-factor re-blend", node.name);
    }
}

#[test]
fn blend_factor_zero_keeps_the_base_pose() {
    let mut arena = three_bone_arena();
    let clip = AnimationClip::new(
        Arc::from("lean"),
        vec![translation_channel(1, Vec3::new(9.0, 9.0, 9.0), Vec3::new(9.0, 9.0, 9.0))],
    );
    let mask = vec![true; 3];

    clip.blend_frame(&mut arena, &mask, 0.0, 0.0);
    approx_vec3(arena.node(1).blended_translation(), Vec3::new(1.0, 0.0, 0.0));

    clip.blend_frame(&mut arena, &mask, 0.0, 0.5);
    approx_vec3(arena.node(1).blended_translation(), Vec3::new(5.0, 4.5, 4.5));
}

#[test]
fn end_time_reads_the_first_channel() {
    let short = translation_channel(0, Vec3::ZERO, Vec3::ONE);
    let long = AnimationChannel::new(
        1,
        TargetPath::Translation,
        ChannelInterpolation::Linear,
        Arc::from([0.0_f32, 5.0]),
        ChannelKeys::Vec3Keys(Arc::from([Vec3::ZERO, Vec3::ONE])),
    )
    .expect("valid channel");

    let clip = AnimationClip::new(Arc::from("mixed"), vec![short.clone(), long.clone()]);
    assert_eq!(clip.end_time(), 1.0, "clip length comes from its first channel");

    let clip = AnimationClip::new(Arc::from("mixed_reversed"), vec![long, short]);
    assert_eq!(clip.end_time(), 5.0);

    let empty = AnimationClip::new(Arc::from("empty"), Vec::new());
    assert_eq!(empty.end_time(), 0.0);
}
