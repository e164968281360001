use glam::{Mat4, Quat, Vec3};
use marionette::instance::ModelInstance;
use marionette::rig::{build_rig_template, RawNode, RawRig, RawSkin};
use marionette::skinning::SkinningMode;
use std::sync::Arc;

fn chain_rig() -> RawRig {
    // Bind globals along +X: (0,0,0), (1,0,0), (2,0,0). The inverse bind
    // matrices undo exactly those translations.
    let bind_globals =
        [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)];
    RawRig {
        name: "chain".to_string(),
        nodes: vec![
            RawNode { name: Some("root".into()), children: vec![1], ..Default::default() },
            RawNode {
                name: Some("mid".into()),
                children: vec![2],
                translation: Some([1.0, 0.0, 0.0]),
                ..Default::default()
            },
            RawNode {
                name: Some("tip".into()),
                translation: Some([1.0, 0.0, 0.0]),
                ..Default::default()
            },
        ],
        skin: RawSkin {
            joints: vec![0, 1, 2],
            inverse_bind_matrices: Some(
                bind_globals
                    .iter()
                    .map(|global| Mat4::from_translation(-*global).to_cols_array())
                    .collect(),
            ),
        },
        clips: Vec::new(),
    }
}

fn approx_mat4(a: Mat4, b: Mat4, tolerance: f32) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() <= tolerance)
}

#[test]
fn bind_pose_palette_is_identity() {
    let template = Arc::new(build_rig_template(chain_rig()).expect("template builds"));
    let mut instance = ModelInstance::new(template);
    instance.update(0.0);

    assert_eq!(instance.palette().joint_count(), 3);
    for (joint, matrix) in instance.palette().joint_matrices().iter().enumerate() {
        assert!(
            approx_mat4(*matrix, Mat4::IDENTITY, 1e-5),
            "joint {joint} is not identity at bind pose: {matrix:?}"
        );
    }
}

#[test]
fn dual_quats_encode_the_same_rigid_transform_as_the_matrices() {
    let template = Arc::new(build_rig_template(chain_rig()).expect("template builds"));
    let mut instance = ModelInstance::new(template);
    instance.settings.skinning_mode = SkinningMode::DualQuaternion;

    instance.arena_mut().node_mut(1).set_rotation(Quat::from_rotation_z(0.5));
    instance.update(0.0);

    for (joint, dual_quat) in instance.palette().joint_dual_quats().iter().enumerate() {
        let matrix = instance.palette().joint_matrices()[joint];
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();

        let real = Quat::from_array(dual_quat.real);
        let dual = Quat::from_array(dual_quat.dual);
        assert!(
            real.dot(rotation).abs() > 1.0 - 1e-4,
            "joint {joint} rotation mismatch: {real:?} vs {rotation:?}"
        );

        // The translation hides in the dual part: t = 2 * dual * conj(real).
        let translation_quat = (dual * real.conjugate()) * 2.0;
        let decoded =
            Vec3::new(translation_quat.x, translation_quat.y, translation_quat.z);
        assert!(
            decoded.distance(translation) < 1e-4,
            "joint {joint} translation mismatch: {decoded:?} vs {translation:?}"
        );
    }
}

#[test]
fn degenerate_joint_keeps_its_previous_dual_quat() {
    let template = Arc::new(build_rig_template(chain_rig()).expect("template builds"));
    let mut instance = ModelInstance::new(template);
    instance.settings.skinning_mode = SkinningMode::DualQuaternion;

    instance.arena_mut().node_mut(1).set_rotation(Quat::from_rotation_z(0.3));
    instance.update(0.0);
    let before = instance.palette().joint_dual_quats()[1];

    // A zero scale collapses the joint matrix; the dual quaternion for that
    // joint must survive from the previous frame.
    instance.arena_mut().node_mut(1).set_scale(Vec3::ZERO);
    instance.update(0.0);
    let after = instance.palette().joint_dual_quats()[1];

    assert_eq!(before.real, after.real, "degenerate joint replaced its rotation");
    assert_eq!(before.dual, after.dual, "degenerate joint replaced its translation");

    // The matrix palette is refreshed regardless.
    let matrix = instance.palette().joint_matrices()[1];
    assert!(matrix.determinant().abs() < 1e-6, "collapsed joint matrix kept volume");
}

#[test]
fn joint_matrix_data_is_row_major() {
    let template = Arc::new(build_rig_template(chain_rig()).expect("template builds"));
    let mut instance = ModelInstance::new(template);
    instance.arena_mut().node_mut(0).set_translation(Vec3::new(3.0, 4.0, 5.0));
    instance.update(0.0);

    let data = instance.palette().joint_matrix_data();
    // Row-major: the translation lands in the last column of each row.
    assert_eq!(data[0].0[0][3], 3.0);
    assert_eq!(data[0].0[1][3], 4.0);
    assert_eq!(data[0].0[2][3], 5.0);
}
