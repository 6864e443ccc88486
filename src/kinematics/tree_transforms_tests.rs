use float_cmp::{ApproxEq, F64Margin};

use super::*;

use crate::model_elements::model::{Frame, Joint, JointType, Link};
use crate::model_elements::pose::Pose;

fn margin() -> F64Margin {
    F64Margin {
        ulps: 2,
        epsilon: 1e-9,
    }
}

fn assert_matrices_are_equal(expected: &Matrix4<f64>, calculated: &Matrix4<f64>) {
    let mut expected_it = expected.iter();
    let mut calculated_it = calculated.iter();
    loop {
        match (expected_it.next(), calculated_it.next()) {
            (Some(a), Some(b)) => {
                assert!(
                    (*a).approx_eq(*b, margin()),
                    "Expected {:.12} and {:.12} to be equal within 2 ulps or 1e-9",
                    *a,
                    *b
                );
            }
            (None, None) => break,
            _ => assert!(false),
        }
    }
}

fn create_pose(components: [f64; 6]) -> Pose {
    Pose {
        pose: components,
        relative_to: None,
        degrees: None,
        rotation_format: None,
    }
}

fn create_joint(name: &str, parent: &str, child: &str) -> Joint {
    Joint {
        name: name.to_string(),
        joint_type: JointType::Revolute,
        parent: parent.to_string(),
        child: child.to_string(),
        pose: None,
        axis: None,
    }
}

/// A fixed-base pendulum with the arm shifted one meter along x and a tool
/// frame on the arm.
fn create_model() -> Model {
    let mut model = Model::new("pendulum");
    model.canonical_link = Some("base".to_string());

    model.links.push(Link::new("base"));

    let mut arm = Link::new("arm");
    arm.pose = Some(create_pose([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
    model.links.push(arm);

    model
        .joints
        .push(create_joint("base_to_arm", "base", "arm"));

    let mut world_joint = create_joint("world_to_base", "world", "base");
    world_joint.joint_type = JointType::Fixed;
    world_joint.pose = Some(create_pose([0.0, 0.0, 1.0, 0.0, 0.0, 0.0]));
    model.joints.push(world_joint);

    model.frames.push(Frame {
        name: "tool".to_string(),
        attached_to: Some("arm".to_string()),
        pose: Some(Pose {
            pose: [0.0, 0.0, 0.25, 0.0, 0.0, 0.0],
            relative_to: Some("arm".to_string()),
            degrees: None,
            rotation_format: None,
        }),
    });

    model
}

#[test]
fn when_resolving_the_world_it_should_be_the_identity() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let world = transforms.transform(WORLD_FRAME).unwrap();

    assert_matrices_are_equal(&Matrix4::<f64>::identity(), &world);
}

#[test]
fn when_resolving_the_canonical_link_of_an_unplaced_model_it_should_be_the_identity() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let base = transforms.transform("base").unwrap();

    assert_matrices_are_equal(&Matrix4::<f64>::identity(), &base);
}

#[test]
fn when_resolving_a_link_it_should_compose_through_the_model_frame() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let arm = transforms.transform("arm").unwrap();

    assert!(arm[(0, 3)].approx_eq(1.0, margin()));
    assert!(arm[(1, 3)].approx_eq(0.0, margin()));
    assert!(arm[(2, 3)].approx_eq(0.0, margin()));
}

#[test]
fn when_resolving_a_placed_model_the_model_pose_should_shift_every_link() {
    let mut model = create_model();
    model.pose = Some(create_pose([0.0, 2.0, 0.0, 0.0, 0.0, 0.0]));

    let mut transforms = TreeTransforms::build(&model, true).unwrap();

    let base = transforms.transform("base").unwrap();
    assert!(base[(1, 3)].approx_eq(2.0, margin()));

    let arm = transforms.transform("arm").unwrap();
    assert!(arm[(0, 3)].approx_eq(1.0, margin()));
    assert!(arm[(1, 3)].approx_eq(2.0, margin()));

    // The model is addressable under its own name and the implicit name.
    let by_name = transforms.transform("pendulum").unwrap();
    let implicit = transforms.transform(MODEL_FRAME).unwrap();
    assert_matrices_are_equal(&by_name, &implicit);
}

#[test]
fn when_resolving_a_joint_it_should_match_its_child_frame_pose() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    // The joint pose defaults to a zero pose in the child link frame.
    let joint = transforms.transform("base_to_arm").unwrap();
    let arm = transforms.transform("arm").unwrap();

    assert_matrices_are_equal(&arm, &joint);
}

#[test]
fn when_resolving_a_frame_it_should_compose_through_its_reference() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let tool = transforms.transform("tool").unwrap();

    assert!(tool[(0, 3)].approx_eq(1.0, margin()));
    assert!(tool[(2, 3)].approx_eq(0.25, margin()));
}

#[test]
fn when_resolving_a_lumped_world_joint_it_should_use_its_frame_pose() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    // After world lumping the joint is a frame with the pose it had as an
    // edge, one meter above the base.
    let world_joint = transforms.transform("world_to_base").unwrap();

    assert!(world_joint[(2, 3)].approx_eq(1.0, margin()));
}

#[test]
fn when_resolving_an_unknown_name_it_should_error() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let result = transforms.transform("missing");

    assert_eq!(
        Err(Error::UnknownElement {
            name: "missing".to_string()
        }),
        result.map(|_| ())
    );
}

#[test]
fn when_computing_relative_transforms_the_two_directions_should_cancel() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let pairs = [
        ("base", "arm"),
        ("arm", "tool"),
        ("world", "base_to_arm"),
        (MODEL_FRAME, "arm"),
    ];

    for (from, to) in pairs {
        let forward = transforms.relative_transform(from, to).unwrap();
        let backward = transforms.relative_transform(to, from).unwrap();

        assert_matrices_are_equal(&Matrix4::<f64>::identity(), &(forward * backward));
    }
}

#[test]
fn when_computing_a_relative_transform_it_should_express_the_target_locally() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let base_from_arm = transforms.relative_transform("base", "arm").unwrap();

    assert!(base_from_arm[(0, 3)].approx_eq(1.0, margin()));
}

#[test]
fn when_resolving_a_transform_twice_the_cached_result_should_match() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let first = transforms.transform("tool").unwrap();
    let second = transforms.transform("tool").unwrap();

    assert_matrices_are_equal(&first, &second);
}

#[test]
fn when_clearing_the_cache_the_results_should_be_reproducible() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let first = transforms.transform("tool").unwrap();

    transforms.clear_cache();

    let second = transforms.transform("tool").unwrap();
    assert_matrices_are_equal(&first, &second);
}

#[test]
fn when_invalidating_an_element_its_dependents_should_be_recomputable() {
    let mut transforms = TreeTransforms::build(&create_model(), true).unwrap();

    let before = transforms.transform("tool").unwrap();

    // Invalidating the arm drops the cached arm and tool transforms; both
    // must resolve to the same values afterwards.
    transforms.invalidate("arm").unwrap();

    let after = transforms.transform("tool").unwrap();
    assert_matrices_are_equal(&before, &after);
}

#[test]
fn when_building_from_an_existing_tree_it_should_resolve_the_same_transforms() {
    let model = create_model();

    let tree = crate::kinematics::kinematic_tree::KinematicTree::build(&model, true).unwrap();
    let mut from_tree = TreeTransforms::from_tree(tree);
    let mut from_model = TreeTransforms::build(&model, true).unwrap();

    let expected = from_model.transform("arm").unwrap();
    let calculated = from_tree.transform("arm").unwrap();

    assert_matrices_are_equal(&expected, &calculated);
    assert_eq!(
        vec!["base", "arm"],
        from_tree.kinematic_tree().link_names()
    );
}
