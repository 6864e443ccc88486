use criterion::{black_box, criterion_group, criterion_main, Criterion};
use robot_description_frames::{
    frame_conventions::FrameConvention,
    kinematics::{kinematic_tree::KinematicTree, tree_transforms::TreeTransforms},
    model_elements::model::{Frame, Joint, JointType, Link, Model},
    model_elements::pose::Pose,
};

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        kinematic_tree_build,
        tree_transforms_cold_transform,
        tree_transforms_warm_transform,
        switch_frame_convention_to_urdf,
}

criterion_main!(benches);

pub fn kinematic_tree_build(c: &mut Criterion) {
    let model = create_chain_model(16);

    c.bench_function("KinematicTree::build", |b| {
        b.iter(|| KinematicTree::build(black_box(&model), true));
    });
}

pub fn tree_transforms_cold_transform(c: &mut Criterion) {
    let model = create_chain_model(16);

    c.bench_function("TreeTransforms::transform (cold cache)", |b| {
        b.iter(|| {
            let mut transforms = TreeTransforms::build(black_box(&model), true).unwrap();
            transforms.transform(black_box("link_15")).unwrap()
        });
    });
}

pub fn tree_transforms_warm_transform(c: &mut Criterion) {
    let model = create_chain_model(16);
    let mut transforms = TreeTransforms::build(&model, true).unwrap();
    transforms.transform("link_15").unwrap();

    c.bench_function("TreeTransforms::transform (warm cache)", |b| {
        b.iter(|| transforms.transform(black_box("link_15")).unwrap());
    });
}

pub fn switch_frame_convention_to_urdf(c: &mut Criterion) {
    let model = create_chain_model(16);

    c.bench_function("Model::switch_frame_convention (Urdf)", |b| {
        b.iter(|| {
            let mut copy = black_box(&model).clone();
            copy.switch_frame_convention(FrameConvention::Urdf, true, true, true)
                .unwrap();
            copy
        });
    });
}

/// Creates a fixed-base serial chain with the given number of links, each
/// shifted along x, plus a frame on the last link.
fn create_chain_model(links: usize) -> Model {
    let mut model = Model::new("chain");
    model.canonical_link = Some("link_0".to_string());

    for index in 0..links {
        let mut link = Link::new(&format!("link_{}", index));
        link.pose = Some(Pose {
            pose: [index as f64, 0.0, 0.0, 0.0, 0.0, 0.0],
            relative_to: None,
            degrees: None,
            rotation_format: None,
        });
        model.links.push(link);
    }

    for index in 1..links {
        model.joints.push(Joint {
            name: format!("joint_{}", index),
            joint_type: JointType::Revolute,
            parent: format!("link_{}", index - 1),
            child: format!("link_{}", index),
            pose: None,
            axis: None,
        });
    }

    model.joints.push(Joint {
        name: "world_to_chain".to_string(),
        joint_type: JointType::Fixed,
        parent: "world".to_string(),
        child: "link_0".to_string(),
        pose: Some(Pose {
            pose: [0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            relative_to: None,
            degrees: None,
            rotation_format: None,
        }),
        axis: None,
    });

    model.add_frame(Frame {
        name: "tip".to_string(),
        attached_to: Some(format!("link_{}", links - 1)),
        pose: None,
    });

    model
}
