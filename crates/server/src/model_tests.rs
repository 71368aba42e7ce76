use super::*;

#[test]
fn properties_kind_matches_variant() {
    let p = Properties::Sphere;
    assert_eq!(p.kind(), ObjectKind::Sphere);
    assert!(p.matches_kind(ObjectKind::Sphere));
    assert!(!p.matches_kind(ObjectKind::Cube));
}

#[test]
fn camera_properties_carry_lens_fields() {
    let p = Properties::Camera {
        focal_length_mm: 50.0,
        sensor_width_mm: 36.0,
        clip_start: 0.1,
        clip_end: 1000.0,
    };
    assert_eq!(p.kind(), ObjectKind::Camera);
}

#[test]
fn new_object_derives_kind_from_properties() {
    let obj = Object::new(
        Uuid::new_v4(),
        "Box".to_owned(),
        Properties::Cube,
        None,
        None,
        Transform::default(),
        1_000,
        "user-1".to_owned(),
    );
    assert_eq!(obj.kind, ObjectKind::Cube);
    assert_eq!(obj.created_at, obj.last_updated_at);
    assert_eq!(obj.transform, Transform::default());
}

#[test]
fn asset_ref_object_carries_asset_id() {
    let obj = Object::new(
        Uuid::new_v4(),
        "Chair".to_owned(),
        Properties::AssetRef,
        Some("chair.glb".to_owned()),
        Some("library-1".to_owned()),
        Transform::default(),
        1_000,
        "user-1".to_owned(),
    );
    assert_eq!(obj.kind, ObjectKind::AssetRef);
    assert_eq!(obj.asset_id.as_deref(), Some("chair.glb"));
}

#[test]
fn primitives_and_asset_ref_have_no_bounds_to_violate() {
    assert!(Properties::Cube.within_declared_bounds());
    assert!(Properties::Sphere.within_declared_bounds());
    assert!(Properties::Cylinder.within_declared_bounds());
    assert!(Properties::AssetRef.within_declared_bounds());
}

#[test]
fn camera_requires_strictly_positive_lens_fields() {
    let valid = Properties::Camera {
        focal_length_mm: 50.0,
        sensor_width_mm: 36.0,
        clip_start: 0.1,
        clip_end: 1000.0,
    };
    assert!(valid.within_declared_bounds());

    let zero_focal_length = Properties::Camera {
        focal_length_mm: 0.0,
        sensor_width_mm: 36.0,
        clip_start: 0.1,
        clip_end: 1000.0,
    };
    assert!(!zero_focal_length.within_declared_bounds());
}

#[test]
fn point_light_requires_unit_color_and_nonnegative_power_and_radius() {
    let valid = Properties::PointLight {
        color_rgb: [0.0, 0.5, 1.0],
        power_watts: 0.0,
        radius: 0.0,
    };
    assert!(valid.within_declared_bounds());

    let color_out_of_range = Properties::PointLight {
        color_rgb: [1.5, 0.0, 0.0],
        power_watts: 10.0,
        radius: 1.0,
    };
    assert!(!color_out_of_range.within_declared_bounds());

    let negative_power = Properties::PointLight {
        color_rgb: [0.0, 0.0, 0.0],
        power_watts: -5.0,
        radius: 1.0,
    };
    assert!(!negative_power.within_declared_bounds());

    let negative_radius = Properties::PointLight {
        color_rgb: [0.0, 0.0, 0.0],
        power_watts: 5.0,
        radius: -1.0,
    };
    assert!(!negative_radius.within_declared_bounds());
}

#[test]
fn sun_light_requires_angle_within_0_to_pi() {
    let valid = Properties::SunLight {
        color_rgb: [1.0, 1.0, 1.0],
        intensity: 2.0,
        angle_rad: std::f64::consts::FRAC_PI_2,
    };
    assert!(valid.within_declared_bounds());

    let angle_too_large = Properties::SunLight {
        color_rgb: [1.0, 1.0, 1.0],
        intensity: 2.0,
        angle_rad: 100.0,
    };
    assert!(!angle_too_large.within_declared_bounds());

    let negative_intensity = Properties::SunLight {
        color_rgb: [1.0, 1.0, 1.0],
        intensity: -1.0,
        angle_rad: 0.1,
    };
    assert!(!negative_intensity.within_declared_bounds());
}
