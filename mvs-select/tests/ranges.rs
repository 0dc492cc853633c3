use approx::assert_relative_eq;
use core::f64::consts::PI;
use mvs_reconstruction::nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use mvs_reconstruction::{Camera, CameraId, Image, ImageId, Reconstruction};
use mvs_select::{
    compute_neighbor_ranges, compute_ranges, DegenerateGeometry, Error, RangeGrid,
    RelativeGeometry, ScoreTable, ViewSelectionSettings,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

fn image(id: u32, center: Point3<f64>, rotation: UnitQuaternion<f64>) -> Image {
    Image {
        id: ImageId(id),
        camera: CameraId(1),
        name: format!("{}.png", id),
        rotation,
        translation: -(rotation * center.coords),
        features: vec![],
        point3d_ids: vec![],
    }
}

fn reconstruction(camera: Camera, images: Vec<Image>) -> Reconstruction {
    Reconstruction::new(vec![camera], images, vec![]).unwrap()
}

/// Reference at the origin and a neighbor one unit to its right, both looking down +z.
fn horizontal_baseline() -> Reconstruction {
    let camera =
        Camera::from_model(CameraId(1), "SIMPLE_PINHOLE", &[1000.0, 500.5, 500.5], 1001, 1001)
            .unwrap();
    reconstruction(
        camera,
        vec![
            image(1, Point3::origin(), UnitQuaternion::identity()),
            image(2, Point3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()),
        ],
    )
}

#[test]
fn central_pixel() {
    let reconstruction = horizontal_baseline();
    let map = compute_ranges(
        &reconstruction,
        ImageId(1),
        ImageId(2),
        &ViewSelectionSettings::default(),
    )
    .unwrap();
    assert_eq!((map.grid.width, map.grid.height), (1001, 1001));
    let range = map.get(500, 500).unwrap().unwrap();
    assert_relative_eq!(range.depth.min, 1.0 / 0.5005, epsilon = 1e-9);
    assert_eq!(range.depth.max, f64::INFINITY);
    assert_eq!(range.disparity.min, 0.0);
    assert_relative_eq!(range.disparity.max, 0.5005, epsilon = 1e-9);
    assert!(map.get(1001, 0).is_none());
}

#[test]
fn neighbor_facing_away() {
    let camera = Camera::from_model(CameraId(1), "PINHOLE", &[60.0, 60.0, 32.0, 24.0], 64, 48)
        .unwrap();
    let reconstruction = reconstruction(
        camera,
        vec![
            image(1, Point3::origin(), UnitQuaternion::identity()),
            image(
                2,
                Point3::new(0.0, 0.0, -1.0),
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI),
            ),
        ],
    );
    let map = compute_ranges(
        &reconstruction,
        ImageId(1),
        ImageId(2),
        &ViewSelectionSettings::default(),
    )
    .unwrap();
    assert_eq!(map.degenerate(), 0);
    assert_eq!(map.invisible(), map.grid.len());
    for (_, _, range) in map.iter() {
        let range = range.unwrap();
        assert!(range.depth.is_empty());
        assert!(range.disparity.is_empty());
    }
}

#[test]
fn depth_and_disparity_agree() {
    let camera = Camera::from_model(
        CameraId(1),
        "PINHOLE",
        &[500.0, 510.0, 320.0, 240.0],
        640,
        480,
    )
    .unwrap();
    let mut rng = Pcg64::from_seed([5; 32]);
    let mut checked = 0;
    for _ in 0..8 {
        let center = Point3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-0.3..0.3),
            rng.gen_range(-0.5..0.5),
        );
        let rotation = UnitQuaternion::from_euler_angles(
            rng.gen_range(-0.2..0.2),
            rng.gen_range(-0.3..0.3),
            rng.gen_range(-0.1..0.1),
        );
        let reconstruction = reconstruction(
            camera.clone(),
            vec![
                image(1, Point3::origin(), UnitQuaternion::identity()),
                image(2, center, rotation),
            ],
        );
        let settings = ViewSelectionSettings {
            max_width: Some(64),
            ..Default::default()
        };
        let map = compute_ranges(&reconstruction, ImageId(1), ImageId(2), &settings).unwrap();
        let geometry = RelativeGeometry::new(
            reconstruction.image(ImageId(1)).unwrap(),
            reconstruction.image(ImageId(2)).unwrap(),
            &camera,
        );
        for (x, y, range) in map.iter() {
            let range = match range {
                Ok(range) if !range.depth.is_empty() && !range.disparity.is_empty() => range,
                _ => continue,
            };
            let ray = camera.unproject(&map.grid.pixel(x, y));
            let ends = [range.depth.min, range.depth.max]
                .map(|depth| geometry.disparity_at_depth(&ray, depth));
            if let [Some(near), Some(far)] = ends {
                let (low, high) = if near <= far { (near, far) } else { (far, near) };
                if low.is_finite() && range.disparity.min.is_finite() {
                    assert_relative_eq!(low, range.disparity.min, epsilon = 1e-9, max_relative = 1e-6);
                }
                if high.is_finite() && range.disparity.max.is_finite() {
                    assert_relative_eq!(high, range.disparity.max, epsilon = 1e-9, max_relative = 1e-6);
                }
                checked += 1;
            }
        }
    }
    assert!(checked > 0);
}

#[test]
fn degenerate_pixel_stays_local() {
    // The middle pixel looks straight down the optical axis, which the neighbor's left image
    // edge contains since its principal point sits on the edge.
    let reference_camera =
        Camera::from_model(CameraId(1), "PINHOLE", &[1.0, 1.0, 1.5, 0.5], 3, 1).unwrap();
    let neighbor_camera =
        Camera::from_model(CameraId(2), "PINHOLE", &[1.0, 1.0, 0.0, 0.5], 4, 1).unwrap();
    let reference = image(1, Point3::origin(), UnitQuaternion::identity());
    let neighbor = Image {
        camera: CameraId(2),
        ..image(2, Point3::new(1.0, 0.0, 0.0), UnitQuaternion::identity())
    };
    let reconstruction = Reconstruction::new(
        vec![reference_camera, neighbor_camera],
        vec![reference, neighbor],
        vec![],
    )
    .unwrap();
    let map = compute_ranges(
        &reconstruction,
        ImageId(1),
        ImageId(2),
        &ViewSelectionSettings::default(),
    )
    .unwrap();
    assert_eq!((map.grid.width, map.grid.height), (3, 1));
    assert_eq!(map.degenerate(), 1);
    assert_eq!(map.get(1, 0), Some(Err(DegenerateGeometry)));
    assert!(map.get(0, 0).unwrap().is_ok());
    assert!(map.get(2, 0).unwrap().is_ok());
}

#[test]
fn downscaled_grid() {
    let camera = Camera::from_model(CameraId(1), "PINHOLE", &[500.0, 500.0, 320.0, 240.0], 640, 480)
        .unwrap();
    let settings = ViewSelectionSettings {
        max_width: Some(320),
        max_height: Some(400),
        ..Default::default()
    };
    let grid = RangeGrid::new(&camera, &settings);
    assert_eq!((grid.width, grid.height), (320, 240));
    assert_relative_eq!(grid.pixel(0, 0).coords, Vector2::new(1.0, 1.0));
}

#[test]
fn neighbor_ranges_follow_ranking() {
    let reconstruction = horizontal_baseline();
    let mut table = ScoreTable::new(reconstruction.image_ids());
    table.set_score(ImageId(1), ImageId(2), 1.0).unwrap();
    let settings = ViewSelectionSettings {
        max_width: Some(50),
        ..Default::default()
    };
    let maps = compute_neighbor_ranges(&reconstruction, &table, ImageId(1), &settings).unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!((maps[0].reference, maps[0].neighbor), (ImageId(1), ImageId(2)));
    assert_eq!(
        compute_neighbor_ranges(&reconstruction, &table, ImageId(7), &settings),
        Err(Error::UnknownImage(ImageId(7)))
    );
}
