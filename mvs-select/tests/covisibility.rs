use approx::assert_relative_eq;
use float_ord::FloatOrd;
use mvs_reconstruction::nalgebra::{Point2, Point3, UnitQuaternion};
use mvs_reconstruction::{
    Camera, CameraId, Image, ImageId, Point3D, Point3DId, Reconstruction, TrackElement,
};
use mvs_select::{
    compute_covisibility, rank_neighbors, triangulation_angle, ScoringPolicy,
    ViewSelectionSettings,
};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_pcg::Pcg64;

const SUPPORTED_TRACKS: usize = 150;

fn camera() -> Camera {
    Camera::from_model(CameraId(1), "SIMPLE_PINHOLE", &[1000.0, 500.0, 500.0], 1000, 1000)
        .unwrap()
}

fn image(id: u32, center: Point3<f64>) -> Image {
    let rotation = UnitQuaternion::identity();
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

fn add_point(
    images: &mut [Image],
    camera: &Camera,
    xyz: Point3<f64>,
    observers: &[usize],
    points: &mut Vec<Point3D>,
) {
    let id = Point3DId(points.len() as u64);
    let track = observers
        .iter()
        .map(|&ix| {
            let image = &mut images[ix];
            let pixel = camera
                .project(&image.to_camera(&xyz))
                .unwrap_or_else(Point2::origin);
            image.features.push(pixel);
            image.point3d_ids.push(Some(id));
            TrackElement {
                image: image.id,
                feature: image.features.len() - 1,
            }
        })
        .collect();
    points.push(Point3D { id, xyz, track });
}

/// Two views one unit apart that share `tracks` points at the given depth range.
fn stereo_pair(second: Point3<f64>, tracks: usize, depths: (f64, f64)) -> Reconstruction {
    let camera = camera();
    let mut images = vec![image(1, Point3::origin()), image(2, second)];
    let mut points = vec![];
    let mut rng = Pcg64::from_seed([5; 32]);
    for _ in 0..tracks {
        let xyz = Point3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(depths.0..depths.1),
        );
        add_point(&mut images, &camera, xyz, &[0, 1], &mut points);
    }
    Reconstruction::new(vec![camera], images, points).unwrap()
}

fn count_settings() -> ViewSelectionSettings {
    ViewSelectionSettings::default()
}

fn kernel_settings() -> ViewSelectionSettings {
    ViewSelectionSettings {
        policy: ScoringPolicy::ContinuousKernel,
        ..Default::default()
    }
}

fn random_scene() -> Reconstruction {
    let camera = camera();
    let mut rng = Pcg64::from_seed([7; 32]);
    let mut images = (0..6)
        .map(|id| {
            let center = Point3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
            );
            image(id, center)
        })
        .collect::<Vec<_>>();
    let mut points = vec![];
    let views = (0..images.len()).collect::<Vec<_>>();
    for _ in 0..1000 {
        let xyz = Point3::new(
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
            rng.gen_range(4.0..12.0),
        );
        let length = rng.gen_range(2..=views.len());
        let observers = views
            .choose_multiple(&mut rng, length)
            .copied()
            .collect::<Vec<_>>();
        add_point(&mut images, &camera, xyz, &observers, &mut points);
    }
    Reconstruction::new(vec![camera], images, points).unwrap()
}

#[test]
fn single_track_pair() {
    let camera = camera();
    let mut images = vec![
        image(1, Point3::origin()),
        image(2, Point3::new(1.0, 0.0, 0.0)),
    ];
    let mut points = vec![];
    add_point(
        &mut images,
        &camera,
        Point3::new(0.0, 0.0, 10.0),
        &[0, 1],
        &mut points,
    );
    let reconstruction = Reconstruction::new(vec![camera], images, points).unwrap();

    let angle = (0.1f64).atan().to_degrees();
    assert_relative_eq!(angle, 5.710593137499643, epsilon = 1e-9);

    // One sample is far below the required support.
    let table = compute_covisibility(&reconstruction, &count_settings());
    assert_eq!(table.score(ImageId(1), ImageId(2)), Some(0.0));

    let table = compute_covisibility(&reconstruction, &kernel_settings());
    let kernel = (angle - 5.0) / 10.0;
    assert_relative_eq!(
        table.score(ImageId(1), ImageId(2)).unwrap(),
        (-kernel * kernel / 2.0).exp(),
        epsilon = 1e-9
    );
}

#[test]
fn count_with_wide_angles() {
    let reconstruction = stereo_pair(Point3::new(1.0, 0.0, 0.0), SUPPORTED_TRACKS, (5.0, 10.0));
    let table = compute_covisibility(&reconstruction, &count_settings());
    assert_eq!(
        table.score(ImageId(1), ImageId(2)),
        Some(SUPPORTED_TRACKS as f64)
    );
}

#[test]
fn count_with_narrow_angles() {
    let reconstruction =
        stereo_pair(Point3::new(1.0, 0.0, 0.0), SUPPORTED_TRACKS, (500.0, 1000.0));
    let table = compute_covisibility(&reconstruction, &count_settings());
    assert_eq!(table.score(ImageId(1), ImageId(2)), Some(0.0));
}

#[test]
fn coincident_centers_score_zero() {
    let reconstruction = stereo_pair(Point3::origin(), SUPPORTED_TRACKS, (5.0, 10.0));
    for settings in [count_settings(), kernel_settings()] {
        let table = compute_covisibility(&reconstruction, &settings);
        assert_eq!(table.score(ImageId(1), ImageId(2)), Some(0.0));
    }
}

#[test]
fn scores_are_symmetric() {
    let reconstruction = random_scene();
    for settings in [
        ViewSelectionSettings {
            min_angle_samples: 10,
            ..count_settings()
        },
        kernel_settings(),
    ] {
        let table = compute_covisibility(&reconstruction, &settings);
        assert_eq!(table.len(), 6);
        let mut nonzero = 0;
        for &a in table.views() {
            assert_eq!(table.score(a, a), Some(0.0));
            for &b in table.views() {
                assert_eq!(table.score(a, b), table.score(b, a));
                if table.score(a, b) != Some(0.0) {
                    nonzero += 1;
                }
            }
        }
        assert!(nonzero > 0);
    }
}

#[test]
fn ranking_from_scene() {
    let reconstruction = random_scene();
    let table = compute_covisibility(&reconstruction, &kernel_settings());
    for &view in table.views() {
        let neighbors = rank_neighbors(&table, view, 3).unwrap();
        assert_eq!(neighbors.len(), 3);
        assert!(!neighbors.contains(&view));
        let scores = neighbors
            .iter()
            .map(|&neighbor| FloatOrd(table.score(view, neighbor).unwrap()))
            .collect::<Vec<_>>();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));

        let all = rank_neighbors(&table, view, 100).unwrap();
        assert_eq!(all.len(), table.len() - 1);
    }
}

#[quickcheck]
fn folded_angle_is_acute(point: (f64, f64, f64), a: (f64, f64, f64), b: (f64, f64, f64)) -> TestResult {
    let coordinates = [point.0, point.1, point.2, a.0, a.1, a.2, b.0, b.1, b.2];
    if coordinates.iter().any(|c| !c.is_finite() || c.abs() > 1e6) {
        return TestResult::discard();
    }
    let to_point = |(x, y, z): (f64, f64, f64)| Point3::new(x, y, z);
    match triangulation_angle(&to_point(point), &to_point(a), &to_point(b)) {
        Some(angle) => TestResult::from_bool(
            (0.0..=core::f64::consts::FRAC_PI_2).contains(&angle),
        ),
        None => TestResult::passed(),
    }
}

#[test]
fn unknown_view_is_an_error() {
    let reconstruction = stereo_pair(Point3::new(1.0, 0.0, 0.0), 10, (5.0, 10.0));
    let table = compute_covisibility(&reconstruction, &count_settings());
    assert!(rank_neighbors(&table, ImageId(3), 1).is_err());
}
