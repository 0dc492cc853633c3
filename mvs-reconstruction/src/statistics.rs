use crate::{Reconstruction, TrackElement};
use float_ord::FloatOrd;
use itertools::Itertools;
use log::*;

/// Lower bin edges of the track length histogram. The largest track length closes the last bin.
pub const TRACK_LENGTH_BIN_EDGES: [usize; 13] = [2, 3, 4, 5, 6, 7, 8, 9, 10, 15, 20, 25, 50];

/// Summary of how well the points of a reconstruction project onto their observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReprojectionStatistics {
    pub observations: usize,
    pub behind_camera: usize,
    /// Mean reprojection error in pixels.
    pub mean_error: f64,
    /// Upper median reprojection error in pixels.
    pub median_error: f64,
}

/// Summary of the number of observations per track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLengthStatistics {
    pub tracks: usize,
    pub mean: f64,
    pub median: f64,
    /// Histogram bin edges; bin `i` is `[edges[i], edges[i + 1])` and the last bin is closed.
    pub edges: Vec<usize>,
    pub counts: Vec<usize>,
}

/// Projects every point into every image that observes it and compares against the
/// observed feature.
///
/// Returns `None` if the reconstruction has no observations.
pub fn reprojection_statistics(
    reconstruction: &Reconstruction,
) -> Option<ReprojectionStatistics> {
    let mut behind_camera = 0;
    let mut errors = vec![];
    for point in reconstruction.points() {
        for &TrackElement { image, feature } in &point.track {
            let (image, camera) = match (
                reconstruction.image(image),
                reconstruction.camera_of(image),
            ) {
                (Some(image), Some(camera)) => (image, camera),
                _ => continue,
            };
            let camera_point = image.to_camera(&point.xyz);
            if camera_point.z < 0.0 {
                behind_camera += 1;
            }
            if let Some(projection) = camera.project(&camera_point) {
                errors.push((image.features[feature] - projection).norm());
            }
        }
    }

    if errors.is_empty() {
        info!("no observed 3d points, so no reprojection statistics");
        return None;
    }

    errors.sort_unstable_by_key(|&e| FloatOrd(e));
    let statistics = ReprojectionStatistics {
        observations: errors.len(),
        behind_camera,
        mean_error: errors.iter().sum::<f64>() / errors.len() as f64,
        median_error: errors[errors.len() / 2],
    };
    info!(
        "observations: {}, behind camera: {}, mean reprojection error: {}, median reprojection error: {}",
        statistics.observations,
        statistics.behind_camera,
        statistics.mean_error,
        statistics.median_error
    );
    Some(statistics)
}

/// Computes the mean, median and histogram of track lengths.
///
/// Returns `None` if the reconstruction has no tracks.
pub fn track_length_statistics(reconstruction: &Reconstruction) -> Option<TrackLengthStatistics> {
    let lengths = reconstruction
        .points()
        .map(|point| point.track.len())
        .sorted_unstable()
        .collect_vec();
    let max = *lengths.last()?;

    let middle = lengths.len() / 2;
    let median = if lengths.len() % 2 == 0 {
        (lengths[middle - 1] + lengths[middle]) as f64 / 2.0
    } else {
        lengths[middle] as f64
    };

    let mut edges = TRACK_LENGTH_BIN_EDGES
        .into_iter()
        .filter(|&edge| edge < max)
        .collect_vec();
    if edges.is_empty() {
        edges.push(max);
    }
    edges.push(max);

    let mut counts = vec![0; edges.len() - 1];
    for &length in &lengths {
        let last = counts.len() - 1;
        if length == max {
            counts[last] += 1;
        } else if let Some(bin) = edges.windows(2).position(|w| w[0] <= length && length < w[1]) {
            counts[bin] += 1;
        }
    }

    let statistics = TrackLengthStatistics {
        tracks: lengths.len(),
        mean: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        median,
        edges,
        counts,
    };
    info!("mean track length: {}", statistics.mean);
    info!("median track length: {}", statistics.median);
    info!(
        "track length histogram: {}",
        statistics
            .edges
            .iter()
            .tuple_windows()
            .zip(&statistics.counts)
            .map(|((low, high), count)| format!("[{}, {}): {}", low, high, count))
            .join(", ")
    );
    Some(statistics)
}
