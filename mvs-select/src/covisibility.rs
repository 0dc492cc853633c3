use crate::{Error, ScoringPolicy, ViewSelectionSettings};
use core::f64::consts::PI;
use float_ord::FloatOrd;
use itertools::Itertools;
use log::*;
use mvs_reconstruction::nalgebra::{DMatrix, Point3};
use mvs_reconstruction::{ImageId, Point3D, Reconstruction};
use std::collections::HashMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// An unordered pair of distinct views.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewPair(ImageId, ImageId);

impl ViewPair {
    /// Creates a new pair, cannonicalizing the order of the pair.
    pub fn new(a: ImageId, b: ImageId) -> Self {
        Self(std::cmp::min(a, b), std::cmp::max(a, b))
    }

    pub fn first(self) -> ImageId {
        self.0
    }

    pub fn second(self) -> ImageId {
        self.1
    }
}

/// Everything a pair collects from the tracks it shares.
#[derive(Debug, Clone, Default)]
struct PairAccumulator {
    count: usize,
    /// Only filled for [`ScoringPolicy::AngleFilteredCount`].
    angles: Vec<f64>,
    /// Only filled for [`ScoringPolicy::ContinuousKernel`].
    kernel: f64,
}

impl PairAccumulator {
    fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.angles.extend(other.angles);
        self.kernel += other.kernel;
    }
}

type Accumulators = HashMap<ViewPair, PairAccumulator>;

fn merge_accumulators(a: Accumulators, b: Accumulators) -> Accumulators {
    let (mut larger, smaller) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for (pair, accumulator) in smaller {
        larger.entry(pair).or_default().merge(accumulator);
    }
    larger
}

/// The angle at `point` between the rays towards the camera centers `a` and `b`, folded
/// into `[0, π/2]` so that the angle and its supplement are treated alike.
///
/// Returns `None` when a center coincides with the point or with the other center, since
/// no angle is defined there.
///
/// ```
/// use mvs_select::triangulation_angle;
/// use mvs_reconstruction::nalgebra::Point3;
/// let angle = triangulation_angle(
///     &Point3::new(0.0, 0.0, 10.0),
///     &Point3::origin(),
///     &Point3::new(1.0, 0.0, 0.0),
/// )
/// .unwrap();
/// assert!((angle - (0.1f64).atan()).abs() < 1e-12);
/// ```
pub fn triangulation_angle(point: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Option<f64> {
    let d1 = (point - a).norm_squared();
    let d2 = (point - b).norm_squared();
    let d3 = (a - b).norm_squared();
    let denominator = d1 * d2;
    if denominator == 0.0 || d3 == 0.0 {
        return None;
    }
    let cosine = ((d1 + d2 - d3) / (2.0 * denominator.sqrt())).clamp(-1.0, 1.0);
    let angle = cosine.acos();
    Some(angle.min(PI - angle))
}

/// Weight of a triangulation angle (in degrees) under [`ScoringPolicy::ContinuousKernel`].
pub fn kernel_weight(angle: f64, settings: &ViewSelectionSettings) -> f64 {
    let sigma = if angle < settings.kernel_center {
        settings.kernel_sigma_below
    } else {
        settings.kernel_sigma_above
    };
    let kernel = (angle - settings.kernel_center) / sigma;
    (-kernel * kernel / 2.0).exp()
}

/// Linearly interpolated percentile of sorted values.
fn percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = percentile.clamp(0.0, 100.0) / 100.0 * last as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    Some(sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64))
}

fn accumulate_track(
    accumulators: &mut Accumulators,
    reconstruction: &Reconstruction,
    point: &Point3D,
    settings: &ViewSelectionSettings,
) {
    for (x, y) in point.track.iter().tuple_combinations() {
        if x.image == y.image {
            continue;
        }
        let angle = match (reconstruction.center(x.image), reconstruction.center(y.image)) {
            (Some(a), Some(b)) => triangulation_angle(&point.xyz, &a, &b),
            _ => None,
        };
        let angle = match angle {
            Some(angle) => angle,
            None => continue,
        };
        let accumulator = accumulators
            .entry(ViewPair::new(x.image, y.image))
            .or_default();
        accumulator.count += 1;
        match settings.policy {
            ScoringPolicy::AngleFilteredCount => accumulator.angles.push(angle),
            ScoringPolicy::ContinuousKernel => {
                accumulator.kernel += kernel_weight(angle.to_degrees(), settings)
            }
        }
    }
}

fn count_score(accumulator: PairAccumulator, settings: &ViewSelectionSettings) -> f64 {
    if accumulator.count < settings.min_angle_samples {
        return 0.0;
    }
    let mut angles = accumulator.angles;
    angles.sort_unstable_by_key(|&angle| FloatOrd(angle));
    match percentile(&angles, settings.angle_percentile) {
        Some(angle) if angle >= settings.min_triangulation_angle.to_radians() => {
            accumulator.count as f64
        }
        _ => 0.0,
    }
}

/// Symmetric scores between every pair of views of a reconstruction.
///
/// Views with no shared tracks score `0.0`, as does every view against itself.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    /// Sorted and deduplicated.
    views: Vec<ImageId>,
    scores: DMatrix<f64>,
}

impl ScoreTable {
    /// Creates a table of zero scores over `views`.
    pub fn new(views: impl IntoIterator<Item = ImageId>) -> Self {
        let views = views.into_iter().sorted().dedup().collect_vec();
        let scores = DMatrix::zeros(views.len(), views.len());
        Self { views, scores }
    }

    pub fn views(&self) -> &[ImageId] {
        &self.views
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn contains(&self, view: ImageId) -> bool {
        self.index(view).is_some()
    }

    fn index(&self, view: ImageId) -> Option<usize> {
        self.views.binary_search(&view).ok()
    }

    /// The score of a pair, or `None` if either view is unknown.
    pub fn score(&self, a: ImageId, b: ImageId) -> Option<f64> {
        Some(self.scores[(self.index(a)?, self.index(b)?)])
    }

    /// Sets the score of a pair in both directions. The score of a view against itself
    /// stays zero.
    pub fn set_score(&mut self, a: ImageId, b: ImageId, score: f64) -> Result<(), Error> {
        let ia = self.index(a).ok_or(Error::UnknownImage(a))?;
        let ib = self.index(b).ok_or(Error::UnknownImage(b))?;
        if ia != ib {
            self.scores[(ia, ib)] = score;
            self.scores[(ib, ia)] = score;
        }
        Ok(())
    }

    /// Scores of `view` against every other view, in ascending id order.
    pub fn scores(&self, view: ImageId) -> Option<impl Iterator<Item = (ImageId, f64)> + '_> {
        let row = self.index(view)?;
        Some(
            self.views
                .iter()
                .enumerate()
                .filter(move |&(column, _)| column != row)
                .map(move |(column, &other)| (other, self.scores[(row, column)])),
        )
    }
}

/// Scores every pair of views by the triangulation angles of the tracks they share.
///
/// Each track contributes once per pair of distinct observing views. Tracks are processed in
/// parallel when the `rayon` feature is enabled; partial tables are merged by addition.
pub fn compute_covisibility(
    reconstruction: &Reconstruction,
    settings: &ViewSelectionSettings,
) -> ScoreTable {
    let points = reconstruction.points().collect_vec();

    #[cfg(feature = "rayon")]
    let accumulators = points
        .par_iter()
        .fold(Accumulators::new, |mut accumulators, point| {
            accumulate_track(&mut accumulators, reconstruction, point, settings);
            accumulators
        })
        .reduce(Accumulators::new, merge_accumulators);
    #[cfg(not(feature = "rayon"))]
    let accumulators = points
        .iter()
        .fold(Accumulators::new(), |mut accumulators, point| {
            accumulate_track(&mut accumulators, reconstruction, point, settings);
            accumulators
        });

    let mut table = ScoreTable::new(reconstruction.image_ids());
    let covisible = accumulators.len();
    let mut unsupported = 0;
    for (pair, accumulator) in accumulators {
        let score = match settings.policy {
            ScoringPolicy::AngleFilteredCount => count_score(accumulator, settings),
            ScoringPolicy::ContinuousKernel => accumulator.kernel,
        };
        if score == 0.0 {
            unsupported += 1;
        }
        let i = table.index(pair.first());
        let j = table.index(pair.second());
        if let (Some(i), Some(j)) = (i, j) {
            table.scores[(i, j)] = score;
            table.scores[(j, i)] = score;
        }
    }
    info!(
        "scored {} co-visible view pairs from {} tracks over {} views",
        covisible,
        points.len(),
        table.len()
    );
    if unsupported != 0 {
        debug!(
            "{} co-visible view pairs scored zero for lack of track support",
            unsupported
        );
    }
    table
}
