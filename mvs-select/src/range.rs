use crate::{rank_neighbors, Error, ScoreTable, ViewSelectionSettings};
use log::*;
use mvs_reconstruction::nalgebra::{Matrix3, Point2, Vector2, Vector3};
use mvs_reconstruction::{Camera, Image, ImageId, Reconstruction};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A closed interval `[min, max]`, empty when `min > max`.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self::new(f64::INFINITY, f64::NEG_INFINITY)
    }

    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// `[0, ∞]`
    pub fn non_negative() -> Self {
        Self::new(0.0, f64::INFINITY)
    }

    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    #[must_use]
    pub fn at_least(self, min: f64) -> Self {
        Self {
            min: self.min.max(min),
            ..self
        }
    }

    #[must_use]
    pub fn at_most(self, max: f64) -> Self {
        Self {
            max: self.max.min(max),
            ..self
        }
    }

    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        self.at_least(other.min).at_most(other.max)
    }
}

/// The relative pose of a reference and neighbor view made the geometry of a pixel
/// too degenerate to bound.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("degenerate geometry")]
pub struct DegenerateGeometry;

/// The admissible search ranges of one reference pixel against one neighbor.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRange {
    /// Distances along the unit reference ray whose points are seen inside the neighbor.
    pub depth: Interval,
    /// Distances along the epipolar direction in the neighbor's normalized image plane,
    /// measured from where the ray vanishes at infinite depth.
    pub disparity: Interval,
}

/// Values of `t` for which `origin + t ⋅ direction` lies within `[min, max]`.
fn slab(origin: f64, direction: f64, min: f64, max: f64) -> Interval {
    if direction > 0.0 {
        Interval::new((min - origin) / direction, (max - origin) / direction)
    } else if direction < 0.0 {
        Interval::new((max - origin) / direction, (min - origin) / direction)
    } else if min <= origin && origin <= max {
        Interval::unbounded()
    } else {
        Interval::empty()
    }
}

/// The pose of a neighbor view relative to a reference view, along with the extent of the
/// neighbor's image on its virtual image plane.
///
/// A point at depth `d` along the unit reference ray `r` lands at `d ⋅ R⋅r + T` in the
/// neighbor's camera space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeGeometry {
    /// `R = R_neighbor ⋅ R_referenceᵀ`
    pub rotation: Matrix3<f64>,
    /// `T = t_neighbor - R ⋅ t_reference`
    pub translation: Vector3<f64>,
    pub min_bound: Vector2<f64>,
    pub max_bound: Vector2<f64>,
}

impl RelativeGeometry {
    pub fn new(reference: &Image, neighbor: &Image, neighbor_camera: &Camera) -> Self {
        let rotation = neighbor.rotation_matrix() * reference.rotation_matrix().transpose();
        let translation = neighbor.translation - rotation * reference.translation;
        let (a, b) = (neighbor_camera.min_bound(), neighbor_camera.max_bound());
        Self {
            rotation,
            translation,
            min_bound: a.inf(&b),
            max_bound: a.sup(&b),
        }
    }

    fn source(&self, ray: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * ray.normalize()
    }

    /// Depths along `ray` (in reference camera space) at which the point is in front of the
    /// neighbor and inside its image.
    pub fn depth_range(&self, ray: &Vector3<f64>) -> Result<Interval, DegenerateGeometry> {
        let source = self.source(ray);
        let t = self.translation;
        let mut depth = Interval::non_negative();
        for axis in 0..2 {
            let bounds = [(self.min_bound[axis], true), (self.max_bound[axis], false)];
            for (bound, lower) in bounds {
                // The neighbor coordinate on this axis crosses `bound` at `limit`.
                let denominator = source[axis] - bound * source.z;
                if denominator == 0.0 {
                    return Err(DegenerateGeometry);
                }
                let limit = (bound * t.z - t[axis]) / denominator;
                depth = if lower == (denominator > 0.0) {
                    depth.at_least(limit)
                } else {
                    depth.at_most(limit)
                };
            }
        }

        // In front of the neighbor: d ⋅ source.z + t.z > 0
        if source.z > 0.0 {
            depth = depth.at_least(-t.z / source.z);
        } else if source.z < 0.0 {
            depth = depth.at_most(-t.z / source.z);
        } else if t.z <= 0.0 {
            depth = Interval::empty();
        }
        Ok(depth)
    }

    /// Disparities along the epipolar line of `ray` that stay inside the neighbor image and
    /// correspond to non-negative depths.
    pub fn disparity_range(&self, ray: &Vector3<f64>) -> Result<Interval, DegenerateGeometry> {
        let source = self.source(ray);
        let t = self.translation;
        if source.z == 0.0 {
            return Err(DegenerateGeometry);
        }
        let projection = source.xy() / source.z;
        // Proportional to the epipole minus the projection, and stays finite for epipoles at infinity.
        let epipolar = t.xy() * source.z - source.xy() * t.z;
        let norm = epipolar.norm();
        if norm == 0.0 {
            return Err(DegenerateGeometry);
        }
        if source.z < 0.0 && t.z <= 0.0 {
            return Ok(Interval::empty());
        }
        let direction = epipolar * source.z.signum() / norm;

        let mut disparity = slab(
            projection.x,
            direction.x,
            self.min_bound.x,
            self.max_bound.x,
        )
        .intersect(slab(
            projection.y,
            direction.y,
            self.min_bound.y,
            self.max_bound.y,
        ))
        .at_least(0.0);

        // Depth zero sits at the epipole.
        if t.z > 0.0 {
            let epipole_distance = norm / (source.z.abs() * t.z);
            disparity = if source.z > 0.0 {
                disparity.at_most(epipole_distance)
            } else {
                disparity.at_least(epipole_distance)
            };
        }
        Ok(disparity)
    }

    /// The disparity of the point at `depth` along `ray`, or `None` if it is not in front of
    /// the neighbor.
    pub fn disparity_at_depth(&self, ray: &Vector3<f64>, depth: f64) -> Option<f64> {
        let source = self.source(ray);
        let t = self.translation;
        let denominator = depth * source.z + t.z;
        if source.z == 0.0 || !(denominator > 0.0) {
            return None;
        }
        let epipolar = t.xy() * source.z - source.xy() * t.z;
        Some(epipolar.norm() / (source.z.abs() * denominator))
    }

    /// Both ranges of a ray.
    ///
    /// The pixel is degenerate as a whole if either range is. A ray through the epipole has a
    /// well defined [`RelativeGeometry::depth_range`] but no epipolar direction, so it is
    /// reported as [`DegenerateGeometry`] and its depth range is dropped with it.
    pub fn pixel_range(&self, ray: &Vector3<f64>) -> Result<PixelRange, DegenerateGeometry> {
        Ok(PixelRange {
            depth: self.depth_range(ray)?,
            disparity: self.disparity_range(ray)?,
        })
    }
}

/// The pixel grid of a reference view that ranges are computed on.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeGrid {
    pub width: u32,
    pub height: u32,
    /// Grid resolution relative to the full image, at most `1.0`.
    pub scale: f64,
}

impl RangeGrid {
    pub fn new(camera: &Camera, settings: &ViewSelectionSettings) -> Self {
        let mut scale = 1.0f64;
        if let Some(max_width) = settings.max_width {
            scale = scale.min(max_width.max(1) as f64 / camera.width as f64);
        }
        if let Some(max_height) = settings.max_height {
            scale = scale.min(max_height.max(1) as f64 / camera.height as f64);
        }
        Self {
            width: ((camera.width as f64 * scale).round() as u32).max(1),
            height: ((camera.height as f64 * scale).round() as u32).max(1),
            scale,
        }
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The full resolution pixel at the center of grid cell `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Point2<f64> {
        Point2::new(
            (x as f64 + 0.5) / self.scale,
            (y as f64 + 0.5) / self.scale,
        )
    }
}

/// Per-pixel ranges of a reference view against one neighbor, in row-major order.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RangeMap {
    pub reference: ImageId,
    pub neighbor: ImageId,
    pub grid: RangeGrid,
    ranges: Vec<Result<PixelRange, DegenerateGeometry>>,
}

impl RangeMap {
    pub fn get(&self, x: u32, y: u32) -> Option<Result<PixelRange, DegenerateGeometry>> {
        if x >= self.grid.width || y >= self.grid.height {
            return None;
        }
        self.ranges
            .get(y as usize * self.grid.width as usize + x as usize)
            .copied()
    }

    /// Iterates over `(x, y, range)`.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (u32, u32, Result<PixelRange, DegenerateGeometry>)> + '_ {
        let width = self.grid.width as usize;
        self.ranges
            .iter()
            .enumerate()
            .map(move |(ix, &range)| ((ix % width) as u32, (ix / width) as u32, range))
    }

    /// Number of pixels whose geometry was degenerate.
    pub fn degenerate(&self) -> usize {
        self.ranges.iter().filter(|range| range.is_err()).count()
    }

    /// Number of pixels that cannot be seen by the neighbor at any depth.
    pub fn invisible(&self) -> usize {
        self.ranges
            .iter()
            .filter(|range| matches!(range, Ok(range) if range.depth.is_empty()))
            .count()
    }
}

/// Computes the depth and disparity range of every pixel of `reference` against `neighbor`.
///
/// Only unknown images are errors. Pixels with degenerate geometry keep
/// [`DegenerateGeometry`] as their entry and do not affect the rest of the map.
pub fn compute_ranges(
    reconstruction: &Reconstruction,
    reference: ImageId,
    neighbor: ImageId,
    settings: &ViewSelectionSettings,
) -> Result<RangeMap, Error> {
    let reference_image = reconstruction
        .image(reference)
        .ok_or(Error::UnknownImage(reference))?;
    let reference_camera = reconstruction
        .camera_of(reference)
        .ok_or(Error::UnknownImage(reference))?;
    let neighbor_image = reconstruction
        .image(neighbor)
        .ok_or(Error::UnknownImage(neighbor))?;
    let neighbor_camera = reconstruction
        .camera_of(neighbor)
        .ok_or(Error::UnknownImage(neighbor))?;

    let geometry = RelativeGeometry::new(reference_image, neighbor_image, neighbor_camera);
    let grid = RangeGrid::new(reference_camera, settings);
    let width = grid.width as usize;
    let range = |ix: usize| {
        let pixel = grid.pixel((ix % width) as u32, (ix / width) as u32);
        geometry.pixel_range(&reference_camera.unproject(&pixel))
    };

    #[cfg(feature = "rayon")]
    let ranges = (0..grid.len()).into_par_iter().map(range).collect();
    #[cfg(not(feature = "rayon"))]
    let ranges = (0..grid.len()).map(range).collect();

    let map = RangeMap {
        reference,
        neighbor,
        grid,
        ranges,
    };
    let degenerate = map.degenerate();
    if degenerate != 0 {
        warn!(
            "{} of {} pixels of image {} have degenerate geometry against image {}",
            degenerate,
            grid.len(),
            reference,
            neighbor
        );
    }
    debug!(
        "computed {}x{} ranges of image {} against image {}, {} pixels not visible",
        grid.width,
        grid.height,
        reference,
        neighbor,
        map.invisible()
    );
    Ok(map)
}

/// Computes the range maps of `reference` against its best neighbors in `table`.
pub fn compute_neighbor_ranges(
    reconstruction: &Reconstruction,
    table: &ScoreTable,
    reference: ImageId,
    settings: &ViewSelectionSettings,
) -> Result<Vec<RangeMap>, Error> {
    rank_neighbors(table, reference, settings.neighbors)?
        .into_iter()
        .map(|neighbor| compute_ranges(reconstruction, reference, neighbor, settings))
        .collect()
}
