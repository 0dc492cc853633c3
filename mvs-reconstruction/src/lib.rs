//! The sparse reconstruction consumed by view selection: calibrated [`Camera`]s, posed
//! [`Image`]s with their 2D features, and [`Point3D`] tracks linking the two.
//!
//! A [`Reconstruction`] is checked once when it is built. Every image must refer to a known
//! camera and every track observation must agree with the feature table of the image it points
//! to, in both directions. After that nothing is mutated, so the scorer and range computer can
//! borrow it from many threads at once.

mod statistics;

pub use statistics::*;

pub use mvs_camera::{self, nalgebra, Camera, CameraId, CameraModel, Projection};

use derive_more::{Display, From, Into};
use log::*;
use mvs_camera::nalgebra::{Isometry3, Matrix3, Point2, Point3, Translation3, UnitQuaternion, Vector3};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The ways a reconstruction can fail to be self-consistent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedReconstruction {
    #[error("camera {0} appears more than once")]
    DuplicateCamera(CameraId),
    #[error("image {0} appears more than once")]
    DuplicateImage(ImageId),
    #[error("point {0} appears more than once")]
    DuplicatePoint(Point3DId),
    #[error("image {image} refers to unknown camera {camera}")]
    UnknownCamera { image: ImageId, camera: CameraId },
    #[error("image {image} has {features} features but {point3d_ids} point ids")]
    FeatureCountMismatch {
        image: ImageId,
        features: usize,
        point3d_ids: usize,
    },
    #[error("point {point} is observed by unknown image {image}")]
    UnknownTrackImage { point: Point3DId, image: ImageId },
    #[error("point {point} refers to feature {feature} of image {image} which does not exist")]
    FeatureOutOfRange {
        point: Point3DId,
        image: ImageId,
        feature: usize,
    },
    #[error("point {point} lists feature {feature} of image {image}, which maps to {actual:?}")]
    InconsistentTrack {
        point: Point3DId,
        image: ImageId,
        feature: usize,
        actual: Option<Point3DId>,
    },
    #[error("feature {feature} of image {image} maps to point {point}, which does not list it")]
    DanglingFeature {
        image: ImageId,
        feature: usize,
        point: Point3DId,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("malformed reconstruction: {0}")]
    MalformedReconstruction(#[from] MalformedReconstruction),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies an image (view) within a reconstruction.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ImageId(pub u32);

/// Identifies a triangulated point within a reconstruction.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Point3DId(pub u64);

/// A registered image.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Image {
    pub id: ImageId,
    pub camera: CameraId,
    pub name: String,
    /// Rotation from world to camera space.
    pub rotation: UnitQuaternion<f64>,
    /// Translation from world to camera space, applied after `rotation`.
    pub translation: Vector3<f64>,
    /// Observed keypoints in pixel coordinates.
    pub features: Vec<Point2<f64>>,
    /// For each entry of `features`, the point it was triangulated into.
    pub point3d_ids: Vec<Option<Point3DId>>,
}

impl Image {
    /// World to camera transform.
    pub fn pose(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.rotation.to_rotation_matrix().matrix()
    }

    /// The optical center in world space, `-Rᵀ⋅t`.
    pub fn center(&self) -> Point3<f64> {
        Point3::from(-(self.rotation.inverse() * self.translation))
    }

    /// Transforms a world point into this image's camera space.
    pub fn to_camera(&self, point: &Point3<f64>) -> Point3<f64> {
        self.pose().transform_point(point)
    }

    /// Iterates over `(feature index, point id)` for every triangulated feature.
    pub fn observations(&self) -> impl Iterator<Item = (usize, Point3DId)> + '_ {
        self.point3d_ids
            .iter()
            .enumerate()
            .filter_map(|(feature, id)| id.map(|id| (feature, id)))
    }
}

/// One observation of a [`Point3D`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct TrackElement {
    pub image: ImageId,
    /// Index into [`Image::features`].
    pub feature: usize,
}

/// A triangulated point and the features it was triangulated from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Point3D {
    pub id: Point3DId,
    pub xyz: Point3<f64>,
    pub track: Vec<TrackElement>,
}

/// The unvalidated contents of a [`Reconstruction`], as stored on disk.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ReconstructionSnapshot {
    pub cameras: Vec<Camera>,
    pub images: Vec<Image>,
    pub points: Vec<Point3D>,
}

/// A validated, immutable sparse reconstruction.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(Serialize, Deserialize),
    serde(try_from = "ReconstructionSnapshot", into = "ReconstructionSnapshot")
)]
pub struct Reconstruction {
    cameras: BTreeMap<CameraId, Camera>,
    images: BTreeMap<ImageId, Image>,
    points: BTreeMap<Point3DId, Point3D>,
    centers: BTreeMap<ImageId, Point3<f64>>,
}

impl Reconstruction {
    /// Builds a reconstruction, checking that all ids resolve and that tracks and feature
    /// tables agree with each other.
    pub fn new(
        cameras: impl IntoIterator<Item = Camera>,
        images: impl IntoIterator<Item = Image>,
        points: impl IntoIterator<Item = Point3D>,
    ) -> Result<Self> {
        let reconstruction = Self::collect(cameras, images, points)
            .and_then(|reconstruction| reconstruction.validate().map(|()| reconstruction));
        match reconstruction {
            Ok(reconstruction) => {
                debug!(
                    "loaded reconstruction with {} cameras, {} images and {} points",
                    reconstruction.cameras.len(),
                    reconstruction.images.len(),
                    reconstruction.points.len()
                );
                Ok(reconstruction)
            }
            Err(e) => {
                error!("rejected reconstruction: {}", e);
                Err(e.into())
            }
        }
    }

    fn collect(
        cameras: impl IntoIterator<Item = Camera>,
        images: impl IntoIterator<Item = Image>,
        points: impl IntoIterator<Item = Point3D>,
    ) -> std::result::Result<Self, MalformedReconstruction> {
        let mut reconstruction = Self {
            cameras: BTreeMap::new(),
            images: BTreeMap::new(),
            points: BTreeMap::new(),
            centers: BTreeMap::new(),
        };
        for camera in cameras {
            match reconstruction.cameras.entry(camera.id) {
                Entry::Vacant(entry) => {
                    entry.insert(camera);
                }
                Entry::Occupied(entry) => {
                    return Err(MalformedReconstruction::DuplicateCamera(*entry.key()))
                }
            }
        }
        for image in images {
            match reconstruction.images.entry(image.id) {
                Entry::Vacant(entry) => {
                    reconstruction.centers.insert(image.id, image.center());
                    entry.insert(image);
                }
                Entry::Occupied(entry) => {
                    return Err(MalformedReconstruction::DuplicateImage(*entry.key()))
                }
            }
        }
        for point in points {
            match reconstruction.points.entry(point.id) {
                Entry::Vacant(entry) => {
                    entry.insert(point);
                }
                Entry::Occupied(entry) => {
                    return Err(MalformedReconstruction::DuplicatePoint(*entry.key()))
                }
            }
        }
        Ok(reconstruction)
    }

    fn validate(&self) -> std::result::Result<(), MalformedReconstruction> {
        for image in self.images.values() {
            if !self.cameras.contains_key(&image.camera) {
                return Err(MalformedReconstruction::UnknownCamera {
                    image: image.id,
                    camera: image.camera,
                });
            }
            if image.features.len() != image.point3d_ids.len() {
                return Err(MalformedReconstruction::FeatureCountMismatch {
                    image: image.id,
                    features: image.features.len(),
                    point3d_ids: image.point3d_ids.len(),
                });
            }
        }

        // Every track observation must point back at its track.
        for point in self.points.values() {
            for &TrackElement { image, feature } in &point.track {
                let view = self
                    .images
                    .get(&image)
                    .ok_or(MalformedReconstruction::UnknownTrackImage {
                        point: point.id,
                        image,
                    })?;
                let actual = *view.point3d_ids.get(feature).ok_or(
                    MalformedReconstruction::FeatureOutOfRange {
                        point: point.id,
                        image,
                        feature,
                    },
                )?;
                if actual != Some(point.id) {
                    return Err(MalformedReconstruction::InconsistentTrack {
                        point: point.id,
                        image,
                        feature,
                        actual,
                    });
                }
            }
        }

        // Every triangulated feature must be listed in its track.
        for image in self.images.values() {
            for (feature, id) in image.observations() {
                let listed = self.points.get(&id).map_or(false, |point| {
                    point.track.contains(&TrackElement {
                        image: image.id,
                        feature,
                    })
                });
                if !listed {
                    return Err(MalformedReconstruction::DanglingFeature {
                        image: image.id,
                        feature,
                        point: id,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(&id)
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn point(&self, id: Point3DId) -> Option<&Point3D> {
        self.points.get(&id)
    }

    /// The camera an image was taken with.
    pub fn camera_of(&self, image: ImageId) -> Option<&Camera> {
        self.image(image).and_then(|image| self.camera(image.camera))
    }

    /// The cached optical center of an image.
    pub fn center(&self, image: ImageId) -> Option<Point3<f64>> {
        self.centers.get(&image).copied()
    }

    pub fn cameras(&self) -> impl Iterator<Item = &Camera> + '_ {
        self.cameras.values()
    }

    /// Images in ascending id order.
    pub fn images(&self) -> impl Iterator<Item = &Image> + '_ {
        self.images.values()
    }

    pub fn image_ids(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.images.keys().copied()
    }

    pub fn points(&self) -> impl Iterator<Item = &Point3D> + '_ {
        self.points.values()
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

impl TryFrom<ReconstructionSnapshot> for Reconstruction {
    type Error = Error;

    fn try_from(snapshot: ReconstructionSnapshot) -> Result<Self> {
        Self::new(snapshot.cameras, snapshot.images, snapshot.points)
    }
}

impl From<Reconstruction> for ReconstructionSnapshot {
    fn from(reconstruction: Reconstruction) -> Self {
        Self {
            cameras: reconstruction.cameras.into_values().collect(),
            images: reconstruction.images.into_values().collect(),
            points: reconstruction.points.into_values().collect(),
        }
    }
}
