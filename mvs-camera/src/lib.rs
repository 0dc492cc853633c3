//! Camera models used by multi-view stereo view selection.
//!
//! A [`Camera`] pairs a [`Projection`] with the image size it was calibrated at. The projection
//! maps points in camera space to pixels, applying radial or full OpenCV distortion where the
//! model has it. The reverse direction uses only the inverse intrinsic matrix: distortion is
//! never inverted, which is how the depth and disparity ranges of a view are defined.

mod distortion;
mod model;

pub use distortion::*;
pub use model::*;

pub use nalgebra;

use derive_more::{Display, From, Into};
use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3, Vector4};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Errors produced while constructing cameras.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid camera model {0:?}")]
    InvalidCameraModel(String),
    #[error("camera model {model} expects {expected} parameters but {actual} were given")]
    InvalidCameraParameters {
        model: ModelKind,
        expected: usize,
        actual: usize,
    },
    #[error("camera intrinsics are not invertible")]
    SingularIntrinsics,
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies a camera within a reconstruction.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraId(pub u32);

/// The intrinsic projection of a camera.
///
/// All variants share the same pixel convention: normalized coordinates `(x, y) = (X/Z, Y/Z)`
/// are distorted and then scaled by the focal lengths and shifted by the principal point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum Projection {
    /// Ideal pinhole camera.
    Pinhole {
        focals: Vector2<f64>,
        principal_point: Point2<f64>,
    },
    /// Single focal length with the radial factor `1 + k1⋅r² + k2⋅r⁴`.
    Radial {
        focal: f64,
        principal_point: Point2<f64>,
        radial: Polynomial<3>,
    },
    /// OpenCV rational radial model `(1 + k1⋅r² + k2⋅r⁴ + k3⋅r⁶) / (1 + k4⋅r² + k5⋅r⁴ + k6⋅r⁶)`
    /// together with the tangential terms `p1` and `p2`.
    FullOpenCv {
        focals: Vector2<f64>,
        principal_point: Point2<f64>,
        radial: Rational<4, 4>,
        tangential: Vector2<f64>,
    },
}

impl Projection {
    /// Creates a projection from a model and its parameters in the order used by COLMAP
    /// `cameras.txt` files.
    ///
    /// ```
    /// use mvs_camera::{ModelKind, Projection};
    /// let projection = Projection::from_parameters(ModelKind::SimpleRadial, &[500.0, 320.0, 240.0, 0.1]).unwrap();
    /// assert_eq!(projection.model(), ModelKind::Radial);
    /// assert_eq!(projection.parameters(), vec![500.0, 320.0, 240.0, 0.1, 0.0]);
    /// ```
    pub fn from_parameters(model: ModelKind, params: &[f64]) -> Result<Self> {
        if params.len() != model.num_parameters() {
            return Err(Error::InvalidCameraParameters {
                model,
                expected: model.num_parameters(),
                actual: params.len(),
            });
        }
        let projection = match model {
            ModelKind::SimplePinhole => Self::Pinhole {
                focals: Vector2::new(params[0], params[0]),
                principal_point: Point2::new(params[1], params[2]),
            },
            ModelKind::Pinhole => Self::Pinhole {
                focals: Vector2::new(params[0], params[1]),
                principal_point: Point2::new(params[2], params[3]),
            },
            ModelKind::SimpleRadial | ModelKind::Radial => Self::Radial {
                focal: params[0],
                principal_point: Point2::new(params[1], params[2]),
                radial: Polynomial(Vector3::new(
                    1.0,
                    params[3],
                    params.get(4).copied().unwrap_or(0.0),
                )),
            },
            ModelKind::FullOpenCv => Self::FullOpenCv {
                focals: Vector2::new(params[0], params[1]),
                principal_point: Point2::new(params[2], params[3]),
                radial: Rational(
                    Polynomial(Vector4::new(1.0, params[4], params[5], params[8])),
                    Polynomial(Vector4::new(1.0, params[9], params[10], params[11])),
                ),
                tangential: Vector2::new(params[6], params[7]),
            },
        };
        Ok(projection)
    }

    /// The most specific model that stores this projection without loss.
    pub fn model(&self) -> ModelKind {
        match self {
            Self::Pinhole { .. } => ModelKind::Pinhole,
            Self::Radial { .. } => ModelKind::Radial,
            Self::FullOpenCv { .. } => ModelKind::FullOpenCv,
        }
    }

    /// The parameters of [`Projection::model`], inverse of [`Projection::from_parameters`].
    pub fn parameters(&self) -> Vec<f64> {
        match *self {
            Self::Pinhole {
                focals,
                principal_point,
            } => vec![focals.x, focals.y, principal_point.x, principal_point.y],
            Self::Radial {
                focal,
                principal_point,
                radial,
            } => vec![
                focal,
                principal_point.x,
                principal_point.y,
                radial.0[1],
                radial.0[2],
            ],
            Self::FullOpenCv {
                focals,
                principal_point,
                radial,
                tangential,
            } => {
                let p = radial.numerator().coefficients();
                let q = radial.denominator().coefficients();
                vec![
                    focals.x,
                    focals.y,
                    principal_point.x,
                    principal_point.y,
                    p[1],
                    p[2],
                    tangential.x,
                    tangential.y,
                    p[3],
                    q[1],
                    q[2],
                    q[3],
                ]
            }
        }
    }

    pub fn focals(&self) -> Vector2<f64> {
        match *self {
            Self::Pinhole { focals, .. } | Self::FullOpenCv { focals, .. } => focals,
            Self::Radial { focal, .. } => Vector2::new(focal, focal),
        }
    }

    pub fn principal_point(&self) -> Point2<f64> {
        match *self {
            Self::Pinhole {
                principal_point, ..
            }
            | Self::Radial {
                principal_point, ..
            }
            | Self::FullOpenCv {
                principal_point, ..
            } => principal_point,
        }
    }

    /// The intrinsic matrix `K` (no skew).
    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        let focals = self.focals();
        let principal_point = self.principal_point();
        Matrix3::new(
            focals.x,   0.0,        principal_point.x,
            0.0,        focals.y,   principal_point.y,
            0.0,        0.0,        1.0,
        )
    }

    /// Applies the lens distortion to a point on the virtual image plane at `z = 1`.
    pub fn distort(&self, normalized: Point2<f64>) -> Point2<f64> {
        let (x, y) = (normalized.x, normalized.y);
        let r2 = x * x + y * y;
        match *self {
            Self::Pinhole { .. } => normalized,
            Self::Radial { radial, .. } => normalized * radial.evaluate(r2),
            Self::FullOpenCv {
                radial, tangential, ..
            } => {
                let (p1, p2) = (tangential.x, tangential.y);
                let coefficient = radial.evaluate(r2);
                let xy = x * y;
                Point2::new(
                    x * coefficient + 2.0 * p1 * xy + p2 * (r2 + 2.0 * x * x),
                    y * coefficient + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * xy,
                )
            }
        }
    }

    /// Converts a distorted point on the virtual image plane into pixel coordinates.
    pub fn uncalibrate(&self, distorted: Point2<f64>) -> Point2<f64> {
        let focals = self.focals();
        self.principal_point() + distorted.coords.component_mul(&focals)
    }
}

/// A calibrated camera: projection model, image size and the derived quantities
/// used for ray casting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(Serialize, Deserialize),
    serde(try_from = "CameraModel", into = "CameraModel")
)]
pub struct Camera {
    pub id: CameraId,
    pub projection: Projection,
    pub width: u32,
    pub height: u32,
    inverse_intrinsics: Matrix3<f64>,
    min_bound: Vector2<f64>,
    max_bound: Vector2<f64>,
}

impl Camera {
    pub fn new(id: CameraId, projection: Projection, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize { width, height });
        }
        let inverse_intrinsics = projection
            .matrix()
            .try_inverse()
            .ok_or(Error::SingularIntrinsics)?;
        let min_bound = (inverse_intrinsics * Vector3::new(0.0, 0.0, 1.0)).xy();
        let max_bound = (inverse_intrinsics * Vector3::new(width as f64, height as f64, 1.0)).xy();
        Ok(Self {
            id,
            projection,
            width,
            height,
            inverse_intrinsics,
            min_bound,
            max_bound,
        })
    }

    /// Creates a camera from a COLMAP model name such as `"PINHOLE"` and its parameters.
    ///
    /// ```
    /// use mvs_camera::{Camera, CameraId, Error};
    /// let camera = Camera::from_model(CameraId(1), "SIMPLE_PINHOLE", &[500.0, 320.0, 240.0], 640, 480).unwrap();
    /// assert_eq!(camera.projection.focals().x, 500.0);
    /// assert_eq!(
    ///     Camera::from_model(CameraId(1), "THIN_PRISM_FISHEYE", &[], 640, 480),
    ///     Err(Error::InvalidCameraModel("THIN_PRISM_FISHEYE".to_owned())),
    /// );
    /// ```
    pub fn from_model(
        id: CameraId,
        model: &str,
        params: &[f64],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let model: ModelKind = model.parse()?;
        Self::new(id, Projection::from_parameters(model, params)?, width, height)
    }

    /// Projects a point in camera space into pixel coordinates.
    ///
    /// Returns `None` for points on the `z = 0` plane. Points behind the camera still project,
    /// so callers that care must check the sign of `z` themselves.
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        let normalized = Point2::from_homogeneous(point.coords)?;
        Some(
            self.projection
                .uncalibrate(self.projection.distort(normalized)),
        )
    }

    /// The unnormalized ray `K⁻¹ ⋅ (u, v, 1)` through a pixel.
    pub fn unproject(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        self.inverse_intrinsics * pixel.to_homogeneous()
    }

    pub fn inverse_intrinsics(&self) -> &Matrix3<f64> {
        &self.inverse_intrinsics
    }

    /// The image corner `(0, 0)` on the virtual image plane.
    pub fn min_bound(&self) -> Vector2<f64> {
        self.min_bound
    }

    /// The image corner `(width, height)` on the virtual image plane.
    pub fn max_bound(&self) -> Vector2<f64> {
        self.max_bound
    }
}
