use crate::{Camera, CameraId, Error, Projection};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The camera model names understood when loading a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// `f, cx, cy`
    SimplePinhole,
    /// `fx, fy, cx, cy`
    Pinhole,
    /// `f, cx, cy, k1`
    SimpleRadial,
    /// `f, cx, cy, k1, k2`
    Radial,
    /// `fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6`
    FullOpenCv,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::SimplePinhole,
        ModelKind::Pinhole,
        ModelKind::SimpleRadial,
        ModelKind::Radial,
        ModelKind::FullOpenCv,
    ];

    pub fn num_parameters(self) -> usize {
        match self {
            Self::SimplePinhole => 3,
            Self::Pinhole => 4,
            Self::SimpleRadial => 4,
            Self::Radial => 5,
            Self::FullOpenCv => 12,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SimplePinhole => "SIMPLE_PINHOLE",
            Self::Pinhole => "PINHOLE",
            Self::SimpleRadial => "SIMPLE_RADIAL",
            Self::Radial => "RADIAL",
            Self::FullOpenCv => "FULL_OPENCV",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|model| model.name() == s)
            .ok_or_else(|| Error::InvalidCameraModel(s.to_owned()))
    }
}

/// A camera record as it appears in a reconstruction snapshot: a model name, the image size
/// and the flat parameter list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraModel {
    pub id: CameraId,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub params: Vec<f64>,
}

impl TryFrom<CameraModel> for Camera {
    type Error = Error;

    fn try_from(record: CameraModel) -> Result<Self, Self::Error> {
        Camera::from_model(
            record.id,
            &record.model,
            &record.params,
            record.width,
            record.height,
        )
    }
}

impl From<Camera> for CameraModel {
    fn from(camera: Camera) -> Self {
        let Camera {
            id,
            projection,
            width,
            height,
            ..
        } = camera;
        Self {
            id,
            model: projection.model().name().to_owned(),
            width,
            height,
            params: projection.parameters(),
        }
    }
}

impl Projection {
    /// Creates a projection from a model name and its parameters.
    pub fn from_model(model: &str, params: &[f64]) -> Result<Self, Error> {
        Self::from_parameters(model.parse()?, params)
    }
}
