//! Neighbor view selection for multi-view stereo.
//!
//! Three steps run on a validated [`Reconstruction`](mvs_reconstruction::Reconstruction):
//!
//! 1. [`compute_covisibility`] scores every pair of views from the triangulation angles of the
//!    tracks they share, using the [`ScoringPolicy`] in [`ViewSelectionSettings`].
//! 2. [`rank_neighbors`] picks the best neighbors of a view from the resulting [`ScoreTable`].
//! 3. [`compute_ranges`] bounds, for every pixel of a reference view, the depths and epipolar
//!    disparities at which it can be matched against a neighbor.
//!
//! ```
//! use mvs_reconstruction::Reconstruction;
//! use mvs_select::{compute_covisibility, select_views, ViewSelectionSettings};
//!
//! let reconstruction = Reconstruction::new(vec![], vec![], vec![]).unwrap();
//! let settings = ViewSelectionSettings::default();
//! let table = compute_covisibility(&reconstruction, &settings);
//! assert!(select_views(&table, settings.neighbors).is_empty());
//! ```

mod covisibility;
mod range;
mod ranking;
mod settings;

pub use covisibility::*;
pub use range::*;
pub use ranking::*;
pub use settings::*;

use mvs_reconstruction::ImageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown image {0}")]
    UnknownImage(ImageId),
}
