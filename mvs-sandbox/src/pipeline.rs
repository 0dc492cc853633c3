//! Planning for the external sfm → mvs → fuse pipeline.
//!
//! Nothing here runs a backend. A [`PipelinePlan`] names the workspace directory of every
//! stage, checks that the chosen backends can be chained, and decides which stages have to
//! run again.

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown backend {0:?}")]
    UnknownBackend(String),
    #[error("no converter from {from} to {to}")]
    UnsupportedConversion { from: &'static str, to: &'static str },
}

macro_rules! backend {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = PipelineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|backend| backend.name() == s)
                    .ok_or_else(|| PipelineError::UnknownBackend(s.to_owned()))
            }
        }
    };
}

backend! {
    /// Structure from motion backends.
    SfmBackend {
        Colmap => "colmap",
        OpenMvg => "openmvg",
        TheiaSfm => "theiasfm",
        Mve => "mve",
    }
}

backend! {
    /// Multi-view stereo backends. Fusion uses the same set.
    MvsBackend {
        Colmap => "colmap",
        OpenMvs => "openmvs",
        Pmvs => "pmvs",
        Cmvs => "cmvs",
        Mve => "mve",
        MvsNet => "mvsnet",
        RMvsNet => "rmvsnet",
        PointMvsNet => "pointmvsnet",
    }
}

/// A converter from a sparse reconstruction to the input of an mvs backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SfmConversion {
    pub from: SfmBackend,
    pub to: MvsBackend,
}

/// A converter from mvs depth maps to the input of a fusion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MvsConversion {
    pub from: MvsBackend,
    pub to: MvsBackend,
}

impl fmt::Display for SfmConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sfm_{}2{}", self.from, self.to)
    }
}

impl fmt::Display for MvsConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mvs_{}2{}", self.from, self.to)
    }
}

/// The converter between an sfm and an mvs backend, if one exists.
///
/// The learned mvs backends only read colmap reconstructions.
pub fn sfm_conversion(from: SfmBackend, to: MvsBackend) -> Option<SfmConversion> {
    use MvsBackend::*;
    let supported = match to {
        Colmap | OpenMvs | Pmvs | Mve => true,
        MvsNet | RMvsNet | PointMvsNet => from == SfmBackend::Colmap,
        Cmvs => false,
    };
    supported.then(|| SfmConversion { from, to })
}

/// The converter between an mvs and a fusion backend, if one exists.
pub fn mvs_conversion(from: MvsBackend, to: MvsBackend) -> Option<MvsConversion> {
    use MvsBackend::*;
    let supported = matches!(
        (from, to),
        (Colmap, Colmap) | (MvsNet, MvsNet) | (PointMvsNet, PointMvsNet)
    );
    supported.then(|| MvsConversion { from, to })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Sfm,
    Mvs,
    Fuse,
}

/// The file written into a stage directory once the stage finished.
pub const DONE_MARKER: &str = "DONE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub workspace: PathBuf,
    pub sfm: SfmBackend,
    pub mvs: SfmConversion,
    pub fuse: MvsConversion,
    /// Only run stages that have not completed instead of also rerunning everything after a
    /// stage that ran.
    pub auto_rerun: bool,
}

impl PipelinePlan {
    pub fn new(
        workspace: impl Into<PathBuf>,
        sfm: SfmBackend,
        mvs: MvsBackend,
        fuse: MvsBackend,
        auto_rerun: bool,
    ) -> Result<Self, PipelineError> {
        let mvs = sfm_conversion(sfm, mvs).ok_or(PipelineError::UnsupportedConversion {
            from: sfm.name(),
            to: mvs.name(),
        })?;
        let fuse = mvs_conversion(mvs.to, fuse).ok_or(PipelineError::UnsupportedConversion {
            from: mvs.to.name(),
            to: fuse.name(),
        })?;
        Ok(Self {
            workspace: workspace.into(),
            sfm,
            mvs,
            fuse,
            auto_rerun,
        })
    }

    pub fn stage_name(&self, stage: Stage) -> String {
        match stage {
            Stage::Sfm => format!("sfm_{}", self.sfm),
            Stage::Mvs => format!("mvs_{}2{}", self.sfm, self.mvs.to),
            Stage::Fuse => format!("fuse_{}2{}2{}", self.sfm, self.mvs.to, self.fuse.to),
        }
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.workspace.join(self.stage_name(stage))
    }

    pub fn done_marker(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(DONE_MARKER)
    }

    /// The stages that have to run, in order, given which ones already completed.
    pub fn schedule(&self, mut completed: impl FnMut(Stage) -> bool) -> Vec<Stage> {
        let mut scheduled = vec![];
        let mut upstream_ran = false;
        for stage in [Stage::Sfm, Stage::Mvs, Stage::Fuse] {
            let forced = stage != Stage::Sfm && upstream_ran && !self.auto_rerun;
            if forced || !completed(stage) {
                scheduled.push(stage);
                upstream_ran = true;
            }
        }
        scheduled
    }

    /// [`PipelinePlan::schedule`] against the `DONE` markers on disk.
    pub fn schedule_on_disk(&self) -> Vec<Stage> {
        self.schedule(|stage| self.done_marker(stage).is_file())
    }
}
