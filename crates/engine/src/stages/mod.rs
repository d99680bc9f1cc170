//! Concrete pipeline stages: motion correction, stack building, alignment.

mod align;
mod motioncorr;
mod stack;

pub use align::AlignStage;
pub use motioncorr::MotionCorrStage;
pub use stack::StackStage;

use std::path::{Path, PathBuf};
use tomopipe_core::{SeriesId, SystemConfig};

/// Per-series working directory: `<output_path>/<rootname>_<NN><suffix>/`.
pub(crate) fn series_dir(system: &SystemConfig, series: SeriesId) -> PathBuf {
    system.output_path.join(format!(
        "{}_{:02}{}",
        system.output_rootname,
        series.value(),
        system.output_suffix
    ))
}

/// Basename shared by a series' stack, tilt file and aligned output.
pub(crate) fn series_basename(system: &SystemConfig, series: SeriesId) -> String {
    format!(
        "{}_{:02}{}",
        system.output_rootname,
        series.value(),
        system.output_suffix
    )
}

/// Motion-corrected frame path for one image:
/// `<folder>/<rootname>_<NNN>_<angle>.mrc`.
pub(crate) fn frame_path(folder: &Path, rootname: &str, series: SeriesId, angle: f64) -> PathBuf {
    folder.join(format!("{}_{:03}_{:.1}.mrc", rootname, series.value(), angle))
}
