//! Typed stage configuration.
//!
//! Each stage owns a configuration structure with named fields and an
//! explicit mapping to argument lists in `tomopipe-engine`; validation
//! happens at load time, not at command-construction time.

use crate::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Validation hook run right after deserialization.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Load a configuration file, failing with a `Configuration` error when the
/// file is absent or does not validate.
pub fn load_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("config file {} not readable: {e}", path.display()))
    })?;
    let config: T = serde_json::from_str(&raw).map_err(|e| {
        PipelineError::Configuration(format!("config file {} invalid: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Raw-input file type of the acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Tif,
    Mrc,
    Eer,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Tif => "tif",
            FileType::Mrc => "mrc",
            FileType::Eer => "eer",
        }
    }

    /// MotionCor2 input flag for this file type.
    pub fn input_flag(&self) -> &'static str {
        match self {
            FileType::Tif => "-InTiff",
            FileType::Mrc => "-InMrc",
            FileType::Eer => "-InEer",
        }
    }
}

/// Project-level configuration: where the raw data lives and how identity
/// fields are encoded in file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub source_folder: PathBuf,
    /// Filename prefix shared by every raw image.
    pub file_prefix: String,
    /// Position (after the prefix) of the underscore-separated field holding
    /// the series number.
    pub series_field: usize,
    /// Position of the field holding the image index within the series.
    pub index_field: usize,
    /// Position of the field holding the tilt angle.
    pub angle_field: usize,
    pub filetype: FileType,
}

impl Validate for ProjectConfig {
    fn validate(&self) -> Result<()> {
        if self.file_prefix.is_empty() {
            return Err(PipelineError::Configuration(
                "project config: file_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Per-stage system section: declared scope, output naming and the
/// concurrency multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Explicit series list for this run; `None` means all known.
    pub process_list: Option<Vec<u32>>,
    pub output_path: PathBuf,
    pub output_rootname: String,
    #[serde(default)]
    pub output_suffix: String,
    /// External jobs per free compute device.
    pub jobs_per_device: usize,
}

impl SystemConfig {
    fn validate(&self, stage: &str) -> Result<()> {
        if self.jobs_per_device == 0 {
            return Err(PipelineError::Configuration(format!(
                "{stage} config: jobs_per_device must be at least 1"
            )));
        }
        if self.output_rootname.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "{stage} config: output_rootname must not be empty"
            )));
        }
        Ok(())
    }
}

/// Motion-correction stage configuration (MotionCor2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionCorrConfig {
    pub system: SystemConfig,
    pub exec_path: PathBuf,
    pub filetype: FileType,
    /// `None` runs without a gain reference.
    pub gain_reference: Option<PathBuf>,
    pub pixel_size: f64,
    pub desired_pixel_size: f64,
    pub discard_frames_top: u32,
    pub discard_frames_bottom: u32,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub patch_size: [u32; 2],
    pub use_subgroups: bool,
    pub gpu_memory_usage: f64,
}

impl Validate for MotionCorrConfig {
    fn validate(&self) -> Result<()> {
        self.system.validate("motioncorr")?;
        if self.pixel_size <= 0.0 || self.desired_pixel_size <= 0.0 {
            return Err(PipelineError::Configuration(
                "motioncorr config: pixel sizes must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gpu_memory_usage) {
            return Err(PipelineError::Configuration(
                "motioncorr config: gpu_memory_usage must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Stack-building stage configuration (IMOD newstack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub system: SystemConfig,
    pub exec_path: PathBuf,
    /// Folder holding motion-corrected frames to stack.
    pub frames_path: PathBuf,
    /// Rootname the motion-correction stage used for its outputs.
    pub frames_rootname: String,
}

impl Validate for StackConfig {
    fn validate(&self) -> Result<()> {
        self.system.validate("stack")?;
        if self.frames_rootname.is_empty() {
            return Err(PipelineError::Configuration(
                "stack config: frames_rootname must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Option groups accepted by the fine-alignment solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOption {
    All,
    Group,
    One,
    Fixed,
}

/// Patch-tracking parameters for the alignment directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchTrackParams {
    pub size_of_patches: [u32; 2],
    pub num_of_patches: [u32; 2],
    pub limits_on_shift: [u32; 2],
    pub num_iterations: u32,
    pub adjust_tilt_angles: bool,
}

/// Fine-alignment parameters for the alignment directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineAlignParams {
    pub num_surfaces: u32,
    pub mag_option: GroupOption,
    pub tilt_option: GroupOption,
    pub rot_option: GroupOption,
    pub beam_tilt_option: GroupOption,
    pub use_robust_fitting: bool,
    pub weight_all_contours: bool,
}

/// Alignment stage configuration (IMOD batchruntomo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignConfig {
    pub system: SystemConfig,
    pub exec_path: PathBuf,
    /// Pixel size in nanometres.
    pub pixel_size: f64,
    pub rot_angle: f64,
    pub gold_size: f64,
    pub adoc_template: String,
    pub use_rawtlt: bool,
    pub delete_old_files: bool,
    pub remove_xrays: bool,
    pub coarse_bin_factor: u32,
    pub stack_bin_factor: u32,
    pub patch_track: PatchTrackParams,
    pub fine_align: FineAlignParams,
}

impl Validate for AlignConfig {
    fn validate(&self) -> Result<()> {
        self.system.validate("align")?;
        if self.pixel_size <= 0.0 {
            return Err(PipelineError::Configuration(
                "align config: pixel_size must be positive".into(),
            ));
        }
        // `one` only exists for the rotation solution.
        for (name, option) in [
            ("mag_option", self.fine_align.mag_option),
            ("tilt_option", self.fine_align.tilt_option),
            ("beam_tilt_option", self.fine_align.beam_tilt_option),
        ] {
            if option == GroupOption::One {
                return Err(PipelineError::Configuration(format!(
                    "align config: {name} does not accept 'one'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> SystemConfig {
        SystemConfig {
            process_list: None,
            output_path: PathBuf::from("./out/"),
            output_rootname: "sample".into(),
            output_suffix: String::new(),
            jobs_per_device: 2,
        }
    }

    fn motioncorr() -> MotionCorrConfig {
        MotionCorrConfig {
            system: system(),
            exec_path: PathBuf::from("MotionCor2"),
            filetype: FileType::Tif,
            gain_reference: None,
            pixel_size: 1.1,
            desired_pixel_size: 1.1,
            discard_frames_top: 0,
            discard_frames_bottom: 0,
            tolerance: 0.5,
            max_iterations: 10,
            patch_size: [5, 5],
            use_subgroups: true,
            gpu_memory_usage: 0.9,
        }
    }

    #[test]
    fn zero_jobs_per_device_is_rejected() {
        let mut config = motioncorr();
        config.system.jobs_per_device = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn gpu_memory_usage_must_be_a_fraction() {
        let mut config = motioncorr();
        config.gpu_memory_usage = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config::<MotionCorrConfig>(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn load_config_roundtrip_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mc.json");
        std::fs::write(&path, serde_json::to_string_pretty(&motioncorr()).unwrap()).unwrap();
        let loaded: MotionCorrConfig = load_config(&path).unwrap();
        assert_eq!(loaded.system.jobs_per_device, 2);

        let mut bad = motioncorr();
        bad.pixel_size = -1.0;
        std::fs::write(&path, serde_json::to_string_pretty(&bad).unwrap()).unwrap();
        assert!(load_config::<MotionCorrConfig>(&path).is_err());
    }

    #[test]
    fn one_is_only_valid_for_rotation() {
        let config = AlignConfig {
            system: system(),
            exec_path: PathBuf::from("batchruntomo"),
            pixel_size: 0.11,
            rot_angle: 86.0,
            gold_size: 0.0,
            adoc_template: "/usr/share/imod/SystemTemplate/cryoSample.adoc".into(),
            use_rawtlt: true,
            delete_old_files: false,
            remove_xrays: true,
            coarse_bin_factor: 4,
            stack_bin_factor: 8,
            patch_track: PatchTrackParams {
                size_of_patches: [300, 200],
                num_of_patches: [12, 8],
                limits_on_shift: [2, 2],
                num_iterations: 4,
                adjust_tilt_angles: true,
            },
            fine_align: FineAlignParams {
                num_surfaces: 1,
                mag_option: GroupOption::One,
                tilt_option: GroupOption::Fixed,
                rot_option: GroupOption::One,
                beam_tilt_option: GroupOption::Fixed,
                use_robust_fitting: true,
                weight_all_contours: true,
            },
        };
        assert!(config.validate().is_err());
    }
}
