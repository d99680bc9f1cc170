//! Alignment stage (IMOD batchruntomo, one invocation per series).

use std::fmt::Write as _;
use std::path::PathBuf;

use tomopipe_core::{
    AlignConfig, GroupOption, ItemKey, Result, Scope, SeriesId, WorkItem,
};
use tomopipe_resources::DeviceId;
use tomopipe_tools::ToolCommand;

use crate::stage::Stage;
use crate::stages::{series_basename, series_dir};

pub struct AlignStage {
    config: AlignConfig,
}

impl AlignStage {
    pub fn new(config: AlignConfig) -> Self {
        Self { config }
    }

    fn adoc_path(&self) -> PathBuf {
        self.config.system.output_path.join("align.adoc")
    }

    /// Render the batchruntomo directive file from the typed parameters.
    fn directive(&self) -> String {
        let fine = &self.config.fine_align;
        let patch = &self.config.patch_track;
        let mut adoc = String::new();

        let _ = writeln!(adoc, "setupset.currentStackExt = st");
        let _ = writeln!(adoc, "setupset.copyarg.stackext = st");
        let _ = writeln!(
            adoc,
            "setupset.copyarg.userawtlt = {}",
            flag(self.config.use_rawtlt)
        );
        let _ = writeln!(adoc, "setupset.copyarg.pixel = {}", self.config.pixel_size);
        let _ = writeln!(adoc, "setupset.copyarg.rotation = {}", self.config.rot_angle);
        let _ = writeln!(adoc, "setupset.copyarg.gold = {}", self.config.gold_size);
        let _ = writeln!(adoc, "setupset.systemTemplate = {}", self.config.adoc_template);
        let _ = writeln!(
            adoc,
            "runtime.Excludeviews.any.deleteOldFiles = {}",
            flag(self.config.delete_old_files)
        );
        let _ = writeln!(
            adoc,
            "runtime.Preprocessing.any.removeXrays = {}",
            flag(self.config.remove_xrays)
        );
        let _ = writeln!(
            adoc,
            "comparam.prenewst.newstack.BinByFactor = {}",
            self.config.coarse_bin_factor
        );
        let _ = writeln!(adoc, "runtime.Fiducials.any.trackingMethod = 1");
        let _ = writeln!(
            adoc,
            "comparam.xcorr_pt.tiltxcorr.SizeOfPatchesXandY = {}",
            pair(patch.size_of_patches)
        );
        let _ = writeln!(
            adoc,
            "comparam.xcorr_pt.tiltxcorr.NumberOfPatchesXandY = {}",
            pair(patch.num_of_patches)
        );
        let _ = writeln!(
            adoc,
            "comparam.xcorr_pt.tiltxcorr.ShiftLimitsXandY = {}",
            pair(patch.limits_on_shift)
        );
        let _ = writeln!(
            adoc,
            "comparam.xcorr_pt.tiltxcorr.IterateCorrelations = {}",
            patch.num_iterations
        );
        let _ = writeln!(
            adoc,
            "runtime.PatchTracking.any.adjustTiltAngles = {}",
            flag(patch.adjust_tilt_angles)
        );
        let _ = writeln!(adoc, "comparam.xcorr_pt.imodchopconts.LengthOfPieces = -1");
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.SurfacesToAnalyze = {}",
            fine.num_surfaces
        );
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.MagOption = {}",
            mag_code(fine.mag_option)
        );
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.TiltOption = {}",
            tilt_code(fine.tilt_option)
        );
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.RotOption = {}",
            rot_code(fine.rot_option)
        );
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.BeamTiltOption = {}",
            beam_tilt_code(fine.beam_tilt_option)
        );
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.RobustFitting = {}",
            flag(fine.use_robust_fitting)
        );
        let _ = writeln!(
            adoc,
            "comparam.align.tiltalign.WeightWholeTracks = {}",
            flag(fine.weight_all_contours)
        );
        let _ = writeln!(
            adoc,
            "runtime.AlignedStack.any.binByFactor = {}",
            self.config.stack_bin_factor
        );
        adoc
    }
}

fn flag(value: bool) -> u8 {
    if value {
        1
    } else {
        0
    }
}

fn pair(values: [u32; 2]) -> String {
    format!("{},{}", values[0], values[1])
}

// tiltalign solution codes differ per parameter.
fn mag_code(option: GroupOption) -> i32 {
    match option {
        GroupOption::All => 1,
        GroupOption::Group => 3,
        GroupOption::One | GroupOption::Fixed => 0,
    }
}

fn tilt_code(option: GroupOption) -> i32 {
    match option {
        GroupOption::All => 1,
        GroupOption::Group => 5,
        GroupOption::One | GroupOption::Fixed => 0,
    }
}

fn rot_code(option: GroupOption) -> i32 {
    match option {
        GroupOption::All => 1,
        GroupOption::Group => 3,
        GroupOption::One => -1,
        GroupOption::Fixed => 0,
    }
}

fn beam_tilt_code(option: GroupOption) -> i32 {
    match option {
        GroupOption::All => 2,
        GroupOption::Group => 5,
        GroupOption::One | GroupOption::Fixed => 0,
    }
}

impl Stage for AlignStage {
    fn name(&self) -> &str {
        "align"
    }

    fn table(&self) -> &str {
        "align"
    }

    fn jobs_per_device(&self) -> usize {
        self.config.system.jobs_per_device
    }

    fn declared_scope(&self) -> Option<Scope> {
        self.config
            .system
            .process_list
            .as_ref()
            .map(|list| Scope::from_series(list.iter().copied().map(SeriesId::new)))
    }

    fn candidates(&self, scope: &Scope) -> Result<Vec<WorkItem>> {
        Ok(scope
            .iter()
            .map(|series| {
                let dir = series_dir(&self.config.system, series);
                let basename = series_basename(&self.config.system, series);
                WorkItem::new(
                    ItemKey::series(series),
                    vec![dir.join(format!("{basename}.st"))],
                    dir.join(format!("{basename}_ali.mrc")),
                )
            })
            .collect())
    }

    /// One directive file is shared by every series of the run.
    fn prepare_run(&self, _pending: &[WorkItem]) -> Result<()> {
        std::fs::create_dir_all(&self.config.system.output_path)?;
        std::fs::write(self.adoc_path(), self.directive())?;
        Ok(())
    }

    fn command(&self, item: &WorkItem, _device: &DeviceId) -> ToolCommand {
        let series = item.key.series;
        let dir = series_dir(&self.config.system, series);
        let basename = series_basename(&self.config.system, series);
        ToolCommand::new(&self.config.exec_path)
            .arg("-DirectiveFile")
            .arg(self.adoc_path().display().to_string())
            .arg("-RootName")
            .arg(basename)
            .arg("-CurrentLocation")
            .arg(dir.display().to_string())
            .args(["-GPUMachineList", "1"])
            .args(["-StartingStep", "0"])
            .args(["-EndingStep", "8"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomopipe_core::{FineAlignParams, PatchTrackParams, SystemConfig};

    fn config(output_path: PathBuf) -> AlignConfig {
        AlignConfig {
            system: SystemConfig {
                process_list: Some(vec![2, 1]),
                output_path,
                output_rootname: "sample".into(),
                output_suffix: String::new(),
                jobs_per_device: 1,
            },
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
                mag_option: GroupOption::All,
                tilt_option: GroupOption::Group,
                rot_option: GroupOption::One,
                beam_tilt_option: GroupOption::Fixed,
                use_robust_fitting: true,
                weight_all_contours: false,
            },
        }
    }

    #[test]
    fn declared_scope_is_sorted_and_deduplicated() {
        let stage = AlignStage::new(config(PathBuf::from("work")));
        let scope = stage.declared_scope().unwrap();
        let series: Vec<u32> = scope.iter().map(|s| s.value()).collect();
        assert_eq!(series, vec![1, 2]);
    }

    #[test]
    fn candidates_pair_each_stack_with_its_aligned_output() {
        let stage = AlignStage::new(config(PathBuf::from("work")));
        let scope = stage.declared_scope().unwrap();
        let items = stage.candidates(&scope).unwrap();

        assert_eq!(items[0].sources, vec![PathBuf::from("work/sample_01/sample_01.st")]);
        assert_eq!(
            items[0].output,
            PathBuf::from("work/sample_01/sample_01_ali.mrc")
        );
    }

    #[test]
    fn directive_encodes_option_groups_numerically() {
        let stage = AlignStage::new(config(PathBuf::from("work")));
        let adoc = stage.directive();

        assert!(adoc.contains("comparam.align.tiltalign.MagOption = 1"));
        assert!(adoc.contains("comparam.align.tiltalign.TiltOption = 5"));
        assert!(adoc.contains("comparam.align.tiltalign.RotOption = -1"));
        assert!(adoc.contains("comparam.align.tiltalign.BeamTiltOption = 0"));
        assert!(adoc.contains("setupset.copyarg.userawtlt = 1"));
        assert!(adoc.contains("comparam.xcorr_pt.tiltxcorr.SizeOfPatchesXandY = 300,200"));
        assert!(adoc.contains("runtime.AlignedStack.any.binByFactor = 8"));
    }

    #[test]
    fn prepare_run_writes_the_directive_file() {
        let dir = tempfile::tempdir().unwrap();
        let stage = AlignStage::new(config(dir.path().to_path_buf()));
        stage.prepare_run(&[]).unwrap();

        let adoc = std::fs::read_to_string(dir.path().join("align.adoc")).unwrap();
        assert!(adoc.contains("setupset.copyarg.rotation = 86"));
    }

    #[test]
    fn command_targets_the_series_folder() {
        let stage = AlignStage::new(config(PathBuf::from("work")));
        let scope = stage.declared_scope().unwrap();
        let item = stage.candidates(&scope).unwrap().remove(0);
        let cmd = stage.command(&item, &DeviceId::new("0"));

        let joined = cmd.args.join(" ");
        assert!(joined.contains("-RootName sample_01"));
        assert!(joined.contains("-CurrentLocation work/sample_01"));
        assert!(joined.contains("-EndingStep 8"));
    }
}
