//! Motion-correction stage (MotionCor2, one invocation per raw image).

use std::sync::Arc;

use tomopipe_core::{ItemKey, MotionCorrConfig, Result, Scope, SeriesId, WorkItem};
use tomopipe_metadata::MasterMetadata;
use tomopipe_resources::DeviceId;
use tomopipe_tools::ToolCommand;

use crate::stage::Stage;
use crate::stages::frame_path;

pub struct MotionCorrStage {
    config: MotionCorrConfig,
    master: Arc<MasterMetadata>,
}

impl MotionCorrStage {
    pub fn new(config: MotionCorrConfig, master: Arc<MasterMetadata>) -> Self {
        Self { config, master }
    }
}

impl Stage for MotionCorrStage {
    fn name(&self) -> &str {
        "motioncorr"
    }

    fn table(&self) -> &str {
        "motioncorr"
    }

    fn jobs_per_device(&self) -> usize {
        self.config.system.jobs_per_device
    }

    fn declared_scope(&self) -> Option<Scope> {
        // First stage: the scope is never derived. Absent an explicit list,
        // every series the scan found is in scope.
        Some(match &self.config.system.process_list {
            Some(list) => Scope::from_series(list.iter().copied().map(SeriesId::new)),
            None => Scope::from_series(self.master.series_ids()),
        })
    }

    fn candidates(&self, scope: &Scope) -> Result<Vec<WorkItem>> {
        Ok(self
            .master
            .rows()
            .filter(|row| scope.contains(row.series))
            .map(|row| {
                let output = frame_path(
                    &self.config.system.output_path,
                    &self.config.system.output_rootname,
                    row.series,
                    row.angle,
                );
                WorkItem::new(
                    ItemKey::image(row.series, row.image_idx),
                    vec![row.path.to_path_buf()],
                    output,
                )
            })
            .collect())
    }

    fn prepare_run(&self, _pending: &[WorkItem]) -> Result<()> {
        std::fs::create_dir_all(&self.config.system.output_path)?;
        Ok(())
    }

    fn command(&self, item: &WorkItem, device: &DeviceId) -> ToolCommand {
        let source = item.sources.first().cloned().unwrap_or_default();
        let ftbin = self.config.desired_pixel_size / self.config.pixel_size;
        let gain = self
            .config
            .gain_reference
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "nogain".to_string());
        let patch = format!("{},{}", self.config.patch_size[0], self.config.patch_size[1]);

        ToolCommand::new(&self.config.exec_path)
            .arg(self.config.filetype.input_flag())
            .arg(source.display().to_string())
            .arg("-OutMrc")
            .arg(item.output.display().to_string())
            .arg("-Gpu")
            .arg(device.as_str())
            .arg("-GpuMemUsage")
            .arg(self.config.gpu_memory_usage.to_string())
            .arg("-Gain")
            .arg(gain)
            .arg("-Tol")
            .arg(self.config.tolerance.to_string())
            .arg("-Patch")
            .arg(patch)
            .arg("-Iter")
            .arg(self.config.max_iterations.to_string())
            .arg("-Group")
            .arg(if self.config.use_subgroups { "1" } else { "0" })
            .arg("-FtBin")
            .arg(ftbin.to_string())
            .arg("-PixSize")
            .arg(self.config.pixel_size.to_string())
            .arg("-Throw")
            .arg(self.config.discard_frames_top.to_string())
            .arg("-Trunc")
            .arg(self.config.discard_frames_bottom.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tomopipe_core::{FileType, SystemConfig};

    fn master() -> Arc<MasterMetadata> {
        let mut table = MasterMetadata::default();
        table.push(PathBuf::from("raw/sample_01_0001_0.0.tif"), 1, 1, 0.0);
        table.push(PathBuf::from("raw/sample_01_0002_-3.0.tif"), 1, 2, -3.0);
        table.push(PathBuf::from("raw/sample_02_0001_0.0.tif"), 2, 1, 0.0);
        Arc::new(table)
    }

    fn config(process_list: Option<Vec<u32>>) -> MotionCorrConfig {
        MotionCorrConfig {
            system: SystemConfig {
                process_list,
                output_path: PathBuf::from("mc"),
                output_rootname: "sample".into(),
                output_suffix: String::new(),
                jobs_per_device: 2,
            },
            exec_path: PathBuf::from("MotionCor2"),
            filetype: FileType::Tif,
            gain_reference: None,
            pixel_size: 1.1,
            desired_pixel_size: 2.2,
            discard_frames_top: 1,
            discard_frames_bottom: 0,
            tolerance: 0.5,
            max_iterations: 10,
            patch_size: [5, 4],
            use_subgroups: true,
            gpu_memory_usage: 0.9,
        }
    }

    #[test]
    fn scope_defaults_to_every_scanned_series() {
        let stage = MotionCorrStage::new(config(None), master());
        let scope = stage.declared_scope().unwrap();
        assert_eq!(scope.len(), 2);
    }

    #[test]
    fn candidates_are_per_image_with_angle_named_outputs() {
        let stage = MotionCorrStage::new(config(Some(vec![1])), master());
        let scope = stage.declared_scope().unwrap();
        let items = stage.candidates(&scope).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, ItemKey::image(SeriesId::new(1), 1));
        assert_eq!(items[0].output, PathBuf::from("mc/sample_001_0.0.mrc"));
        assert_eq!(items[1].output, PathBuf::from("mc/sample_001_-3.0.mrc"));
    }

    #[test]
    fn command_carries_the_full_flag_set() {
        let stage = MotionCorrStage::new(config(None), master());
        let scope = stage.declared_scope().unwrap();
        let item = stage.candidates(&scope).unwrap().remove(0);
        let cmd = stage.command(&item, &DeviceId::new("1"));

        assert_eq!(cmd.program, PathBuf::from("MotionCor2"));
        assert_eq!(cmd.args[0], "-InTiff");
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-Gpu 1"));
        assert!(joined.contains("-Gain nogain"));
        assert!(joined.contains("-Patch 5,4"));
        assert!(joined.contains("-FtBin 2"));
        assert!(joined.contains("-Throw 1"));
    }
}
