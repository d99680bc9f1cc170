//! Stack-building stage (IMOD newstack, one invocation per series).

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tomopipe_core::{
    ItemKey, PipelineError, Result, Scope, SeriesId, StackConfig, WorkItem,
};
use tomopipe_metadata::MasterMetadata;
use tomopipe_resources::DeviceId;
use tomopipe_tools::ToolCommand;

use crate::stage::Stage;
use crate::stages::{frame_path, series_basename, series_dir};

pub struct StackStage {
    config: StackConfig,
    master: Arc<MasterMetadata>,
}

impl StackStage {
    pub fn new(config: StackConfig, master: Arc<MasterMetadata>) -> Self {
        Self { config, master }
    }

    fn stack_path(&self, series: SeriesId) -> PathBuf {
        series_dir(&self.config.system, series)
            .join(format!("{}.st", series_basename(&self.config.system, series)))
    }

    /// Ascending tilt angles of one series, paired with the motion-corrected
    /// frame expected at each angle.
    fn sorted_frames(&self, series: SeriesId) -> Result<Vec<(f64, PathBuf)>> {
        let frames: Vec<(f64, PathBuf)> = self
            .master
            .sorted_angles(series)
            .into_iter()
            .map(|(angle, _)| {
                (
                    angle,
                    frame_path(
                        &self.config.frames_path,
                        &self.config.frames_rootname,
                        series,
                        angle,
                    ),
                )
            })
            .collect();
        if frames.is_empty() {
            return Err(PipelineError::DataIntegrity {
                source_name: format!("series {series}"),
                reason: "no images recorded for this series".into(),
            });
        }
        Ok(frames)
    }
}

impl Stage for StackStage {
    fn name(&self) -> &str {
        "stack"
    }

    fn table(&self) -> &str {
        "stack"
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
        let mut items = Vec::with_capacity(scope.len());
        for series in scope.iter() {
            let sources = self
                .sorted_frames(series)?
                .into_iter()
                .map(|(_, path)| path)
                .collect();
            items.push(WorkItem::new(
                ItemKey::series(series),
                sources,
                self.stack_path(series),
            ));
        }
        Ok(items)
    }

    /// Create each series folder and write the two auxiliary files newstack
    /// and the later alignment need: the raw tilt-angle list and the
    /// file-input list.
    fn prepare_run(&self, pending: &[WorkItem]) -> Result<()> {
        for item in pending {
            let series = item.key.series;
            let dir = series_dir(&self.config.system, series);
            std::fs::create_dir_all(&dir)?;
            let basename = series_basename(&self.config.system, series);

            let frames = self.sorted_frames(series)?;

            let mut rawtlt = String::new();
            for (angle, _) in &frames {
                let _ = writeln!(rawtlt, "{angle:.1}");
            }
            std::fs::write(dir.join(format!("{basename}.rawtlt")), rawtlt)?;

            let mut filelist = format!("{}\n", frames.len());
            for (_, path) in &frames {
                let _ = writeln!(filelist, "{}\n0", path.display());
            }
            std::fs::write(dir.join(format!("{basename}_sources.txt")), filelist)?;
        }
        Ok(())
    }

    fn command(&self, item: &WorkItem, _device: &DeviceId) -> ToolCommand {
        let series = item.key.series;
        let dir = series_dir(&self.config.system, series);
        let basename = series_basename(&self.config.system, series);
        ToolCommand::new(&self.config.exec_path)
            .arg("-fileinlist")
            .arg(dir.join(format!("{basename}_sources.txt")).display().to_string())
            .arg("-output")
            .arg(item.output.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomopipe_core::SystemConfig;

    fn master() -> Arc<MasterMetadata> {
        let mut table = MasterMetadata::default();
        table.push(PathBuf::from("raw/sample_01_0002_3.0.tif"), 1, 2, 3.0);
        table.push(PathBuf::from("raw/sample_01_0001_0.0.tif"), 1, 1, 0.0);
        table.push(PathBuf::from("raw/sample_01_0003_-3.0.tif"), 1, 3, -3.0);
        Arc::new(table)
    }

    fn config(output_path: PathBuf) -> StackConfig {
        StackConfig {
            system: SystemConfig {
                process_list: None,
                output_path,
                output_rootname: "sample".into(),
                output_suffix: String::new(),
                jobs_per_device: 1,
            },
            exec_path: PathBuf::from("newstack"),
            frames_path: PathBuf::from("mc"),
            frames_rootname: "sample".into(),
        }
    }

    #[test]
    fn candidates_list_frames_in_ascending_tilt_order() {
        let stage = StackStage::new(config(PathBuf::from("stacks")), master());
        let scope = Scope::from_series([SeriesId::new(1)]);
        let items = stage.candidates(&scope).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, ItemKey::series(SeriesId::new(1)));
        assert_eq!(
            items[0].sources,
            vec![
                PathBuf::from("mc/sample_001_-3.0.mrc"),
                PathBuf::from("mc/sample_001_0.0.mrc"),
                PathBuf::from("mc/sample_001_3.0.mrc"),
            ]
        );
        assert_eq!(
            items[0].output,
            PathBuf::from("stacks/sample_01/sample_01.st")
        );
    }

    #[test]
    fn unknown_series_is_a_data_integrity_error() {
        let stage = StackStage::new(config(PathBuf::from("stacks")), master());
        let scope = Scope::from_series([SeriesId::new(9)]);
        let err = stage.candidates(&scope).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity { .. }));
    }

    #[test]
    fn prepare_run_writes_rawtlt_and_file_list() {
        let dir = tempfile::tempdir().unwrap();
        let stage = StackStage::new(config(dir.path().to_path_buf()), master());
        let scope = Scope::from_series([SeriesId::new(1)]);
        let items = stage.candidates(&scope).unwrap();

        stage.prepare_run(&items).unwrap();

        let series_folder = dir.path().join("sample_01");
        let rawtlt = std::fs::read_to_string(series_folder.join("sample_01.rawtlt")).unwrap();
        assert_eq!(rawtlt, "-3.0\n0.0\n3.0\n");

        let filelist =
            std::fs::read_to_string(series_folder.join("sample_01_sources.txt")).unwrap();
        assert!(filelist.starts_with("3\n"));
        assert!(filelist.ends_with("mc/sample_001_3.0.mrc\n0\n"));
    }

    #[test]
    fn command_points_newstack_at_the_file_list() {
        let stage = StackStage::new(config(PathBuf::from("stacks")), master());
        let scope = Scope::from_series([SeriesId::new(1)]);
        let item = stage.candidates(&scope).unwrap().remove(0);
        let cmd = stage.command(&item, &DeviceId::new("0"));

        assert_eq!(cmd.program, PathBuf::from("newstack"));
        assert_eq!(
            cmd.args,
            vec![
                "-fileinlist",
                "stacks/sample_01/sample_01_sources.txt",
                "-output",
                "stacks/sample_01/sample_01.st",
            ]
        );
    }
}
