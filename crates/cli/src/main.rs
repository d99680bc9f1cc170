//! tomopipe CLI — resumable batch driver for tilt-series processing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tomopipe_core::{
    load_config, AlignConfig, FileType, FineAlignParams, GroupOption, MotionCorrConfig,
    PatchTrackParams, ProjectConfig, StackConfig, SystemConfig,
};
use tomopipe_engine::stages::{AlignStage, MotionCorrStage, StackStage};
use tomopipe_engine::Pipeline;
use tomopipe_metadata::{scan_source_folder, MasterMetadata};
use tomopipe_resources::NvidiaSmiQuery;
use tomopipe_storage::{JsonMetadataStore, MetadataStore};
use tomopipe_tools::{ProcessRunner, ToolRunner};

const STORE_ROOT: &str = ".tomopipe";

#[derive(Parser)]
#[command(name = "tomopipe")]
#[command(about = "Resumable tilt-series processing pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write template configuration files for a new project
    Init {
        /// Project name, used as the prefix of every config file
        project: String,
    },
    /// Scan the source folder and build the master metadata table
    Scan {
        project: String,
    },
    /// Reconcile and run the configured stages
    Run {
        project: String,
        /// Stages to run, in pipeline order
        #[arg(long, value_delimiter = ',', default_values_t = vec![StageName::Motioncorr, StageName::Stack, StageName::Align])]
        stages: Vec<StageName>,
    },
    /// Show per-stage completion counts
    Status {
        project: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageName {
    Motioncorr,
    Stack,
    Align,
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageName::Motioncorr => "motioncorr",
            StageName::Stack => "stack",
            StageName::Align => "align",
        };
        f.write_str(name)
    }
}

fn config_path(project: &str, section: &str) -> PathBuf {
    PathBuf::from(format!("{project}_{section}.json"))
}

fn master_path(project: &str) -> PathBuf {
    PathBuf::from(format!("{project}_master_md.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { project } => init(&project),
        Commands::Scan { project } => scan(&project),
        Commands::Run { project, stages } => run(&project, &stages).await,
        Commands::Status { project } => status(&project).await,
    }
}

/// Write one template per config section, skipping files that already exist.
fn init(project: &str) -> Result<()> {
    let templates: [(&str, serde_json::Value); 4] = [
        ("project", serde_json::to_value(project_template(project))?),
        ("motioncorr", serde_json::to_value(motioncorr_template(project))?),
        ("stack", serde_json::to_value(stack_template(project))?),
        ("align", serde_json::to_value(align_template(project))?),
    ];

    for (section, value) in templates {
        let path = config_path(project, section);
        if path.exists() {
            info!(path = %path.display(), "config exists, leaving it alone");
            continue;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

fn scan(project: &str) -> Result<()> {
    let config: ProjectConfig = load_config(&config_path(project, "project"))?;
    let master = scan_source_folder(&config)?;
    master.save(&master_path(project))?;
    println!(
        "Scanned {} images across {} series into {}",
        master.len(),
        master.series_ids().len(),
        master_path(project).display()
    );
    Ok(())
}

async fn run(project: &str, stages: &[StageName]) -> Result<()> {
    if stages.is_empty() {
        bail!("no stages selected");
    }

    let master = Arc::new(MasterMetadata::load(&master_path(project))?);
    let store = JsonMetadataStore::new(STORE_ROOT).await?;
    let runner = Arc::new(ProcessRunner) as Arc<dyn ToolRunner>;

    let mut pipeline = Pipeline::new(Box::new(store), runner, Box::new(NvidiaSmiQuery));
    for stage in stages {
        pipeline = match stage {
            StageName::Motioncorr => {
                let config: MotionCorrConfig = load_config(&config_path(project, "motioncorr"))?;
                pipeline.with_stage(Box::new(MotionCorrStage::new(config, Arc::clone(&master))))
            }
            StageName::Stack => {
                let config: StackConfig = load_config(&config_path(project, "stack"))?;
                pipeline.with_stage(Box::new(StackStage::new(config, Arc::clone(&master))))
            }
            StageName::Align => {
                let config: AlignConfig = load_config(&config_path(project, "align"))?;
                pipeline.with_stage(Box::new(AlignStage::new(config)))
            }
        };
    }

    let reports = pipeline.run().await?;
    for report in reports {
        if report.all_done {
            println!("{}: all items already processed", report.stage);
        } else {
            println!(
                "{}: {} completed in {} chunk(s), {} skipped, {} reinstated",
                report.stage, report.completed, report.chunks, report.skipped, report.reinstated
            );
        }
    }
    Ok(())
}

async fn status(project: &str) -> Result<()> {
    let master_file = master_path(project);
    if master_file.exists() {
        let master = MasterMetadata::load(&master_file)?;
        println!(
            "Master metadata: {} images, {} series",
            master.len(),
            master.series_ids().len()
        );
    } else {
        println!("Master metadata: not built (run `tomopipe scan {project}`)");
    }

    if !Path::new(STORE_ROOT).exists() {
        println!("No stage has run yet");
        return Ok(());
    }

    let store = JsonMetadataStore::new(STORE_ROOT).await?;
    for table in ["motioncorr", "stack", "align"] {
        let done = store.load_done(table).await?;
        println!("{table}: {} item(s) done", done.len());
    }
    Ok(())
}

fn project_template(project: &str) -> ProjectConfig {
    ProjectConfig {
        source_folder: PathBuf::from("../raw/"),
        file_prefix: project.to_string(),
        series_field: 0,
        index_field: 1,
        angle_field: 2,
        filetype: FileType::Tif,
    }
}

fn motioncorr_template(project: &str) -> MotionCorrConfig {
    MotionCorrConfig {
        system: SystemConfig {
            process_list: None,
            output_path: PathBuf::from("./motioncorr/"),
            output_rootname: project.to_string(),
            output_suffix: String::new(),
            jobs_per_device: 2,
        },
        exec_path: PathBuf::from("MotionCor2"),
        filetype: FileType::Tif,
        gain_reference: None,
        pixel_size: 1.0,
        desired_pixel_size: 1.0,
        discard_frames_top: 0,
        discard_frames_bottom: 0,
        tolerance: 0.5,
        max_iterations: 10,
        patch_size: [5, 5],
        use_subgroups: true,
        gpu_memory_usage: 0.9,
    }
}

fn stack_template(project: &str) -> StackConfig {
    StackConfig {
        system: SystemConfig {
            process_list: None,
            output_path: PathBuf::from("./stacks/"),
            output_rootname: project.to_string(),
            output_suffix: String::new(),
            jobs_per_device: 1,
        },
        exec_path: PathBuf::from("newstack"),
        frames_path: PathBuf::from("./motioncorr/"),
        frames_rootname: project.to_string(),
    }
}

fn align_template(project: &str) -> AlignConfig {
    AlignConfig {
        system: SystemConfig {
            process_list: None,
            output_path: PathBuf::from("./stacks/"),
            output_rootname: project.to_string(),
            output_suffix: String::new(),
            jobs_per_device: 1,
        },
        exec_path: PathBuf::from("batchruntomo"),
        pixel_size: 0.1,
        rot_angle: 86.0,
        gold_size: 0.0,
        adoc_template: "/usr/share/imod/SystemTemplate/cryoSample.adoc".to_string(),
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
            mag_option: GroupOption::Fixed,
            tilt_option: GroupOption::Fixed,
            rot_option: GroupOption::Group,
            beam_tilt_option: GroupOption::Fixed,
            use_robust_fitting: true,
            weight_all_contours: true,
        },
    }
}
