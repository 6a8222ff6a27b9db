//! `holo-pipelines` -- command line front end for the organ pipelines.
//!
//! Provides the following subcommands:
//!
//! - `lung`, `bone`, `kidney`, `abdominal` -- segment a local study into a GLB file.
//! - `import` -- validate and convert a local OBJ/GLB mesh.
//! - `run-job` -- run a tracked job by plid (fetch, process, dispatch).
//! - `status` -- show the recorded state of a job.
//! - `list` -- list registered pipelines.
//! - `config` -- create the config file or register a segmentation tool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use holo_core::config::{ConfigManager, ConfigSection, SegmentationTool, Settings};
use holo_core::jobs::{FileStateStore, Job, JobStateStore, JobWorkspace, MedicalData};
use holo_core::logging::{init_tracing, LogLevel};
use holo_core::models::OrganConfig;
use holo_core::pipelines::organs;
use holo_core::pipelines::PipelineController;

const CONFIG_FILE: &str = "holo.toml";

/// Organ segmentation pipelines producing 3D mesh assets.
#[derive(Parser)]
#[command(name = "holo-pipelines", version)]
struct Cli {
    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (defaults to .config/holo.toml).
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment the lungs from a chest CT study.
    Lung(OrganArgs),

    /// Extract bone from a CT study.
    Bone(OrganArgs),

    /// Segment kidneys and kidney tumors.
    Kidney(OrganArgs),

    /// Segment abdominal organs.
    Abdominal(OrganArgs),

    /// Convert an existing OBJ/GLB mesh into a viewer asset.
    Import {
        /// Mesh file or directory holding one.
        input: PathBuf,

        /// Output GLB file.
        output: PathBuf,
    },

    /// Run a tracked job: fetch the input, process it and dispatch the result.
    RunJob(RunJobArgs),

    /// Show the recorded state of a job.
    Status {
        job_id: String,

        /// Print every recorded transition.
        #[arg(long)]
        history: bool,

        /// Print the full state record as JSON.
        #[arg(long, conflicts_with = "history")]
        json: bool,
    },

    /// List registered pipelines.
    List,

    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Write a default config file if none exists, then print its path.
    Init,

    /// Register the segmentation command for a pipeline.
    SetTool {
        /// Pipeline identifier.
        plid: String,

        /// Program to run.
        program: String,

        /// Arguments; `{input}` and `{output_dir}` are substituted.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Args)]
struct OrganArgs {
    /// Directory holding the study.
    input: PathBuf,

    /// Output GLB file.
    output: PathBuf,

    /// Segmentation type to mesh; repeat for several. Defaults to the
    /// pipeline's own selection.
    #[arg(short = 't', long = "type", value_name = "N")]
    types: Vec<usize>,
}

#[derive(Args)]
struct RunJobArgs {
    /// Pipeline identifier.
    #[arg(long)]
    plid: String,

    /// URL or path of the study archive.
    #[arg(long)]
    input_endpoint: String,

    /// Job id; generated when omitted.
    #[arg(long)]
    job_id: Option<String>,

    /// Metadata forwarded to dispatch, as a JSON object.
    #[arg(long, value_name = "JSON")]
    medical_data: Option<String>,
}

fn main() -> Result<()> {
    let matches = command_with_pipeline_help().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    init_tracing(if cli.quiet { LogLevel::Error } else { LogLevel::Info });

    if let Commands::Config { action } = &cli.command {
        return manage_config(cli.config.as_deref(), action);
    }
    let settings = load_settings(cli.config.as_deref())?;
    tracing::debug!("Jobs root: {}", settings.paths.jobs_root);

    match cli.command {
        Commands::Lung(args) => run_organ(&settings, organs::LUNG, &args),
        Commands::Bone(args) => run_organ(&settings, organs::BONE, &args),
        Commands::Kidney(args) => run_organ(&settings, organs::KIDNEY, &args),
        Commands::Abdominal(args) => run_organ(&settings, organs::ABDOMINAL, &args),
        Commands::Import { input, output } => {
            let args = OrganArgs {
                input,
                output,
                types: Vec::new(),
            };
            run_organ(&settings, organs::GLB_IMPORTER, &args)
        }
        Commands::RunJob(args) => run_job(&settings, args),
        Commands::Status {
            job_id,
            history,
            json,
        } => show_status(&settings, &job_id, history, json),
        Commands::List => list_pipelines(&settings),
        Commands::Config { .. } => Ok(()),
    }
}

/// Attach each organ's metadata to its subcommand's long help.
fn command_with_pipeline_help() -> clap::Command {
    let organs: [(&str, OrganConfig); 5] = [
        ("lung", organs::lung_config()),
        ("bone", organs::bone_config()),
        ("kidney", organs::kidney_config()),
        ("abdominal", organs::abdominal_config()),
        ("import", organs::glb_importer_config()),
    ];

    let mut cmd = Cli::command();
    for (name, config) in organs {
        let help = organ_help(&config);
        cmd = cmd.mut_subcommand(name, |sub| sub.long_about(help));
    }
    cmd
}

fn organ_help(config: &OrganConfig) -> String {
    let descriptor = &config.descriptor;
    let mut help = format!(
        "{}\n\nAccepted file types: {}",
        descriptor.description,
        descriptor.file_types.join(", ")
    );
    if !descriptor.req_modalities.is_empty() {
        help.push_str(&format!(
            "\nRequired modalities: {}",
            descriptor.req_modalities.join(", ")
        ));
    }
    if !descriptor.seg_types.is_empty() {
        help.push_str(&format!(
            "\nSegmentation types: {}\nDefault selection: {:?}",
            descriptor.proc_seg_types(),
            config.default_seg_types
        ));
    }
    help
}

/// Explicit paths must exist; otherwise the first existing default is
/// used, falling back to built-in defaults.
fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_paths().into_iter().find(|p| p.exists()) {
            Some(path) => path,
            None => return Ok(Settings::default()),
        },
    };

    let mut manager = ConfigManager::new(&path);
    manager
        .load()
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    tracing::debug!("Config: {}", path.display());
    Ok(manager.settings().clone())
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".config").join(CONFIG_FILE)];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "holo-pipelines") {
        paths.push(dirs.config_dir().join(CONFIG_FILE));
    }
    paths
}

fn manage_config(explicit: Option<&Path>, action: &ConfigCmd) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".config").join(CONFIG_FILE));
    let mut manager = ConfigManager::new(&path);
    manager
        .load_or_create()
        .with_context(|| format!("Failed to open config {}", path.display()))?;

    match action {
        ConfigCmd::Init => {}
        ConfigCmd::SetTool {
            plid,
            program,
            args,
        } => {
            PipelineController::with_defaults(manager.settings())?.describe(plid)?;
            manager.settings_mut().segmentation.tools.insert(
                plid.clone(),
                SegmentationTool {
                    program: program.clone(),
                    args: args.clone(),
                },
            );
            manager.update_section(ConfigSection::Segmentation)?;
        }
    }
    println!("{}", manager.path().display());
    Ok(())
}

fn run_organ(settings: &Settings, plid: &str, args: &OrganArgs) -> Result<()> {
    let controller = PipelineController::with_defaults(settings)?;
    let pipeline = controller.load_pipeline(plid)?;

    let result = pipeline
        .run_file(&args.input, &args.output, &args.types)
        .with_context(|| format!("{} failed on {}", plid, args.input.display()))?;

    for (state, reason) in &result.stages_skipped {
        tracing::info!("{} skipped: {}", state, reason);
    }
    println!("{}", args.output.display());
    Ok(())
}

fn run_job(settings: &Settings, args: RunJobArgs) -> Result<()> {
    let medical_data = match &args.medical_data {
        Some(json) => MedicalData::from_json(json).context("--medical-data must be a JSON object")?,
        None => MedicalData::new(),
    };
    let job = Job::new(args.job_id, args.plid, args.input_endpoint, medical_data);

    let controller = PipelineController::with_defaults(settings)?;
    // Resolve before announcing the id so unknown plids leave no trace.
    controller.load_pipeline(&job.plid)?;
    println!("{}", job.job_id);

    let result = controller
        .run_job(&job)
        .with_context(|| format!("Job '{}' failed", job.job_id))?;
    if let Some(path) = &result.result_path {
        tracing::info!("Job '{}' finished: {}", job.job_id, path.display());
    }
    Ok(())
}

fn show_status(settings: &Settings, job_id: &str, history: bool, json: bool) -> Result<()> {
    let store = FileStateStore::new(JobWorkspace::new(settings.paths.jobs_root()));
    let record = store.get(job_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if history {
        for entry in &record.history {
            println!("{}  {}", entry.at, entry.state);
        }
    } else {
        println!("{}", record.state);
    }
    Ok(())
}

fn list_pipelines(settings: &Settings) -> Result<()> {
    let controller = PipelineController::with_defaults(settings)?;
    for plid in controller.plids() {
        let descriptor = controller.describe(plid)?;
        println!(
            "{:<24} {} [{}]",
            plid,
            descriptor.description,
            descriptor.file_types.join(", ")
        );
    }
    Ok(())
}
