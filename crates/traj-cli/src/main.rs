use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use traj_core::{
    BranchId, CircularMotion, DegreesOfFreedom, DownsamplingParameters, Evaluator, Instant,
    Interpolation, Kernel, Sample, SegmentTree, Vector3, World, circular_timeline,
    jittered_circular_timeline, linear_timeline,
};
use traj_store::DataDir;

#[derive(Parser)]
#[command(name = "traj", about = "Discrete trajectory store CLI")]
struct Cli {
    /// Data directory (default: ~/.traj)
    #[arg(long, global = true, env = "TRAJ_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a synthetic motion into a new trajectory
    Generate(GenerateArgs),

    /// List stored trajectories
    List,

    /// Show segments, samples and branches of a trajectory
    Stats {
        name: String,
    },

    /// Evaluate position and velocity on a branch
    Evaluate {
        name: String,
        #[arg(allow_negative_numbers = true)]
        time: f64,
        /// Branch index as printed by `stats`
        #[arg(long, default_value_t = 0)]
        branch: usize,
    },

    /// Fork a branch at one of its sample instants
    Fork {
        name: String,
        #[arg(allow_negative_numbers = true)]
        time: f64,
        #[arg(long, default_value_t = 0)]
        branch: usize,
    },

    /// Drop every sample after TIME, and every branch forked after it
    ForgetAfter {
        name: String,
        #[arg(allow_negative_numbers = true)]
        time: f64,
        #[arg(long, default_value_t = 0)]
        branch: usize,
    },

    /// Drop every sample of the root branch before TIME
    ForgetBefore {
        name: String,
        #[arg(allow_negative_numbers = true)]
        time: f64,
    },

    /// Delete a non-root branch and everything forked from it
    DeleteBranch {
        name: String,
        #[arg(long)]
        branch: usize,
    },

    /// Export a trajectory to a JSON file
    Export {
        name: String,
        /// Output file path
        path: PathBuf,
    },

    /// Import a trajectory from a JSON file
    Import {
        name: String,
        /// Input file path
        path: PathBuf,
        /// Replace an existing trajectory of the same name
        #[arg(long)]
        force: bool,
    },

    /// Delete a stored trajectory
    Delete {
        name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Motion {
    Circle,
    Linear,
}

#[derive(clap::Args)]
struct GenerateArgs {
    name: String,

    #[arg(long, value_enum, default_value_t = Motion::Circle)]
    motion: Motion,

    /// Angular velocity of circular motion, rad/s
    #[arg(long, default_value_t = 3.0)]
    omega: f64,

    /// Radius of circular motion, m
    #[arg(long, default_value_t = 2.0)]
    radius: f64,

    /// Speed along x of linear motion, m/s
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    from: f64,

    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    to: f64,

    #[arg(long, default_value_t = 0.01)]
    step: f64,

    /// Randomly shift circle sample instants by up to jitter/2 steps
    #[arg(long, default_value_t = 0.0)]
    jitter: f64,

    /// Seed for jitter (default: from the OS)
    #[arg(long)]
    seed: Option<u64>,

    /// Start a continuation segment every N samples
    #[arg(long)]
    segment_samples: Option<usize>,

    /// Override the configured downsampling run length
    #[arg(long)]
    max_dense: Option<usize>,

    /// Override the configured downsampling tolerance, m
    #[arg(long)]
    tolerance: Option<f64>,

    /// Keep every sample
    #[arg(long, conflicts_with_all = ["max_dense", "tolerance"])]
    no_downsampling: bool,

    /// hermite3 or linear (default: from config)
    #[arg(long)]
    interpolation: Option<Interpolation>,

    /// portable or fma (default: from config)
    #[arg(long)]
    kernel: Option<Kernel>,

    /// Replace an existing trajectory of the same name
    #[arg(long)]
    force: bool,
}

fn open_data_dir(cli: &Cli) -> Result<DataDir> {
    DataDir::open(cli.data_dir.as_deref()).context("failed to open data directory")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Generate(args) => cmd_generate(&cli, args),
        Commands::List => cmd_list(&cli),
        Commands::Stats { name } => cmd_stats(&cli, name),
        Commands::Evaluate { name, time, branch } => cmd_evaluate(&cli, name, *time, *branch),
        Commands::Fork { name, time, branch } => cmd_fork(&cli, name, *time, *branch),
        Commands::ForgetAfter { name, time, branch } => {
            cmd_forget_after(&cli, name, *time, *branch)
        }
        Commands::ForgetBefore { name, time } => cmd_forget_before(&cli, name, *time),
        Commands::DeleteBranch { name, branch } => cmd_delete_branch(&cli, name, *branch),
        Commands::Export { name, path } => cmd_export(&cli, name, path),
        Commands::Import { name, path, force } => cmd_import(&cli, name, path, *force),
        Commands::Delete { name } => cmd_delete(&cli, name),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load(data: &DataDir, name: &str) -> Result<SegmentTree<World>> {
    data.store()
        .load_tree(name)
        .with_context(|| format!("failed to load trajectory '{name}'"))
}

fn save(data: &DataDir, name: &str, tree: &SegmentTree<World>) -> Result<()> {
    data.store()
        .save_tree(name, tree)
        .with_context(|| format!("failed to save trajectory '{name}'"))?;
    Ok(())
}

/// Branch handle for an index in `stats` order.
fn select_branch(tree: &SegmentTree<World>, index: usize) -> Result<BranchId> {
    tree.branches().nth(index).with_context(|| {
        format!(
            "no branch {index}: trajectory has {} branches",
            tree.branch_count()
        )
    })
}

fn branch_index(tree: &SegmentTree<World>, id: BranchId) -> Option<usize> {
    tree.branches().position(|b| b == id)
}

fn format_vector(v: Vector3) -> String {
    let [x, y, z] = v.to_array();
    format!("{x:.9} {y:.9} {z:.9}")
}

fn format_span(t_min: Option<Instant>, t_max: Option<Instant>) -> String {
    match (t_min, t_max) {
        (Some(a), Some(b)) => format!("[{a}, {b}]"),
        _ => "empty".to_string(),
    }
}

fn ensure_absent(data: &DataDir, name: &str, force: bool) -> Result<()> {
    if !force && data.store().contains(name)? {
        bail!("trajectory '{name}' already exists (use --force to replace it)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn generate_samples(args: &GenerateArgs) -> Result<Vec<Sample<World>>> {
    let (from, to) = (Instant::from_secs(args.from), Instant::from_secs(args.to));
    let samples = match args.motion {
        Motion::Circle => {
            let motion = CircularMotion {
                omega: args.omega,
                radius: args.radius,
            };
            if args.jitter > 0.0 {
                let mut rng = match args.seed {
                    Some(seed) => SmallRng::seed_from_u64(seed),
                    None => SmallRng::from_os_rng(),
                };
                jittered_circular_timeline(motion, from, to, args.step, args.jitter, &mut rng)?
            } else {
                circular_timeline(motion, from, to, args.step)?
            }
        }
        Motion::Linear => {
            if args.jitter > 0.0 {
                bail!("--jitter only applies to circular motion");
            }
            let start = DegreesOfFreedom::new(Vector3::ZERO, Vector3::new(args.speed, 0.0, 0.0));
            linear_timeline(start, from, to, args.step)?
        }
    };
    Ok(samples)
}

fn cmd_generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let data = open_data_dir(cli)?;
    ensure_absent(&data, &args.name, args.force)?;

    let config = data.config();
    let evaluator = Evaluator::new(
        args.interpolation.unwrap_or(config.interpolation),
        args.kernel.unwrap_or(config.kernel),
    );
    let downsampling = if args.no_downsampling {
        None
    } else {
        let configured = config.downsampling;
        if configured.enabled || args.max_dense.is_some() || args.tolerance.is_some() {
            Some(DownsamplingParameters::new(
                args.max_dense.unwrap_or(configured.max_dense_intervals),
                args.tolerance.unwrap_or(configured.tolerance),
            )?)
        } else {
            None
        }
    };

    let samples = generate_samples(args)?;
    let per_segment = match args.segment_samples {
        Some(0) => bail!("--segment-samples must be at least 1"),
        Some(n) => n,
        None => samples.len(),
    };

    let mut tree = SegmentTree::new(evaluator);
    let root = tree.root();
    for (i, chunk) in samples.chunks(per_segment).enumerate() {
        if i > 0 {
            tree.new_segment(root)?;
        }
        if let Some(params) = downsampling {
            tree.set_downsampling(root, params)?;
        }
        tree.extend(root, chunk.iter().copied())?;
    }

    save(&data, &args.name, &tree)?;
    println!(
        "generated '{}': {} samples → {} retained in {} segments",
        args.name,
        samples.len(),
        tree.sample_count(),
        tree.segment_count()
    );
    Ok(())
}

fn cmd_list(cli: &Cli) -> Result<()> {
    let data = open_data_dir(cli)?;
    let trajectories = data.store().list().context("failed to list trajectories")?;
    if trajectories.is_empty() {
        println!("(no trajectories)");
        return Ok(());
    }
    for t in trajectories {
        println!(
            "{}\tframe={}\tsegments={}\tsamples={}",
            t.name, t.frame, t.segments, t.samples
        );
    }
    Ok(())
}

fn cmd_stats(cli: &Cli, name: &str) -> Result<()> {
    let data = open_data_dir(cli)?;
    let tree = load(&data, name)?;

    println!("trajectory: {name}");
    println!("segments:   {}", tree.segment_count());
    println!("samples:    {}", tree.sample_count());
    println!("branches:   {}", tree.branch_count());
    println!(
        "db_size:    {:.1}MB",
        data.store().db_size() as f64 / (1024.0 * 1024.0)
    );
    for (index, id) in tree.branches().enumerate() {
        let Some(branch) = tree.branch(id) else {
            continue;
        };
        let origin = match branch.fork_time() {
            Some(time) => format!("fork at {time}"),
            None => "root".to_string(),
        };
        println!(
            "branch {index}: {origin}, {} segments, {} samples, {}",
            branch.segments().count(),
            branch.len(),
            format_span(branch.t_min(), branch.t_max())
        );
    }
    Ok(())
}

fn cmd_evaluate(cli: &Cli, name: &str, time: f64, branch: usize) -> Result<()> {
    let data = open_data_dir(cli)?;
    let tree = load(&data, name)?;
    let id = select_branch(&tree, branch)?;
    let view = tree.branch(id).context("branch vanished")?;

    let time = Instant::from_secs(time);
    let dof = view
        .evaluate_degrees_of_freedom(time)
        .with_context(|| format!("cannot evaluate branch {branch} at {time}"))?;
    println!("time:     {time}");
    println!("position: {}", format_vector(dof.position));
    println!("velocity: {}", format_vector(dof.velocity));
    Ok(())
}

fn cmd_fork(cli: &Cli, name: &str, time: f64, branch: usize) -> Result<()> {
    let data = open_data_dir(cli)?;
    let mut tree = load(&data, name)?;
    let parent = select_branch(&tree, branch)?;

    let time = Instant::from_secs(time);
    let child = tree
        .fork(parent, time)
        .with_context(|| format!("cannot fork branch {branch} at {time}"))?;
    save(&data, name, &tree)?;

    let index = branch_index(&tree, child).context("forked branch missing")?;
    tracing::info!("forked branch {branch} of '{name}' at {time}");
    println!("forked branch {index} from branch {branch} at {time}");
    Ok(())
}

fn cmd_forget_after(cli: &Cli, name: &str, time: f64, branch: usize) -> Result<()> {
    let data = open_data_dir(cli)?;
    let mut tree = load(&data, name)?;
    let id = select_branch(&tree, branch)?;
    let (samples, branches) = (tree.sample_count(), tree.branch_count());

    let time = Instant::from_secs(time);
    tree.forget_after(id, time)
        .with_context(|| format!("cannot forget after {time} on branch {branch}"))?;
    save(&data, name, &tree)?;

    println!(
        "forgot {} samples and {} branches after {time}",
        samples.saturating_sub(tree.sample_count()),
        branches.saturating_sub(tree.branch_count())
    );
    Ok(())
}

fn cmd_forget_before(cli: &Cli, name: &str, time: f64) -> Result<()> {
    let data = open_data_dir(cli)?;
    let mut tree = load(&data, name)?;
    let root = tree.root();
    let samples = tree.sample_count();

    let time = Instant::from_secs(time);
    tree.forget_before(root, time)
        .with_context(|| format!("cannot forget before {time}"))?;
    save(&data, name, &tree)?;

    println!(
        "forgot {} samples before {time}",
        samples.saturating_sub(tree.sample_count())
    );
    Ok(())
}

fn cmd_delete_branch(cli: &Cli, name: &str, branch: usize) -> Result<()> {
    let data = open_data_dir(cli)?;
    let mut tree = load(&data, name)?;
    let id = select_branch(&tree, branch)?;
    let branches = tree.branch_count();

    tree.delete_branch(id)
        .with_context(|| format!("cannot delete branch {branch}"))?;
    save(&data, name, &tree)?;

    println!(
        "deleted {} branches from '{name}'",
        branches.saturating_sub(tree.branch_count())
    );
    Ok(())
}

fn cmd_export(cli: &Cli, name: &str, path: &Path) -> Result<()> {
    let data = open_data_dir(cli)?;
    data.store()
        .export_json_file::<World>(name, path)
        .with_context(|| format!("failed to export '{name}'"))?;
    println!("exported '{name}' to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, name: &str, path: &Path, force: bool) -> Result<()> {
    let data = open_data_dir(cli)?;
    ensure_absent(&data, name, force)?;
    let tree = data
        .store()
        .import_json_file::<World>(name, path)
        .context("failed to import JSON")?;
    println!(
        "imported '{name}' from {}: segments={}, samples={}, branches={}",
        path.display(),
        tree.segment_count(),
        tree.sample_count(),
        tree.branch_count()
    );
    Ok(())
}

fn cmd_delete(cli: &Cli, name: &str) -> Result<()> {
    let data = open_data_dir(cli)?;
    data.store()
        .delete(name)
        .with_context(|| format!("failed to delete '{name}'"))?;
    println!("deleted '{name}'");
    Ok(())
}
