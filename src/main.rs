use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use foodweb_mds::classify::MatchRule;
use foodweb_mds::fonts::CosmicTextMeasure;
use foodweb_mds::mds::{DEFAULT_EPS, DEFAULT_MAX_ITER, DissimilarityMode, MdsConfig};
use foodweb_mds::pipeline::{RunConfig, run};
use foodweb_mds::render::FigureStyle;
use foodweb_mds::scheme::{CategoryScheme, DEFAULT_SCHEME};

/// Project a food-web dissimilarity matrix to 2-D and plot it by study
#[derive(Parser, Debug)]
#[command(name = "foodweb-mds")]
#[command(version)]
#[command(about = "Render an MDS scatter plot of food-web dissimilarities to SVG, PNG or PDF", long_about = None)]
struct Args {
    /// Pairwise dissimilarity matrix CSV (header and index column carry network ids)
    #[arg(value_name = "DISTANCES", required_unless_present_any = ["list_schemes", "completions"])]
    distances: Option<PathBuf>,

    /// Network metadata CSV with name, author and primaryType columns
    #[arg(value_name = "METADATA", required_unless_present_any = ["list_schemes", "completions"])]
    metadata: Option<PathBuf>,

    /// Output file path (extension determines format: .svg, .png or .pdf)
    #[arg(short, long, value_name = "OUTPUT", required_unless_present_any = ["list_schemes", "completions"])]
    output: Option<PathBuf>,

    /// Built-in scheme name or path to a TOML/YAML category scheme
    #[arg(short, long, value_name = "SCHEME", default_value = DEFAULT_SCHEME)]
    scheme: String,

    /// Print the built-in category schemes and exit
    #[arg(long)]
    list_schemes: bool,

    /// How to read the matrix: rows as feature vectors, or as distances
    #[arg(long, value_enum, default_value_t = DissimilarityMode::Euclidean)]
    dissimilarity: DissimilarityMode,

    /// Require metadata names to equal the network id instead of starting with it
    #[arg(long)]
    exact_match: bool,

    /// SMACOF iteration limit
    #[arg(long, default_value_t = DEFAULT_MAX_ITER)]
    max_iter: usize,

    /// SMACOF relative stress tolerance
    #[arg(long, default_value_t = DEFAULT_EPS)]
    eps: f64,

    /// Approximate figure width in pixels
    #[arg(short, long, default_value_t = 700.0)]
    width: f32,

    /// Raster scale multiplier for PNG output (e.g. 2.0 for sharper output)
    #[arg(long, default_value_t = 1.0)]
    png_scale: f32,

    /// Plot dimension 1 horizontally (the published figure plots dimension 2 horizontally)
    #[arg(long)]
    no_swap_axes: bool,

    /// Also write the 2-D coordinates (.csv or .json)
    #[arg(long, value_name = "FILE")]
    coords: Option<PathBuf>,

    /// Print shell completions and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), String> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "foodweb-mds", &mut std::io::stdout());
        return Ok(());
    }

    if args.list_schemes {
        for name in CategoryScheme::list_builtins() {
            println!("{}", name);
        }
        return Ok(());
    }

    let scheme = load_scheme(&args.scheme)?;

    let (Some(distances), Some(metadata), Some(output)) = (args.distances, args.metadata, args.output)
    else {
        return Err("DISTANCES, METADATA and --output are required".to_string());
    };

    let config = RunConfig {
        distances,
        metadata,
        output,
        coords: args.coords,
        mds: MdsConfig {
            mode: args.dissimilarity,
            max_iter: args.max_iter,
            eps: args.eps,
        },
        match_rule: if args.exact_match {
            MatchRule::Exact
        } else {
            MatchRule::Prefix
        },
        style: FigureStyle {
            swap_axes: !args.no_swap_axes,
            ..FigureStyle::default()
        }
        .with_width(args.width),
        png_scale: args.png_scale,
    };

    let mut measure = CosmicTextMeasure::new()?;
    let summary = run(&config, &scheme, &mut measure).map_err(|e| e.to_string())?;
    tracing::info!(
        networks = summary.networks,
        categories = summary.categories,
        stress = summary.stress,
        "done"
    );

    Ok(())
}

/// A readable file wins over a built-in of the same name.
fn load_scheme(name_or_path: &str) -> Result<CategoryScheme, String> {
    let path = std::path::Path::new(name_or_path);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scheme file: {}", e))?;
        CategoryScheme::from_str_any(&content).map_err(|e| e.to_string())
    } else {
        CategoryScheme::from_builtin(name_or_path).map_err(|e| e.to_string())
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
