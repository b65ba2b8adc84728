//! Inspect the projection-data geometry derived from a scanner and a set of
//! compression settings, without building any projector.

use std::path::PathBuf;

use clap::Parser;

use petproj::config::read_config_file;
use petproj::scanner::SCANNER_NAMES;
use petproj::utils::group_digits;
use petproj::{Compression, ProjectionSpace, Scanner};

#[derive(Parser, Debug)]
#[command(name = "projinfo",
          about = "Print the segment table, data shape and derived volume \
                   for a scanner and compression settings")]
struct Cli {
    /// TOML configuration file; the flags below override its settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scanner preset name (see --list-scanners)
    #[arg(long, conflicts_with = "config")]
    scanner: Option<String>,

    /// List the known scanner presets and exit
    #[arg(long)]
    list_scanners: bool,

    /// Axial compression (span); must be odd
    #[arg(long)]
    span: Option<u32>,

    /// Largest |ring difference| to include
    #[arg(long)]
    max_ring_diff: Option<u32>,

    /// Number of angular views
    #[arg(long)]
    views: Option<usize>,

    /// Number of tangential bins
    #[arg(long)]
    tangential_bins: Option<usize>,

    /// Treat the data as arc-corrected
    #[arg(long)]
    arc_corrected: bool,

    /// In-plane zoom of the derived volume
    #[arg(long, default_value_t = 1.0)]
    zoom: f32,
}

fn main() -> petproj::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.list_scanners {
        for name in SCANNER_NAMES { println!("{name}"); }
        return Ok(());
    }

    let mut compression = match (&cli.config, &cli.scanner) {
        (Some(path), _) => read_config_file(path)?.compression()?,
        (None, Some(name)) => Compression::new(Scanner::from_name(name)?),
        (None, None) => Compression::new(Scanner::from_name("mCT")?),
    };
    if let Some(span) = cli.span { compression.span = span; }
    if let Some(diff) = cli.max_ring_diff { compression.max_num_segments = Some(diff); }
    if let Some(views) = cli.views { compression.num_of_views = Some(views); }
    if let Some(bins) = cli.tangential_bins { compression.num_tangential_bins = Some(bins); }
    if cli.arc_corrected { compression.arc_corrected = true; }

    let scanner = &compression.scanner;
    println!("scanner: {} rings x {} detectors, effective radius {:.2} mm, axial length {:.1} mm",
             scanner.num_rings, scanner.num_dets_per_ring,
             scanner.effective_radius(), scanner.axial_length());
    println!("span {}, max ring difference {}, {}",
             compression.span,
             compression.effective_max_ring_diff(),
             if compression.arc_corrected { "arc-corrected" } else { "not arc-corrected" });
    println!();

    let geometry = compression.projection_data_geometry()?;
    println!("segment  ring diffs   axial positions");
    for segment in geometry.segments() {
        println!("{:>7}  {:>4}..={:<4}  {:>8}",
                 segment.segment, segment.min_ring_diff, segment.max_ring_diff,
                 segment.num_axial_poss);
    }
    println!();

    let [n_sino, n_views, n_tang] = geometry.shape();
    println!("shape ({} / {} / {}): {} x {} x {} = {} bins",
             ProjectionSpace::AXIS_LABELS[0],
             ProjectionSpace::AXIS_LABELS[1],
             ProjectionSpace::AXIS_LABELS[2],
             n_sino, n_views, n_tang,
             group_digits(n_sino * n_views * n_tang));
    println!("tangential sampling {:.3} mm", geometry.tangential_sampling);
    println!();

    let fov = compression.volume_geometry(cli.zoom, None, None)?;
    println!("derived volume: {} x {} x {} voxels of {:.3} x {:.3} x {:.3} mm",
             fov.n[0], fov.n[1], fov.n[2],
             fov.voxel_size[0], fov.voxel_size[1], fov.voxel_size[2]);
    Ok(())
}
