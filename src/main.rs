extern crate hpcalc;

use anyhow::Context;
use clap::Parser;
use hpcalc::input::ingest;
use hpcalc::library::InMemoryLibrary;
use hpcalc::output::FileOutput;
use hpcalc::read_weather_file::weather_data_to_vec;
use hpcalc::{run_calculation, write_results};
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct HpCalcArgs {
    input_file: String,
    /// reference library of locations, heat pumps and fuels, as JSON
    #[arg(long, short)]
    library: String,
    /// TMY3 weather file to use as the climate of the input's location
    #[arg(long, short)]
    weather_file: Option<String>,
    #[arg(long, short)]
    output_dir: Option<String>,
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = HpCalcArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting tracing subscriber failed")?;

    let input_file = args.input_file.as_str();
    let input_file_ext = Path::new(input_file).extension().and_then(OsStr::to_str);
    let input_file_stem = match input_file_ext {
        Some(ext) => &input_file[..(input_file.len() - ext.len() - 1)],
        None => input_file,
    };
    let input_file_stem = PathBuf::from(input_file_stem);
    let output_key = input_file_stem
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| anyhow::anyhow!("Could not determine input file name"))?;
    let output_dir = match &args.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => input_file_stem
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let input = ingest(BufReader::new(
        File::open(input_file).with_context(|| format!("Could not open {input_file}"))?,
    ))
    .with_context(|| format!("Could not read calculation input from {input_file}"))?;

    let mut library = InMemoryLibrary::from_json(BufReader::new(
        File::open(&args.library).with_context(|| format!("Could not open {}", args.library))?,
    ))
    .with_context(|| format!("Could not read reference library from {}", args.library))?;
    if let Some(weather_file) = &args.weather_file {
        let weather = weather_data_to_vec(BufReader::new(File::open(weather_file)?))
            .with_context(|| format!("Could not parse the weather file {weather_file}"))?;
        info!(site = %weather.site_name, "using climate from weather file");
        library = library.with_weather_file(&input.location_id, weather);
    }

    let result = run_calculation(&input, &library)
        .with_context(|| format!("Calculation failed ({})", input.location_id))?;

    info!("writing out to {}", output_dir.display());
    write_results(
        FileOutput::new(output_dir, "{}.{}".to_string()),
        output_key,
        &result,
    )?;

    Ok(())
}
