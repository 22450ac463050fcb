use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use kvitto_core::{BinarizeStrategy, Config, ParsedReceipt};
use kvitto_ocr::{OcrBackend, ScanPipeline, ScanReport};

mod report;

#[derive(Parser)]
#[command(name = "kvitto", version, about = "Receipt photo OCR and summarizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one or more single-receipt images.
    Scan {
        /// Receipt image paths (png/jpg).
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[command(flatten)]
        opts: CommonOpts,
    },
    /// Detect and process every receipt in one photograph.
    Multi {
        /// Path to an image containing multiple receipts.
        image: PathBuf,
        #[command(flatten)]
        opts: CommonOpts,
    },
}

#[derive(Args)]
struct CommonOpts {
    /// Use global Otsu binarization instead of the adaptive default.
    #[arg(long)]
    otsu: bool,
    /// Save every intermediate step image to the output directory.
    #[arg(long)]
    save_steps: bool,
    /// Tesseract page segmentation mode.
    #[arg(long)]
    psm: Option<u32>,
    /// OCR language code(s), e.g. "eng" or "eng+swe".
    #[arg(long)]
    lang: Option<String>,
    /// Output directory for JSON summaries and step images.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// TOML configuration file; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Combined multi-receipt document entry: deterministic region order.
#[derive(Serialize)]
struct MultiEntry<'a> {
    identifier: &'a str,
    record: &'a ParsedReceipt,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scan { images, opts } => run_scan(&images, &opts),
        Command::Multi { image, opts } => run_multi(&image, &opts),
    }
}

fn run_scan(images: &[PathBuf], opts: &CommonOpts) -> Result<()> {
    let config = load_config(opts)?;
    let out_dir = config.output.dir.clone();
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create output directory {}", out_dir.display()))?;
    let pipeline = ScanPipeline::new(build_recognizer(&config), config);

    let mut failures = 0usize;
    for image in images {
        match pipeline.scan_file(image) {
            Ok(scan) => print_and_save(&scan, &out_dir)?,
            Err(e) => {
                // A failed image must not take the rest of the batch down.
                failures += 1;
                tracing::warn!(image = %image.display(), error = %e, "scan failed");
                eprintln!("error: {}: {e}", image.display());
            }
        }
    }

    if failures == images.len() {
        bail!("all {failures} image(s) failed");
    }
    Ok(())
}

fn run_multi(image: &PathBuf, opts: &CommonOpts) -> Result<()> {
    let config = load_config(opts)?;
    let out_dir = config.output.dir.clone();
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create output directory {}", out_dir.display()))?;
    let pipeline = ScanPipeline::new(build_recognizer(&config), config);

    let scans = pipeline.scan_multi(image)?;
    if scans.is_empty() {
        bail!("no receipt regions detected in {}", image.display());
    }
    for scan in &scans {
        print_and_save(scan, &out_dir)?;
    }

    let combined: Vec<MultiEntry> = scans
        .iter()
        .map(|s| MultiEntry { identifier: &s.identifier, record: &s.record })
        .collect();
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let combined_path = out_dir.join(format!("{stem}_multi.json"));
    fs::write(&combined_path, serde_json::to_string_pretty(&combined)?)?;
    println!("combined JSON: {}", combined_path.display());
    Ok(())
}

fn print_and_save(scan: &ScanReport, out_dir: &std::path::Path) -> Result<()> {
    println!("== {} ==", scan.identifier);
    println!("{}", report::format_summary(&scan.record));

    let json_path = out_dir.join(format!("{}_summary.json", scan.identifier));
    fs::write(&json_path, serde_json::to_string_pretty(&scan.record)?)?;
    println!("saved JSON: {}", json_path.display());

    if !scan.steps.is_empty() {
        let mut names: Vec<String> =
            scan.steps.values().map(|p| p.display().to_string()).collect();
        names.sort();
        println!("saved steps: {}", names.join(", "));
    }
    println!();
    Ok(())
}

fn load_config(opts: &CommonOpts) -> Result<Config> {
    let mut config = match &opts.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => Config::default(),
    };

    if opts.otsu {
        config.pipeline.strategy = BinarizeStrategy::Otsu;
    }
    if opts.save_steps {
        config.output.save_steps = true;
    }
    if let Some(psm) = opts.psm {
        config.ocr.psm = psm;
    }
    if let Some(lang) = &opts.lang {
        config.ocr.lang = lang.clone();
    }
    if let Some(dir) = &opts.out_dir {
        config.output.dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

#[cfg(feature = "tesseract")]
fn build_recognizer(config: &Config) -> impl OcrBackend {
    kvitto_ocr::TesseractRecognizer::new(None, config.ocr.clone())
}

#[cfg(not(feature = "tesseract"))]
fn build_recognizer(_config: &Config) -> impl OcrBackend {
    // Without the tesseract feature the binary still runs the imaging
    // pipeline and emits bare records; recognition returns no text.
    kvitto_ocr::MockRecognizer::new("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> CommonOpts {
        CommonOpts {
            otsu: false,
            save_steps: false,
            psm: None,
            lang: None,
            out_dir: None,
            config: None,
        }
    }

    #[test]
    fn flags_override_defaults() {
        let opts = CommonOpts {
            otsu: true,
            save_steps: true,
            psm: Some(4),
            lang: Some("swe".into()),
            out_dir: Some(PathBuf::from("elsewhere")),
            config: None,
        };
        let config = load_config(&opts).unwrap();
        assert_eq!(config.pipeline.strategy, BinarizeStrategy::Otsu);
        assert!(config.output.save_steps);
        assert_eq!(config.ocr.psm, 4);
        assert_eq!(config.ocr.lang, "swe");
        assert_eq!(config.output.dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn defaults_pass_validation() {
        let config = load_config(&base_opts()).unwrap();
        assert_eq!(config.pipeline.strategy, BinarizeStrategy::Adaptive);
        assert_eq!(config.output.dir, PathBuf::from("outputs"));
    }

    #[test]
    fn config_file_feeds_values_and_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvitto.toml");
        std::fs::write(&path, "[ocr]\npsm = 11\nlang = \"deu\"\n").unwrap();

        let mut opts = base_opts();
        opts.config = Some(path);
        opts.psm = Some(3);
        let config = load_config(&opts).unwrap();
        assert_eq!(config.ocr.lang, "deu");
        assert_eq!(config.ocr.psm, 3);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let mut opts = base_opts();
        opts.config = Some(PathBuf::from("/no/such/kvitto.toml"));
        assert!(load_config(&opts).is_err());
    }

    #[test]
    fn cli_parses_scan_with_flags() {
        let cli = Cli::try_parse_from([
            "kvitto", "scan", "a.png", "b.png", "--otsu", "--save-steps", "--psm", "6",
        ])
        .unwrap();
        match cli.command {
            Command::Scan { images, opts } => {
                assert_eq!(images.len(), 2);
                assert!(opts.otsu);
                assert!(opts.save_steps);
                assert_eq!(opts.psm, Some(6));
            }
            _ => panic!("expected scan subcommand"),
        }
    }
}
