use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};
use pdf_bundle::{BundleConfig, BundleReport, Bundler, DocumentInfo, Manifest};

/// Merges rendered documentation and specification pages into bookmarked PDFs.
///
/// Every `.pdf` file under `--pages` is ordered by the manifest and merged into
/// the complete bundle. Specification pages are also merged into a second bundle
/// grouped by kind. Rendered pages are deleted once both bundles are written,
/// unless `--keep-pages` is given.
#[derive(Parser)]
#[command(author, version, about = "Merge rendered pages into bookmarked PDF bundles")]
struct Cli {
    /// Reading order manifest (JSON).
    #[arg(long, env = "PDF_BUNDLE_MANIFEST")]
    manifest: PathBuf,

    /// Directory holding the rendered pages.
    #[arg(long, env = "PDF_BUNDLE_PAGES")]
    pages: PathBuf,

    /// Directory receiving the bundles.
    #[arg(long, env = "PDF_BUNDLE_OUT")]
    out: PathBuf,

    /// Specification sources, one sub-directory per kind.
    #[arg(long, env = "PDF_BUNDLE_SPECS_DIR")]
    specs_dir: Option<PathBuf>,

    /// File name of the complete bundle.
    #[arg(long, default_value = pdf_bundle::bundle::DEFAULT_COMPLETE_NAME)]
    complete_name: String,

    /// File name of the specification bundle.
    #[arg(long, default_value = pdf_bundle::bundle::DEFAULT_SPECS_NAME)]
    specs_name: String,

    /// Document title.
    #[arg(long)]
    title: Option<String>,

    /// Document author.
    #[arg(long)]
    author: Option<String>,

    /// Document subject.
    #[arg(long)]
    subject: Option<String>,

    /// Document keywords, comma separated.
    #[arg(long, value_delimiter = ',')]
    keywords: Vec<String>,

    /// Keep the rendered pages after bundling.
    #[arg(long)]
    keep_pages: bool,

    /// Write uncompressed streams.
    #[arg(long)]
    no_compress: bool,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(report) => print_report(&report),
        Err(err) => {
            eprintln!("Error: {}", err);
            print_error_sources(err.as_ref());
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<BundleReport, Box<dyn Error>> {
    let manifest = Manifest::load(&cli.manifest)?;
    let mut info = DocumentInfo::default()
        .with_keywords(cli.keywords.into_iter().map(|keyword| keyword.trim().to_string()))
        .with_creator(format!("pdf-bundle {}", env!("CARGO_PKG_VERSION")));
    if let Some(title) = cli.title {
        info = info.with_title(title);
    }
    if let Some(author) = cli.author {
        info = info.with_author(author);
    }
    if let Some(subject) = cli.subject {
        info = info.with_subject(subject);
    }

    let config = BundleConfig::new(cli.pages, cli.out)
        .with_specs_dir(cli.specs_dir)
        .with_complete_name(cli.complete_name)
        .with_specs_name(cli.specs_name)
        .with_info(info)
        .with_cleanup(!cli.keep_pages)
        .with_compression(!cli.no_compress);

    Ok(Bundler::new(config, manifest).run()?)
}

fn print_report(report: &BundleReport) {
    for output in report.complete.iter().chain(&report.specifications) {
        info!(
            "{}: {} pages, {} bookmarks",
            output.path.display(),
            output.page_count,
            output.bookmark_count
        );
    }
    if report.specifications.is_none() {
        info!("no specification pages found, specification bundle not written");
    }
    if !report.skipped.is_empty() {
        info!("{} pages or entries were left out of the bookmarks", report.skipped.len());
    }
    if report.removed_artifacts > 0 {
        info!("removed {} rendered pages", report.removed_artifacts);
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
