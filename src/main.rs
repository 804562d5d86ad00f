use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kagami::config::RawOptions;
use kagami::layer::ImageLayer;
use kagami::provider::PassthroughTransformer;
use kagami::server::KagamiServer;

/// Kagami image host - serves optimized images and generates static renditions
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the options file
    #[arg(short, long, default_value = "kagami.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:3100")]
    listen: String,

    /// Validate options, print the runtime export, and exit
    #[arg(long)]
    test: bool,

    /// Render every image referenced by the HTML files under this
    /// directory, write them beside the pages, and exit
    #[arg(long, value_name = "HTML_DIR")]
    generate: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    kagami::logging::init_subscriber(args.log_json).expect("Failed to initialize logging");

    let raw = RawOptions::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load options: {}", e);
        std::process::exit(1);
    });

    let layer = ImageLayer::initialize(
        &raw,
        &RawOptions::default(),
        Arc::new(PassthroughTransformer),
    )
    .await
    .unwrap_or_else(|e| {
        eprintln!("Failed to initialize image layer: {}", e);
        std::process::exit(1);
    });

    tracing::info!(
        config_file = %args.config.display(),
        provider = layer.options().provider.as_str(),
        base_url = layer.options().static_.base_url.as_str(),
        "Options loaded successfully"
    );

    if args.test {
        match layer.runtime_options().to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to export runtime options: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(html_dir) = args.generate.as_deref() {
        run_generation(&layer, html_dir).await;
        return;
    }

    let server = KagamiServer::bind(&args.listen, Arc::new(layer))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind listener: {}", e);
            std::process::exit(1);
        });

    if let Err(e) = server.run().await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Discover image URLs in rendered pages, materialize them under the
/// image prefix next to the pages, and print the report. Exits nonzero
/// when any rendition failed.
async fn run_generation(layer: &ImageLayer, html_dir: &Path) {
    let bridge = layer.before_generate();

    let mut pages = Vec::new();
    collect_html_files(html_dir, &mut pages);
    if pages.is_empty() {
        eprintln!("No HTML files under {}", html_dir.display());
        std::process::exit(1);
    }

    for page in &pages {
        let html = std::fs::read_to_string(page).unwrap_or_else(|e| {
            eprintln!("Failed to read {}: {}", page.display(), e);
            std::process::exit(1);
        });
        for url in bridge.discover(&html) {
            bridge.map_to_static(&url);
        }
    }

    tracing::info!(
        pages = pages.len(),
        planned = bridge.planned_count(),
        "generation planned"
    );

    let out_dir = html_dir.join(layer.options().static_.base_url.trim_start_matches('/'));
    let report = bridge.run(&out_dir).await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render report: {}", e),
    }

    if !report.is_success() {
        std::process::exit(1);
    }
}

fn collect_html_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Failed to read {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_html_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("html") {
            out.push(path);
        }
    }
}
