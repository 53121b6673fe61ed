//! fb2html - FictionBook 2 to XHTML converter

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use fb2html::{AssetDir, ConvertOptions, Host, LoadHandle, LoadStatus};

#[derive(Parser)]
#[command(name = "fb2html")]
#[command(version, about = "FictionBook 2 to XHTML converter", long_about = None)]
#[command(after_help = "EXAMPLES:
    fb2html book.fb2 -o book.html    Convert, images go to book_files/
    fb2html book.fb2 > book.html     Convert to stdout, images go to assets/")]
struct Cli {
    /// Input file (FB2)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (XHTML); stdout when omitted
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for extracted images
    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,

    /// Indentation width, 0 for compact output
    #[arg(long, default_value_t = 2)]
    indent: usize,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,

    /// Log conversion details
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match convert(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn convert(cli: &Cli) -> Result<(), String> {
    let assets_dir = cli
        .assets
        .clone()
        .unwrap_or_else(|| default_assets_dir(cli.output.as_deref()));
    let assets = AssetDir::new(assets_dir);

    let options = ConvertOptions {
        indent: (cli.indent > 0).then_some(cli.indent),
        ..ConvertOptions::default()
    };

    let mut host = CliHost {
        assets,
        base: cli.output.as_deref().and_then(Path::parent).map(Path::to_path_buf),
        output: cli.output.clone(),
        error: None,
    };

    let mut load = LoadHandle::spawn_file(&cli.input, options).map_err(|e| e.to_string())?;
    let status = load.wait(&mut host);
    if let Some(error) = host.error.take() {
        return Err(error);
    }
    if status != LoadStatus::Completed {
        return Err(format!("conversion {status:?}"));
    }

    host.assets.keep();
    if !cli.quiet {
        let stored = host.assets.written().len();
        eprintln!("Converted {}", cli.input.display());
        if stored > 0 {
            eprintln!("Images: {stored} in {}", host.assets.root().display());
        }
    }
    Ok(())
}

fn default_assets_dir(output: Option<&Path>) -> PathBuf {
    match output.and_then(|o| Some((o.parent()?, o.file_stem()?))) {
        Some((parent, stem)) => parent.join(format!("{}_files", stem.to_string_lossy())),
        None => PathBuf::from("assets"),
    }
}

struct CliHost {
    assets: AssetDir,
    /// Directory image paths are made relative to.
    base: Option<PathBuf>,
    output: Option<PathBuf>,
    error: Option<String>,
}

impl Host for CliHost {
    fn resolve_asset_path(&mut self, name: &str) -> String {
        let path = self.assets.path_for(name);
        let relative = self
            .base
            .as_deref()
            .and_then(|base| path.strip_prefix(base).ok())
            .unwrap_or(&path);
        relative.to_string_lossy().replace('\\', "/")
    }

    fn deliver_asset(&mut self, name: &str, data: Vec<u8>) {
        if let Err(e) = self.assets.store(name, &data) {
            warn!(%name, "cannot store image: {e}");
        }
    }

    fn on_completed(&mut self, _name: &str, markup: String) {
        let written = match &self.output {
            Some(path) => fs::write(path, markup.as_bytes()),
            None => io::stdout().lock().write_all(markup.as_bytes()),
        };
        if let Err(e) = written {
            self.error = Some(format!("cannot write output: {e}"));
        }
    }

    fn on_failed(&mut self, reason: &str) {
        self.error = Some(reason.to_string());
    }
}
