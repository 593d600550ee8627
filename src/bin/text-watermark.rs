//! Text Watermark CLI tool
//!
//! A command-line tool for stamping a text watermark onto images and PDFs.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::warn;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use text_watermark::pipeline::{self, Frontend, Report};
use text_watermark::process::{InputKind, OutputMode, Watermarker};
use text_watermark::PdfAnchor;

/// Text Watermark - Stamp text onto PNG/JPEG images and PDF documents
#[derive(Parser)]
#[command(name = "text-watermark")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Watermark a photo (always written as JPEG)
    text-watermark apply photo.png -o photo-marked.jpg --font NotoSansSC-Regular.ttf --text \"SAMPLE\"

    # Watermark every page of a PDF, with the font taken from the environment
    WATERMARK_FONT=NotoSansSC-Regular.ttf text-watermark apply report.pdf -o report-marked.pdf --text \"DRAFT\"

    # Wrap a watermarked image in a PDF page and open it
    text-watermark apply scan.jpg -o scan.pdf --pdf --open --text \"COPY\"

    # Show page count of a PDF
    text-watermark info report.pdf")]
struct Cli {
    /// Log each step and the computed placement
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark an image or PDF
    Apply {
        /// Input file (PNG, JPG, JPEG or PDF)
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// TrueType font used to draw the text
        #[arg(long, env = "WATERMARK_FONT")]
        font: Option<PathBuf>,

        /// Watermark text (read from stdin when omitted)
        #[arg(long)]
        text: Option<String>,

        /// Write image inputs as a one-page PDF instead of JPEG
        #[arg(long)]
        pdf: bool,

        /// Placement of the text on PDF pages: "fixed" or "inset"
        #[arg(long, default_value_t = PdfAnchor::Fixed)]
        pdf_anchor: PdfAnchor,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about an image or PDF file
    Info {
        /// File to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Apply { input, output, font, text, pdf, pdf_anchor, open } => {
            let mode = if pdf { OutputMode::Pdf } else { OutputMode::Native };
            cmd_apply(CliFrontend {
                input: Some(input),
                font,
                text,
                output: Some(output),
                mode,
                pdf_anchor,
                open,
            })
        }
        Commands::Info { input } => {
            cmd_info(&input)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Log at warn by default, debug with -v; RUST_LOG wins over both
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Answers pipeline prompts from command-line arguments and stdin
struct CliFrontend {
    input: Option<PathBuf>,
    font: Option<PathBuf>,
    text: Option<String>,
    output: Option<PathBuf>,
    mode: OutputMode,
    pdf_anchor: PdfAnchor,
    open: bool,
}

impl Frontend for CliFrontend {
    fn select_input(&mut self) -> Option<PathBuf> {
        self.input.take()
    }

    fn select_font(&mut self) -> Option<PathBuf> {
        if self.font.is_none() {
            eprintln!("No font given: pass --font or set WATERMARK_FONT");
        }
        self.font.take()
    }

    fn enter_text(&mut self) -> Option<String> {
        if let Some(text) = self.text.take() {
            return Some(text);
        }

        eprint!("Watermark text: ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                warn!("Failed to read watermark text: {}", e);
                None
            }
        }
    }

    fn select_output(&mut self, _input: &Path) -> Option<PathBuf> {
        self.output.take()
    }

    fn configure(&mut self, watermarker: Watermarker) -> Watermarker {
        let watermarker = watermarker.with_mode(self.mode);
        #[cfg(feature = "pdf")]
        let watermarker = watermarker.with_pdf_anchor(self.pdf_anchor);
        #[cfg(not(feature = "pdf"))]
        {
            if self.pdf_anchor != PdfAnchor::Fixed {
                warn!("--pdf-anchor has no effect without PDF support");
            }
        }
        watermarker
    }

    fn report(&mut self, report: &Report) {
        let Report::Completed(outcome) = report else {
            return;
        };

        eprintln!("{}", outcome);

        if self.open {
            if let Err(e) = open_file(&outcome.output) {
                warn!("Could not open {}: {}", outcome.output.display(), e);
            }
        }
    }
}

/// Open a file with the system default application
fn open_file(path: &Path) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Run the watermarking steps with answers from the command line
fn cmd_apply(mut frontend: CliFrontend) -> anyhow::Result<()> {
    match pipeline::run(&mut frontend) {
        Report::Completed(_) => Ok(()),
        Report::Cancelled(step) => bail!("cancelled during {}", step),
        Report::Failed(message) => bail!(message),
    }
}

/// Show image dimensions or PDF page count and title
fn cmd_info(input: &Path) -> anyhow::Result<()> {
    match InputKind::from_path(input)? {
        InputKind::Raster => {
            let (width, height) = image::image_dimensions(input)
                .with_context(|| format!("cannot read {}", input.display()))?;
            println!("File: {}", input.display());
            println!("Size: {}x{} pixels", width, height);
        }
        InputKind::Pdf => print_pdf_info(input)?,
    }
    Ok(())
}

#[cfg(feature = "pdf")]
fn print_pdf_info(input: &Path) -> anyhow::Result<()> {
    let metadata = text_watermark::pdf::extract_metadata(input)?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);
    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    Ok(())
}

#[cfg(not(feature = "pdf"))]
fn print_pdf_info(_input: &Path) -> anyhow::Result<()> {
    Err(text_watermark::Error::PdfUnavailable.into())
}
