use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "posterkit", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crop a photo to the square viewport and write the JPEG crop.
    Crop(CropArgs),
    /// Compose the final poster PNG from a template spec and a cropped photo.
    Compose(ComposeArgs),
}

#[derive(Parser, Debug)]
struct CropArgs {
    /// Input photo.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output JPEG path.
    #[arg(long)]
    out: PathBuf,

    /// Square viewport size in pixels.
    #[arg(long, default_value_t = 300)]
    viewport: u32,

    /// Zoom override (defaults to the computed cover scale).
    #[arg(long)]
    scale: Option<f64>,

    /// Horizontal pan in viewport pixels.
    #[arg(long, default_value_t = 0.0)]
    pan_x: f64,

    /// Vertical pan in viewport pixels.
    #[arg(long, default_value_t = 0.0)]
    pan_y: f64,

    /// JPEG quality (0-100).
    #[arg(long, default_value_t = 80)]
    quality: u8,
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Template spec JSON.
    #[arg(long)]
    template: PathBuf,

    /// Cropped user photo.
    #[arg(long)]
    photo: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Crop(args) => cmd_crop(args),
        Command::Compose(args) => cmd_compose(args),
    }
}

fn cmd_crop(args: CropArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read photo '{}'", args.in_path.display()))?;
    let mime = image::guess_format(&bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");

    let config = posterkit::EditorConfig {
        viewport_size: args.viewport,
        crop_quality: args.quality,
        ..Default::default()
    };
    let mut editor = posterkit::TransformEditor::new(config);
    editor.load(&bytes, mime)?;
    if let Some(scale) = args.scale {
        editor.set_scale(scale);
    }
    if args.pan_x != 0.0 || args.pan_y != 0.0 {
        editor.pan(posterkit::Vec2::new(args.pan_x, args.pan_y));
    }
    let crop = editor.confirm()?;

    write_artifact(&args.out, crop.bytes())?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let spec = read_spec_json(&args.template)?;
    spec.validate()?;

    let root = args.template.parent().unwrap_or_else(|| Path::new("."));
    let prepared = posterkit::PreparedTemplate::prepare(&spec, root)?;
    let photo = std::fs::read(&args.photo)
        .with_context(|| format!("read photo '{}'", args.photo.display()))?;

    let poster = posterkit::compose(
        posterkit::RenderTarget::new(spec.canvas),
        &posterkit::ComposeInputs::from_prepared(&prepared, &photo),
    )?;

    write_artifact(&args.out, poster.bytes())?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn read_spec_json(path: &Path) -> anyhow::Result<posterkit::TemplateSpec> {
    let f = File::open(path).with_context(|| format!("open template '{}'", path.display()))?;
    let r = BufReader::new(f);
    let spec: posterkit::TemplateSpec =
        serde_json::from_reader(r).with_context(|| "parse template JSON")?;
    Ok(spec)
}

fn write_artifact(out: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(out, bytes).with_context(|| format!("write '{}'", out.display()))
}
