use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use contact_sheet::cache::CacheStore;
use contact_sheet::config::Config;
use contact_sheet::photo::Photo;
use contact_sheet::sheet::ContactSheetRenderer;

#[derive(Parser, Debug)]
#[command(
    name = "contact-sheet",
    version,
    about = "Caption photos in their EXIF metadata and print captioned photos as PDF contact sheets"
)]
struct Cli {
    /// Photo files or folders
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// List photos with their captions and exit
    #[arg(long)]
    show: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Write this caption to every given photo ("" clears it)
    #[arg(long = "set-caption", value_name = "TEXT")]
    set_caption: Option<String>,

    /// PDF to write (default: "<folder> Photos.pdf" beside each folder)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print thumbnail cache statistics and exit
    #[arg(long = "cache-stats")]
    cache_stats: bool,

    /// Evict least recently used cache entries and exit
    #[arg(long)]
    evict: bool,

    /// Delete every cache entry and exit
    #[arg(long = "clear-cache")]
    clear_cache: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Photos gathered from one folder argument, or from loose file arguments.
struct PhotoGroup {
    folder: Option<PathBuf>,
    photos: Vec<Photo>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;

    // Cache maintenance
    if cli.cache_stats || cli.evict || cli.clear_cache {
        let cache = CacheStore::open(&config.cache)?;
        if cli.clear_cache {
            let removed = cache.clear();
            println!("Removed {removed} cache file(s)");
        }
        if cli.evict {
            let evicted = cache.evict_old_entries();
            println!("Evicted {evicted} cache file(s)");
        }
        if cli.cache_stats {
            print_cache_stats(&cache, cli.json)?;
        }
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No photos or folders specified. Use --help for usage.");
    }

    let mut groups = collect_photos(&cli.paths);
    let total: usize = groups.iter().map(|g| g.photos.len()).sum();
    if total == 0 {
        anyhow::bail!("No supported photos found in the specified paths.");
    }
    log::info!("Found {total} photo(s)");

    let cache = match CacheStore::open(&config.cache) {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("Metadata cache unavailable: {e:#}");
            None
        }
    };

    // Handle --set-caption
    if let Some(ref text) = cli.set_caption {
        let (mut written, mut failed) = (0, 0);
        for photo in groups.iter_mut().flat_map(|g| g.photos.iter_mut()) {
            match photo.set_caption(Some(text)) {
                Ok(()) => {
                    written += 1;
                    log::info!("Captioned: {}", photo.path().display());
                }
                Err(e) => {
                    failed += 1;
                    log::error!("{e:#}");
                }
            }
        }
        log::info!("Done: {written} captioned, {failed} failed out of {total} photos");
        return Ok(());
    }

    if let Some(ref cache) = cache {
        for photo in groups.iter().flat_map(|g| &g.photos) {
            photo.resolve_cached(cache);
        }
    }

    // Handle --show
    if cli.show {
        if cli.json {
            let rows: Vec<serde_json::Value> = groups
                .iter()
                .flat_map(|g| &g.photos)
                .map(|p| {
                    serde_json::json!({
                        "path": p.path().display().to_string(),
                        "caption": p.caption(),
                        "timestamp": p.timestamp(),
                        "width": p.width(),
                        "height": p.height(),
                        "is_landscape": p.is_landscape(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            for group in &groups {
                print_group(group);
            }
        }
        return Ok(());
    }

    let renderer = ContactSheetRenderer::new(config.pdf.clone());
    let mut written = Vec::new();

    if let Some(ref output) = cli.output {
        let photos: Vec<Photo> = groups.into_iter().flat_map(|g| g.photos).collect();
        render(&renderer, &photos, output)?;
        written.push((output.clone(), photos.len()));
    } else {
        for group in &groups {
            let Some(ref folder) = group.folder else {
                anyhow::bail!("Loose photo files need an explicit --output FILE");
            };
            let output = default_output(folder)?;
            render(&renderer, &group.photos, &output)?;
            written.push((output, group.photos.len()));
        }
    }

    if cli.json {
        let rows: Vec<serde_json::Value> = written
            .iter()
            .map(|(path, photos)| {
                serde_json::json!({ "output": path.display().to_string(), "photos": photos })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }

    Ok(())
}

/// Group folder arguments by folder; loose files go into one group.
fn collect_photos(paths: &[PathBuf]) -> Vec<PhotoGroup> {
    let mut groups = Vec::new();
    let mut loose = Vec::new();

    for path in paths {
        if path.is_dir() {
            groups.push(PhotoGroup {
                folder: Some(path.clone()),
                photos: Photo::from_directory(path),
            });
        } else {
            match Photo::new(path) {
                Ok(photo) => loose.push(photo),
                Err(e) => log::warn!("Skipping {}: {e:#}", path.display()),
            }
        }
    }

    if !loose.is_empty() {
        groups.push(PhotoGroup {
            folder: None,
            photos: loose,
        });
    }
    groups
}

/// "<folder> Photos.pdf" next to the folder.
fn default_output(folder: &Path) -> Result<PathBuf> {
    let folder = folder
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", folder.display()))?;
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Contact Sheet".to_string());
    let parent = folder.parent().unwrap_or(&folder);
    Ok(parent.join(ContactSheetRenderer::default_filename(&name)))
}

fn render(renderer: &ContactSheetRenderer, photos: &[Photo], output: &Path) -> Result<()> {
    log::info!("Rendering {}", output.display());
    renderer.generate(photos, output, |done, total| {
        log::info!("  [{done}/{total}]");
    })
}

fn print_cache_stats(cache: &CacheStore, json: bool) -> Result<()> {
    let stats = cache.get_cache_stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {BOLD}Thumbnail Cache{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    print_row("Size", &format!("{:.2} MB of {} MB", stats.size_mb, stats.max_size_mb));
    print_row("Thumbnails", &stats.thumbnail_count.to_string());
    print_row("Metadata records", &stats.metadata_count.to_string());
    println!();
    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print every photo in a group with its caption.
fn print_group(group: &PhotoGroup) {
    let title = match group.folder {
        Some(ref folder) => folder.display().to_string(),
        None => "Photos".to_string(),
    };
    let captioned = group.photos.iter().filter(|p| p.has_caption()).count();

    println!();
    println!("{BOLD}{title}{RESET} {DIM}({captioned}/{} captioned){RESET}", group.photos.len());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    for photo in &group.photos {
        let (w, h) = photo.dimensions();
        println!("  {BOLD}{}{RESET} {DIM}{w} x {h}, {}{RESET}", photo.name(), photo.timestamp_str());
        match photo.caption() {
            Some(caption) if !caption.is_empty() => print_caption(caption),
            _ => println!("  {DIM}{:<22} : (none){RESET}", "Caption"),
        }
    }
    println!();
}

/// Print a caption row (green).
fn print_caption(caption: &str) {
    let tag_col = format!("{:<22}", "Caption");
    for (i, line) in wrap_text(caption, VAL_WIDTH).iter().enumerate() {
        if i == 0 {
            println!("  {GREEN}{tag_col} : {line}{RESET}");
        } else {
            println!("  {GREEN}{INDENT}{line}{RESET}");
        }
    }
}

/// Print a single row in a display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
