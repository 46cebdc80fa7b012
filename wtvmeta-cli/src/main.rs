//! # WTV Metadata Dumper
//!
//! Prints the guide metadata embedded in WTV recordings and optionally
//! extracts the thumbnail images.
//!
//! ## Usage
//! ```bash
//! wtvmeta recording.wtv
//! wtvmeta --json --extract-images thumbs/ *.wtv
//!
//! # With debug logging
//! RUST_LOG=wtvmeta=debug wtvmeta recording.wtv
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wtvmeta_core::{MetaType, MetaValue, ParseOptions, WtvMetaParser, WtvMetadata, METADATA_OFFSET};

const USAGE: &str = "\
Usage: wtvmeta [OPTIONS] <FILE>...

Options:
  --json                   Print one JSON object per file
  --offset <N>             Offset of the first record (decimal or 0x hex, default 0x12000)
  --extract-images <DIR>   Write embedded images into DIR
  -h, --help               Show this help";

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    files: Vec<PathBuf>,
    json: bool,
    start_offset: u64,
    image_dir: Option<PathBuf>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<CliOptions> {
    let mut files = Vec::new();
    let mut json = false;
    let mut start_offset = METADATA_OFFSET;
    let mut image_dir = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                return Ok(CliOptions {
                    files,
                    json,
                    start_offset,
                    image_dir,
                    help: true,
                });
            }
            "--json" => {
                json = true;
                i += 1;
            }
            "--offset" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("Missing value for --offset"))?;
                start_offset = parse_offset(value)?;
                i += 2;
            }
            "--extract-images" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("Missing value for --extract-images"))?;
                image_dir = Some(PathBuf::from(value));
                i += 2;
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(anyhow!("Unknown option: {}", flag));
            }
            path => {
                files.push(PathBuf::from(path));
                i += 1;
            }
        }
    }

    if files.is_empty() {
        return Err(anyhow!("No input file given"));
    }

    Ok(CliOptions {
        files,
        json,
        start_offset,
        image_dir,
        help: false,
    })
}

fn parse_offset(value: &str) -> Result<u64> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.with_context(|| format!("Invalid offset: {:?}", value))
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    file: String,
    entries: Vec<EntryReport<'a>>,
}

#[derive(Debug, Serialize)]
struct EntryReport<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: MetaType,
    value: Value,
}

fn value_to_json(value: &MetaValue) -> Value {
    match value {
        MetaValue::Integer(v) => json!(v),
        MetaValue::String(s) | MetaValue::Guid(s) => json!(s),
        MetaValue::Boolean(b) => json!(b),
        MetaValue::Long(v) => json!(v),
        MetaValue::Image { mime, data } => json!({ "mime": mime, "size": data.len() }),
    }
}

fn report<'a>(path: &Path, metadata: &'a WtvMetadata) -> FileReport<'a> {
    FileReport {
        file: path.display().to_string(),
        entries: metadata
            .iter()
            .map(|entry| EntryReport {
                name: &entry.name,
                kind: entry.kind,
                value: value_to_json(&entry.value),
            })
            .collect(),
    }
}

fn print_text<W: Write>(out: &mut W, path: &Path, metadata: &WtvMetadata) -> io::Result<()> {
    writeln!(out, "== {}", path.display())?;
    for entry in metadata {
        writeln!(out, "{}", entry)?;
    }
    Ok(())
}

// ============================================================================
// Image Extraction
// ============================================================================

fn mime_extension(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

fn extract_images(metadata: &WtvMetadata, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (name, mime, data) in metadata.images() {
        if written.is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let target = dir.join(format!("{}.{}", sanitize_file_name(name), mime_extension(mime)));
        fs::write(&target, data).with_context(|| format!("Failed to write {}", target.display()))?;
        info!("Extracted {} ({} bytes) to {}", name, data.len(), target.display());
        written.push(target);
    }
    Ok(written)
}

// ============================================================================
// Main
// ============================================================================

fn run(options: &CliOptions) -> Result<()> {
    let parse_options = ParseOptions {
        start_offset: options.start_offset,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for path in &options.files {
        debug!("Opening {}", path.display());
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let metadata = WtvMetaParser::with_options(file, parse_options)
            .parse()
            .with_context(|| format!("Failed to read metadata from {}", path.display()))?;

        if options.json {
            serde_json::to_writer(&mut out, &report(path, &metadata))?;
            writeln!(out)?;
        } else {
            print_text(&mut out, path, &metadata)?;
        }

        if let Some(dir) = &options.image_dir {
            extract_images(&metadata, dir)?;
        }
    }

    Ok(())
}

fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("wtvmeta=info".parse()?)
        .add_directive("wtvmeta_core=info".parse()?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter()?)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }

    info!("wtvmeta v{} reading {} file(s)", wtvmeta_core::VERSION, options.files.len());
    run(&options)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wtvmeta_core::MetaEntry;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("wtvmeta")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn sample_metadata() -> WtvMetadata {
        let mut metadata = WtvMetadata::new();
        metadata.insert(MetaEntry {
            name: "Title".to_string(),
            kind: MetaType::String,
            value: MetaValue::String("Major Crimes".to_string()),
        });
        metadata.insert(MetaEntry {
            name: "WM/Picture".to_string(),
            kind: MetaType::Image,
            value: MetaValue::Image {
                mime: "image/jpeg".to_string(),
                data: vec![0xFF, 0xD8, 0xFF],
            },
        });
        metadata
    }

    #[test]
    fn parses_defaults() {
        let options = parse_args(&args(&["show.wtv"])).expect("args");
        assert_eq!(options.files, [PathBuf::from("show.wtv")]);
        assert!(!options.json);
        assert_eq!(options.start_offset, METADATA_OFFSET);
        assert_eq!(options.image_dir, None);
    }

    #[test]
    fn parses_all_flags() {
        let options = parse_args(&args(&[
            "--json",
            "--offset",
            "0x2000",
            "--extract-images",
            "thumbs",
            "a.wtv",
            "b.wtv",
        ]))
        .expect("args");
        assert!(options.json);
        assert_eq!(options.start_offset, 0x2000);
        assert_eq!(options.image_dir, Some(PathBuf::from("thumbs")));
        assert_eq!(options.files.len(), 2);
    }

    #[test]
    fn parses_decimal_offset() {
        assert_eq!(parse_offset("4096").expect("offset"), 4096);
        assert!(parse_offset("0xZZ").is_err());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["--bogus", "a.wtv"])).is_err());
        assert!(parse_args(&args(&["a.wtv", "--offset"])).is_err());
    }

    #[test]
    fn help_short_circuits() {
        let options = parse_args(&args(&["--help"])).expect("args");
        assert!(options.help);
    }

    #[test]
    fn maps_mime_to_extension() {
        assert_eq!(mime_extension("image/jpeg"), "jpg");
        assert_eq!(mime_extension("IMAGE/PNG"), "png");
        assert_eq!(mime_extension("application/octet-stream"), "bin");
    }

    #[test]
    fn sanitizes_field_names() {
        assert_eq!(sanitize_file_name("WM/Picture"), "WM_Picture");
        assert_eq!(sanitize_file_name(""), "image");
    }

    #[test]
    fn text_output_lists_entries() {
        let mut out = Vec::new();
        print_text(&mut out, Path::new("show.wtv"), &sample_metadata()).expect("print");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(
            text,
            "== show.wtv\nTitle (String): Major Crimes\nWM/Picture (Image): <image/jpeg, 3 bytes>\n"
        );
    }

    #[test]
    fn log_filter_covers_core_library() {
        let filter = log_filter().expect("filter").to_string();
        assert!(filter.contains("wtvmeta_core=info"));
        assert!(filter.contains("wtvmeta=info"));
    }

    #[test]
    fn json_report_summarises_images() {
        let metadata = sample_metadata();
        let value = serde_json::to_value(report(Path::new("show.wtv"), &metadata)).expect("json");
        assert_eq!(value["file"], "show.wtv");
        assert_eq!(value["entries"][0]["type"], "String");
        assert_eq!(value["entries"][0]["value"], "Major Crimes");
        assert_eq!(value["entries"][1]["value"], json!({ "mime": "image/jpeg", "size": 3 }));
    }

    #[test]
    fn extracts_images_to_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let target = dir.path().join("thumbs");
        let written = extract_images(&sample_metadata(), &target).expect("extract");
        assert_eq!(written, [target.join("WM_Picture.jpg")]);
        assert_eq!(fs::read(&written[0]).expect("read"), [0xFF, 0xD8, 0xFF]);
    }
}
