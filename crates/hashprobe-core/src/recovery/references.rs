//! Per-format reference extraction
//!
//! Each extractor turns decoded content into raw path strings. Strings are not normalized or
//! validated here; the candidate model does that. Any structured parse failure falls back to
//! [`blob_scan`], which pulls every `/`-prefixed run out of the raw bytes.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::archive::join_path;
use crate::formats::{decode_text, ContentParsers, SiiDocument, SiiValue};

use super::candidates::{extension_of, parent_dir};
use super::metrics::Metrics;
use super::signatures::FileType;

/// Unit classes whose attributes never name files
const IGNORED_UNIT_CLASSES: &[&str] = &["localization_db", "input_device_config"];

/// Metadata keys whose string values look like paths but are unit names or labels
const IGNORED_KEYS: &[&str] = &[
    "name",
    "sort_name",
    "info",
    "category",
    "brand",
    "suitable_for",
    "conflict_with",
    "defaults",
    "overrides",
    "requires",
    "compatible_versions",
    "dlc_id",
];

/// Classes whose strings are inline markup rather than paths
const UI_TEXT_CLASSES: &[&str] = &[
    "ui::text",
    "ui::text_common",
    "ui::marked_text",
    "ui::html_text",
];

const ACCESSORY_ICON_DIR: &str = "/material/ui/accessory/";

fn markup_regex() -> &'static Regex {
    static MARKUP_REGEX: OnceLock<Regex> = OnceLock::new();
    MARKUP_REGEX.get_or_init(|| {
        Regex::new(r#"(?:src|face)\s*=\s*"?([^"\s>]+)"#).expect("Invalid markup regex")
    })
}

fn font_image_regex() -> &'static Regex {
    static FONT_IMAGE_REGEX: OnceLock<Regex> = OnceLock::new();
    FONT_IMAGE_REGEX.get_or_init(|| {
        Regex::new(r"image:\s*([^,\r\n]+?)\s*,").expect("Invalid font image regex")
    })
}

/// Read-only state an extractor may consult
pub struct ExtractContext<'a> {
    pub parsers: &'a dyn ContentParsers,
    /// Directories known to hold material-relative textures
    pub relative_dirs: &'a BTreeSet<String>,
    /// Whether a normalized path exists as a file in the archive
    pub file_exists: &'a (dyn Fn(&str) -> bool + Sync),
    pub metrics: Option<&'a Metrics>,
}

impl std::fmt::Debug for ExtractContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractContext")
            .field("relative_dirs", &self.relative_dirs.len())
            .finish()
    }
}

/// Resolve `path` against the directory of `origin`. Absolute paths pass through; relative
/// ones are dropped when there is no origin to resolve against.
fn resolve_relative(path: &str, origin: Option<&str>) -> Option<String> {
    if path.starts_with('/') {
        return Some(path.to_string());
    }
    origin.map(|origin| join_path(parent_dir(origin), path))
}

/// Extract path strings from `data` according to its type
pub fn extract_references(
    ctx: &ExtractContext<'_>,
    file_type: FileType,
    data: &[u8],
    origin_path: Option<&str>,
) -> Vec<String> {
    let structured = match file_type {
        FileType::Sii | FileType::Sui => ctx
            .parsers
            .parse_sii(data)
            .map(|doc| sii_references(&doc, origin_path)),
        FileType::SoundRef => return soundref_references(&decode_text(data)),
        FileType::Font => return font_references(&decode_text(data)),
        FileType::Tobj => ctx.parsers.parse_tobj(data).map(|paths| {
            paths
                .iter()
                .filter_map(|p| resolve_relative(p, origin_path))
                .collect()
        }),
        FileType::Pmd => ctx
            .parsers
            .parse_model(data)
            .map(|looks| looks.into_iter().flatten().collect()),
        FileType::Mat => ctx
            .parsers
            .parse_material(data)
            .map(|slots| material_references(ctx, &slots, origin_path)),
        _ => return blob_scan(data),
    };

    match structured {
        Ok(paths) => paths,
        Err(e) => {
            if let Some(metrics) = ctx.metrics {
                metrics.record_parse_fallback();
            }
            tracing::warn!(
                "Falling back to blob scan for {} ({}): {}",
                origin_path.unwrap_or("<unnamed>"),
                file_type,
                e
            );
            blob_scan(data)
        }
    }
}

/// Substring between an optional `tag|` prefix and a trailing `#fragment`
fn sound_path(value: &str) -> &str {
    let value = match value.find('|') {
        Some(i) => &value[i + 1..],
        None => value,
    };
    match value.find('#') {
        Some(i) => &value[..i],
        None => value,
    }
}

fn icon_path(value: &str) -> String {
    let value = value.trim_start_matches('/');
    if extension_of(value).is_some() {
        format!("{}{}", ACCESSORY_ICON_DIR, value)
    } else {
        format!("{}{}.mat", ACCESSORY_ICON_DIR, value)
    }
}

fn scalar_references(class: &str, key: &str, value: &str, out: &mut Vec<String>) {
    if UI_TEXT_CLASSES.contains(&class) {
        for caps in markup_regex().captures_iter(value) {
            out.push(caps[1].to_string());
        }
    } else if key == "icon" && class != "mod_package" {
        out.push(icon_path(value));
    } else if key.contains("sound") {
        out.push(sound_path(value).to_string());
    } else {
        out.push(value.to_string());
    }
}

/// References from a parsed SII/SUI document
pub fn sii_references(doc: &SiiDocument, origin_path: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();

    for include in &doc.includes {
        if let Some(path) = resolve_relative(include, origin_path) {
            out.push(path);
        }
    }

    for unit in &doc.units {
        if IGNORED_UNIT_CLASSES.contains(&unit.class.as_str()) {
            continue;
        }
        for (key, value) in &unit.attributes {
            if IGNORED_KEYS.contains(&key.as_str()) {
                continue;
            }
            match value {
                SiiValue::Str(s) => scalar_references(&unit.class, key, s, &mut out),
                SiiValue::List(items) => {
                    for item in items.iter().filter_map(SiiValue::as_str) {
                        let item = if key == "sounds" {
                            match item.split('|').nth(1) {
                                Some(field) => field,
                                None => item,
                            }
                        } else {
                            item
                        };
                        scalar_references(&unit.class, key, item, &mut out);
                    }
                }
                SiiValue::Other(_) => {}
            }
        }
    }

    out
}

/// `source="/path#event"` lines of a sound reference file
pub fn soundref_references(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("source="))
        .filter_map(|line| {
            let start = line.find('"')? + 1;
            let rest = &line[start..];
            let end = rest
                .find('#')
                .or_else(|| rest.find('"'))
                .unwrap_or(rest.len());
            Some(rest[..end].to_string())
        })
        .collect()
}

/// `image:<path>,` tokens of a font descriptor
pub fn font_references(text: &str) -> Vec<String> {
    font_image_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn material_references(
    ctx: &ExtractContext<'_>,
    slots: &[crate::formats::TextureSlot],
    origin_path: Option<&str>,
) -> Vec<String> {
    let mut out = Vec::new();
    for source in slots.iter().filter_map(|slot| slot.source()) {
        if source.is_empty() {
            continue;
        }
        if source.starts_with('/') {
            out.push(source.to_string());
        } else if let Some(origin) = origin_path {
            out.push(join_path(parent_dir(origin), source));
        } else {
            // Unnamed material: try every directory known to hold relative textures
            for dir in ctx.relative_dirs {
                let candidate = join_path(dir, source);
                if (ctx.file_exists)(&candidate) {
                    out.push(candidate);
                }
            }
        }
    }
    out
}

/// Every run of bytes that starts at `/` and ends at a control character, a quote, or the end
/// of the buffer
pub fn blob_scan(data: &[u8]) -> Vec<String> {
    let is_terminator = |b: u8| b < 0x20 || b == 0x7F || b == b'"';
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'/' {
            i += 1;
            continue;
        }
        let end = data[i..]
            .iter()
            .position(|&b| is_terminator(b))
            .map_or(data.len(), |n| i + n);
        if end - i > 1 {
            out.push(String::from_utf8_lossy(&data[i..end]).into_owned());
        }
        i = end.max(i + 1);
    }
    out
}
