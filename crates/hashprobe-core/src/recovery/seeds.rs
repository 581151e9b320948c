/// Built-in seed paths
use flate2::read::DeflateDecoder;
use std::io::Read;

/// Raw-deflate UTF-8 text, one path per line
static SEED_LIST: &[u8] = include_bytes!("../../data/seed_paths.deflate");

/// Split a seed list into paths. Accepts `\n` and `\r\n`; blank lines are skipped.
pub fn parse_seed_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inflate a raw-deflate seed list
pub fn decompress_seed_list(compressed: &[u8]) -> std::io::Result<Vec<String>> {
    let mut text = String::new();
    DeflateDecoder::new(compressed).read_to_string(&mut text)?;
    Ok(parse_seed_list(&text))
}

/// The seed list compiled into the crate
pub fn builtin_seeds() -> std::io::Result<Vec<String>> {
    decompress_seed_list(SEED_LIST)
}
