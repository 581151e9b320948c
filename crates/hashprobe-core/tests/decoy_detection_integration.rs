//! Integration tests for decoy detection

mod common;

use common::{sequential_config, sii_unit, ArchiveBuilder};
use hashprobe_core::recovery::sanitize_path;
use hashprobe_core::PathFinder;

const EMPTY_SII: &[u8] = b"SiiNunit\n{\n}\n";

fn game_data(body: &str) -> Vec<u8> {
    sii_unit("game_data", "game.data", body)
}

#[test]
fn test_sanitized_twin_is_reported_as_decoy() {
    let (_file, archive) = ArchiveBuilder::new()
        .file(
            "/def/game_data.sii",
            &game_data("\ttrucks: \"/def/tr|ucks.sii\""),
        )
        .file("/def/tr|ucks.sii", EMPTY_SII)
        .file("/def/trucks.sii", EMPTY_SII)
        .open();

    let outcome = PathFinder::new(archive, sequential_config())
        .discover()
        .unwrap();
    assert_eq!(sanitize_path("/def/tr|ucks.sii"), "/def/trucks.sii");
    assert!(outcome.found_files.contains("/def/tr|ucks.sii"));
    assert!(outcome.decoy_files.contains("/def/trucks.sii"));
    assert!(!outcome.found_files.contains("/def/trucks.sii"));
}

#[test]
fn test_decoy_removed_from_found() {
    let (_file, archive) = ArchiveBuilder::new()
        .file(
            "/def/game_data.sii",
            &game_data("\ttrucks: \"/def/tr|ucks.sii\"\n\tplain: \"/def/trucks.sii\""),
        )
        .file("/def/tr|ucks.sii", EMPTY_SII)
        .file("/def/trucks.sii", EMPTY_SII)
        .open();

    let without = PathFinder::new(
        archive.clone(),
        sequential_config().with_decoy_detection(false),
    )
    .discover()
    .unwrap();
    assert!(without.found_files.contains("/def/trucks.sii"));
    assert!(without.decoy_files.is_empty());

    let with = PathFinder::new(archive, sequential_config())
        .discover()
        .unwrap();
    assert!(!with.found_files.contains("/def/trucks.sii"));
    assert_eq!(with.decoy_files.len(), 1);
    assert!(with.found_files.is_disjoint(&with.decoy_files));
}

#[test]
fn test_sanitized_name_hitting_junk_is_a_decoy() {
    let (_file, archive) = ArchiveBuilder::new()
        .file(
            "/def/game_data.sii",
            &game_data("\ttrucks: \"/def/tr?ucks.sii\""),
        )
        .file("/def/tr?ucks.sii", EMPTY_SII)
        // Claims compression over raw bytes, so it can only be junk
        .shared("/def/trucks.sii", "/def/tr?ucks.sii", true, 64, 13)
        .open();

    let outcome = PathFinder::new(archive, sequential_config())
        .discover()
        .unwrap();
    assert!(outcome.found_files.contains("/def/tr?ucks.sii"));
    assert!(outcome.decoy_files.contains("/def/trucks.sii"));
}

#[test]
fn test_clean_paths_never_produce_decoys() {
    let (_file, archive) = ArchiveBuilder::new()
        .file(
            "/def/game_data.sii",
            &game_data("\ttrucks: \"/def/trucks.sii\""),
        )
        .file("/def/trucks.sii", EMPTY_SII)
        .open();

    let outcome = PathFinder::new(archive, sequential_config())
        .discover()
        .unwrap();
    assert!(outcome.decoy_files.is_empty());
    assert!(outcome.found_files.contains("/def/trucks.sii"));
}
