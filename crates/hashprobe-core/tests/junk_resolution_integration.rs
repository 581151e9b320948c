//! Integration tests for duplicate-offset junk resolution

mod common;

use common::{hash, parallel_config, sequential_config, sii_unit, zlib, ArchiveBuilder};
use hashprobe_core::recovery::resolve_junk;
use hashprobe_core::{Archive, JunkKind, PathFinder};

fn city_content() -> Vec<u8> {
    sii_unit(
        "city_data",
        "city.berlin",
        "\tcity_name: \"Berlin\"\n\tneighbour: \"/def/fake.sii\"",
    )
}

/// A genuine compressed entry plus two planted entries sharing its offset
fn planted_archive() -> ArchiveBuilder {
    let city = city_content();
    let stored_len = zlib(&city).len() as u32;
    ArchiveBuilder::new()
        .compressed_file("/def/city.sii", &city)
        // Stored bytes begin with 0x78 but this entry claims to be raw
        .shared("/def/fake.sii", "/def/city.sii", false, stored_len, stored_len)
        // Compressed, but declares the wrong inflated size
        .shared(
            "/def/broken.sii",
            "/def/city.sii",
            true,
            city.len() as u32 + 5,
            stored_len,
        )
        .file("/def/camera.sii", b"SiiNunit\n{\n}\n")
        // Raw, but its declared payload overruns the next entry
        .shared("/def/sign.sii", "/def/camera.sii", false, 500, 500)
}

#[test]
fn test_shared_offset_classification() {
    let (_file, archive) = planted_archive().open();
    let mut reader = archive.open_reader().unwrap();
    let junk = resolve_junk(&*archive, &mut reader).unwrap();

    assert_eq!(junk.len(), 5);
    assert_eq!(junk[&hash("/def/fake.sii")], JunkKind::ConfirmedJunk);
    assert_eq!(junk[&hash("/def/broken.sii")], JunkKind::ConfirmedJunk);
    assert_eq!(junk[&hash("/def/sign.sii")], JunkKind::ConfirmedJunk);
    assert_eq!(junk[&hash("/def/city.sii")], JunkKind::MaybeJunk);
    assert_eq!(junk[&hash("/def/camera.sii")], JunkKind::MaybeJunk);
}

#[test]
fn test_junk_resolution_is_deterministic() {
    let (_file, archive) = planted_archive().open();
    let first = resolve_junk(&*archive, &mut archive.open_reader().unwrap()).unwrap();
    let second = resolve_junk(&*archive, &mut archive.open_reader().unwrap()).unwrap();
    assert_eq!(first, second);

    let sequential = PathFinder::new(archive.clone(), sequential_config())
        .discover()
        .unwrap();
    let parallel = PathFinder::new(archive, parallel_config())
        .discover()
        .unwrap();
    assert_eq!(sequential.junk, parallel.junk);
}

#[test]
fn test_genuine_entry_promoted_and_planted_entries_ignored() {
    let (_file, archive) = planted_archive().open();
    let outcome = PathFinder::new(archive, sequential_config())
        .discover()
        .unwrap();

    assert!(outcome.found_files.contains("/def/city.sii"));
    assert!(outcome.found_files.contains("/def/camera.sii"));
    // Referenced and seeded, but their entries are planted
    assert!(!outcome.found_files.contains("/def/fake.sii"));
    assert!(!outcome.found_files.contains("/def/sign.sii"));
    assert!(outcome.referenced_files.contains("/def/fake.sii"));

    assert!(!outcome.junk.contains_key(&hash("/def/city.sii")));
    assert!(!outcome.junk.contains_key(&hash("/def/camera.sii")));
    assert_eq!(outcome.junk_count(JunkKind::ConfirmedJunk), 3);
    assert_eq!(outcome.junk_count(JunkKind::MaybeJunk), 0);
}

#[test]
fn test_unreadable_entry_becomes_junk() {
    let (_file, archive) = ArchiveBuilder::new()
        .corrupt_file("/def/climate.sii", b"definitely not zlib", 64)
        .file("/def/country.sii", b"SiiNunit\n{\n}\n")
        .open();

    let outcome = PathFinder::new(archive, sequential_config())
        .discover()
        .unwrap();
    assert!(!outcome.found_files.contains("/def/climate.sii"));
    assert!(outcome.found_files.contains("/def/country.sii"));
    assert_eq!(
        outcome.junk.get(&hash("/def/climate.sii")),
        Some(&JunkKind::ConfirmedJunk)
    );
    assert!(outcome.metrics.decompress_failures >= 1);
}

#[test]
fn test_found_and_junk_are_disjoint() {
    let (_file, archive) = planted_archive().open();
    let outcome = PathFinder::new(archive.clone(), parallel_config())
        .discover()
        .unwrap();

    for path in &outcome.found_files {
        assert!(
            !outcome.junk.contains_key(&archive.hash_path(path)),
            "{} is both found and junk",
            path
        );
        assert!(!outcome.decoy_files.contains(path));
    }
}

#[test]
fn test_entry_past_end_of_archive_becomes_junk() {
    let (_file, archive) = ArchiveBuilder::new()
        .compressed_file("/def/city.sii", &city_content())
        .at_offset("/def/unreached.bin", u64::MAX - 3, 8)
        .open();

    for config in [sequential_config(), parallel_config()] {
        let outcome = PathFinder::new(archive.clone(), config).discover().unwrap();
        assert_eq!(
            outcome.junk.get(&hash("/def/unreached.bin")),
            Some(&JunkKind::ConfirmedJunk)
        );
        assert!(!outcome.found_files.contains("/def/unreached.bin"));
    }
}

#[test]
fn test_junk_directory_is_never_listed() {
    // "secret.sii\n" is 11 bytes; the planted entry claims 12 and overruns the next blob
    let (_file, archive) = ArchiveBuilder::new()
        .dir("/realdir", &["secret.sii"], &[])
        .shared_dir("/planted", "/realdir", 12, 12)
        .compressed_file(
            "/planted/secret.sii",
            &sii_unit("secret_data", "secret.one", "\tvalue: 1"),
        )
        .open();
    let config = sequential_config().with_extra_seeds(["/planted", "/realdir"]);

    let outcome = PathFinder::new(archive, config).discover().unwrap();
    assert_eq!(
        outcome.junk.get(&hash("/planted")),
        Some(&JunkKind::ConfirmedJunk)
    );
    assert!(!outcome.found_files.contains("/planted/secret.sii"));
}

#[test]
fn test_payload_inflating_past_declared_size_becomes_junk() {
    let bomb = zlib(&vec![b'a'; 64 * 1024]);
    let (_file, archive) = ArchiveBuilder::new()
        .corrupt_file("/def/bomb.sii", &bomb, 16)
        .open();
    let config = sequential_config().with_extra_seeds(["/def/bomb.sii"]);

    let outcome = PathFinder::new(archive, config).discover().unwrap();
    assert!(!outcome.found_files.contains("/def/bomb.sii"));
    assert_eq!(
        outcome.junk.get(&hash("/def/bomb.sii")),
        Some(&JunkKind::ConfirmedJunk)
    );
    assert!(outcome.metrics.decompress_failures >= 1);
}
