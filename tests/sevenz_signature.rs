//! torrent7z trailer tests against hand-built archives.

mod common;

use common::{
    HeaderEncoding, Member, TWO_TEXT_FILES, flip_bit_from_end, read, sevenz_bytes, sevenz_bytes_with,
    torrent7z_trailer, write_temp,
};
use torrentsig::sevenz::signature::SIGNATURE_LEN;
use torrentsig::{
    ArchiveFormat, ArchiveSignatureEngine, EngineOptions, EntryKind, Error, ResourceLimits,
    SevenZipArchive, SignFlags, SignOutcome, TorrentArchive,
};

fn open(path: &std::path::Path) -> SevenZipArchive {
    SevenZipArchive::open(path, SignFlags::default(), &ResourceLimits::new()).unwrap()
}

/// Members spread over more than two 128-byte windows.
fn large_members() -> Vec<Member<'static>> {
    vec![
        Member::File("disk1.bin", &[0x5A; 300]),
        Member::File("disk2.bin", &[0xA5; 300]),
    ]
}

#[test]
fn test_sign_appends_expected_trailer() {
    let original = sevenz_bytes(&large_members());
    let (_dir, path) = write_temp("set.7z", &original);
    let archive = open(&path);

    assert!(!archive.is_signed().unwrap());
    assert_eq!(archive.sign().unwrap(), SignOutcome::Added);

    let bytes = read(&path);
    assert_eq!(bytes.len(), original.len() + SIGNATURE_LEN);
    assert_eq!(&bytes[..original.len()], &original[..]);
    assert_eq!(&bytes[original.len()..], &torrent7z_trailer(&original, 1));
    assert!(archive.is_valid().unwrap());
}

#[test]
fn test_small_archive_windows_overlap() {
    let original = sevenz_bytes(TWO_TEXT_FILES);
    assert!(original.len() < 256);
    let (_dir, path) = write_temp("small.7z", &original);
    let archive = open(&path);

    archive.sign().unwrap();
    assert_eq!(&read(&path)[original.len()..], &torrent7z_trailer(&original, 1));
    archive.verify().unwrap();
}

#[test]
fn test_single_file_bit() {
    let original = sevenz_bytes(&[Member::File("only.bin", b"single")]);
    let (_dir, path) = write_temp("single.7z", &original);
    let archive = open(&path);
    assert!(archive.contents().is_single_file());

    archive.sign().unwrap();
    let bytes = read(&path);
    assert_eq!(bytes[bytes.len() - 18], 3);
    assert_eq!(&bytes[original.len()..], &torrent7z_trailer(&original, 3));
}

#[test]
fn test_engine_flags_reach_bitmask() {
    let original = sevenz_bytes(TWO_TEXT_FILES);
    let (_dir, path) = write_temp("flags.7z", &original);
    let engine = ArchiveSignatureEngine::with_options(
        EngineOptions::new().unicode(false).strip_filenames(true),
    );

    let archive = engine.open(&path).unwrap();
    assert_eq!(archive.format(), ArchiveFormat::SevenZip);
    archive.sign().unwrap();
    assert_eq!(&read(&path)[original.len()..], &torrent7z_trailer(&original, 4));

    // the same file checked with default flags carries the wrong bitmask
    assert!(!open(&path).is_valid().unwrap());
}

#[test]
fn test_strip_inverts_sign() {
    let original = sevenz_bytes(&large_members());
    let (_dir, path) = write_temp("set.7z", &original);
    let archive = open(&path);

    archive.sign().unwrap();
    archive.strip().unwrap();
    assert_eq!(read(&path), original);
    assert!(!archive.is_signed().unwrap());
}

#[test]
fn test_strip_unsigned_leaves_file_alone() {
    let original = sevenz_bytes(TWO_TEXT_FILES);
    let (_dir, path) = write_temp("plain.7z", &original);

    assert!(matches!(
        open(&path).strip(),
        Err(Error::SignatureAbsent { .. })
    ));
    assert_eq!(read(&path), original);
}

#[test]
fn test_resign_valid_archive_keeps_bytes() {
    let (_dir, path) = write_temp("set.7z", &sevenz_bytes(&large_members()));
    let archive = open(&path);
    archive.sign().unwrap();
    let signed = read(&path);

    assert_eq!(archive.sign().unwrap(), SignOutcome::AlreadyValid);
    assert_eq!(read(&path), signed);
}

#[test]
fn test_corrupt_crc_is_signed_but_invalid() {
    let (_dir, path) = write_temp("set.7z", &sevenz_bytes(&large_members()));
    let archive = open(&path);
    archive.sign().unwrap();
    let signed = read(&path);

    flip_bit_from_end(&path, SIGNATURE_LEN);
    assert!(archive.is_signed().unwrap());
    assert!(!archive.is_valid().unwrap());
    assert!(matches!(
        archive.verify(),
        Err(Error::SignatureMismatch { .. })
    ));

    assert_eq!(archive.sign().unwrap(), SignOutcome::Replaced);
    assert_eq!(read(&path), signed);
}

#[test]
fn test_damaged_tag_reads_as_unsigned() {
    let (_dir, path) = write_temp("set.7z", &sevenz_bytes(TWO_TEXT_FILES));
    let archive = open(&path);
    archive.sign().unwrap();

    flip_bit_from_end(&path, 1);
    assert!(!archive.is_signed().unwrap());
    assert!(matches!(
        archive.verify(),
        Err(Error::SignatureAbsent { .. })
    ));
}

#[test]
fn test_listing_kinds_and_order() {
    let members = [
        Member::Dir("roms"),
        Member::File("roms/empty.txt", b""),
        Member::File("roms/game.bin", b"payload"),
        Member::File("roms/zz.bin", b"more payload"),
    ];
    let (_dir, path) = write_temp("tree.7z", &sevenz_bytes(&members));
    let listing = open(&path).contents().clone();

    assert_eq!(
        listing.paths(),
        vec!["roms", "roms/empty.txt", "roms/game.bin", "roms/zz.bin"]
    );
    let kinds: Vec<_> = listing.entries().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EntryKind::Directory, EntryKind::File, EntryKind::File, EntryKind::File]
    );
    let sizes: Vec<_> = listing.entries().iter().map(|e| e.size).collect();
    assert_eq!(sizes, vec![0, 0, 7, 12]);
    assert_eq!(listing.dir_count(), 1);
    assert_eq!(listing.file_count(), 3);
    assert!(!listing.is_single_file());
}

#[test]
fn test_listing_survives_signing() {
    let (_dir, path) = write_temp("set.7z", &sevenz_bytes(TWO_TEXT_FILES));
    let before = open(&path).contents().paths();
    open(&path).sign().unwrap();
    assert_eq!(open(&path).contents().paths(), before);
}

#[test]
fn test_copy_encoded_header() {
    let bytes = sevenz_bytes_with(TWO_TEXT_FILES, HeaderEncoding::Copy);
    let (_dir, path) = write_temp("encoded.7z", &bytes);
    let archive = open(&path);

    assert_eq!(archive.contents().paths(), vec!["a.txt", "b.txt"]);
    assert_eq!(archive.contents().total_size(), 30);
    archive.sign().unwrap();
    assert!(archive.is_valid().unwrap());
}

#[cfg(feature = "lzma")]
#[test]
fn test_lzma2_encoded_header() {
    let members = [
        Member::Dir("set"),
        Member::File("set/a.bin", b"first member"),
        Member::File("set/b.bin", b"second member"),
    ];
    let bytes = sevenz_bytes_with(&members, HeaderEncoding::Lzma2);
    let (_dir, path) = write_temp("packed.7z", &bytes);
    let archive = open(&path);

    assert_eq!(
        archive.contents().paths(),
        vec!["set", "set/a.bin", "set/b.bin"]
    );
    assert_eq!(archive.contents().dir_count(), 1);
}

#[test]
fn test_empty_archive() {
    let (_dir, path) = write_temp("empty.7z", &sevenz_bytes(&[]));
    let archive = open(&path);
    assert!(archive.contents().is_empty());
    archive.sign().unwrap();
    assert!(archive.is_valid().unwrap());
}

#[test]
fn test_too_short_for_7z() {
    let (_dir, path) = write_temp("tiny.7z", &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]);
    assert!(matches!(
        SevenZipArchive::open(&path, SignFlags::default(), &ResourceLimits::new()),
        Err(Error::InvalidFormat(_))
    ));
}

#[test]
fn test_entry_limit() {
    let (_dir, path) = write_temp("set.7z", &sevenz_bytes(&large_members()));
    let limits = ResourceLimits::new().max_entries(1);
    assert!(matches!(
        SevenZipArchive::open(&path, SignFlags::default(), &limits),
        Err(Error::ResourceLimitExceeded(_))
    ));
}

#[test]
fn test_header_crc_mismatch() {
    let mut bytes = sevenz_bytes(TWO_TEXT_FILES);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let (_dir, path) = write_temp("corrupt.7z", &bytes);
    assert!(matches!(
        SevenZipArchive::open(&path, SignFlags::default(), &ResourceLimits::new()),
        Err(Error::CorruptHeader { .. })
    ));
}
