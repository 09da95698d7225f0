//! Archive member listings.
//!
//! A listing preserves the on-disk member order exactly as stored. Both
//! signature schemes assume that order equals the sorted order of member
//! paths, so it is never re-sorted here.

/// The kind of an archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A directory entry.
    Directory,
    /// A regular file.
    File,
}

impl EntryKind {
    /// Short label used in listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Directory => "dir",
            EntryKind::File => "reg",
        }
    }
}

/// One logical member of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Decoded member path.
    pub path: String,
    /// Member name exactly as stored (UTF-8 for 7z archives).
    pub raw_path: Vec<u8>,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Directory or regular file.
    pub kind: EntryKind,
}

impl ArchiveEntry {
    /// Creates an entry whose stored name is the UTF-8 encoding of `path`.
    pub fn new(path: impl Into<String>, size: u64, kind: EntryKind) -> Self {
        let path = path.into();
        Self {
            raw_path: path.as_bytes().to_vec(),
            path,
            size,
            kind,
        }
    }

    /// Returns true if this entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Ordered member list of one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveListing {
    entries: Vec<ArchiveEntry>,
    dir_count: usize,
    file_count: usize,
    skipped: Vec<String>,
}

impl ArchiveListing {
    /// Creates an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, keeping the directory/file counters in step.
    pub fn push(&mut self, entry: ArchiveEntry) {
        match entry.kind {
            EntryKind::Directory => self.dir_count += 1,
            EntryKind::File => self.file_count += 1,
        }
        self.entries.push(entry);
    }

    /// Records a member that was left out of the listing.
    pub fn push_skipped(&mut self, path: impl Into<String>) {
        self.skipped.push(path.into());
    }

    /// Entries in on-disk order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Member paths in on-disk order.
    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    /// Number of listed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are listed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of directory entries.
    pub fn dir_count(&self) -> usize {
        self.dir_count
    }

    /// Number of regular-file entries.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Returns true if the archive holds exactly one regular file.
    pub fn is_single_file(&self) -> bool {
        self.file_count == 1
    }

    /// Paths of members that are neither directories nor regular files.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Total uncompressed size of all regular files.
    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.size)
            .sum()
    }
}

impl FromIterator<ArchiveEntry> for ArchiveListing {
    fn from_iter<I: IntoIterator<Item = ArchiveEntry>>(iter: I) -> Self {
        let mut listing = Self::new();
        for entry in iter {
            listing.push(entry);
        }
        listing
    }
}
