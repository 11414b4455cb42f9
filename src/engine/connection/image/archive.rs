//! Tar packaging of an image build context.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::Metadata;
use cap_std::fs_utf8::Dir;
use tar::{Builder, EntryType, Header};

const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Archive every directory and regular file below `context_dir`.
///
/// Entries are written in lexical order with paths relative to the context
/// root, so the same tree always produces the same archive. Symlinks and
/// special files are skipped.
pub(super) fn build_context_archive(context_dir: &Dir) -> io::Result<Vec<u8>> {
    let mut builder = Builder::new(vec![]);
    append_tree(&mut builder, context_dir, Utf8Path::new(""))?;
    builder.finish()?;
    builder.into_inner()
}

fn append_tree(builder: &mut Builder<Vec<u8>>, dir: &Dir, prefix: &Utf8Path) -> io::Result<()> {
    let mut names = vec![];
    for entry_result in dir.entries()? {
        let entry = entry_result?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() || file_type.is_file() {
            names.push((entry.file_name()?, file_type.is_dir()));
        }
    }
    names.sort_unstable();

    for (name, is_dir) in names {
        let relative: Utf8PathBuf = prefix.join(&name);
        let metadata = dir.metadata(&name)?;
        if is_dir {
            let mut header = header_for(EntryType::Directory, 0, &metadata, DEFAULT_DIRECTORY_MODE);
            builder.append_data(&mut header, format!("{}/", archive_path(&relative)), io::empty())?;
            append_tree(builder, &dir.open_dir(&name)?, &relative)?;
        } else {
            let mut header =
                header_for(EntryType::Regular, metadata.len(), &metadata, DEFAULT_FILE_MODE);
            let mut file = dir.open(&name)?;
            builder.append_data(&mut header, archive_path(&relative), &mut file)?;
        }
    }
    Ok(())
}

fn header_for(kind: EntryType, size: u64, metadata: &Metadata, fallback_mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(metadata_mode(metadata, fallback_mode));
    header.set_cksum();
    header
}

fn archive_path(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

#[cfg(unix)]
fn metadata_mode(metadata: &Metadata, _fallback: u32) -> u32 {
    use cap_std::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn metadata_mode(_metadata: &Metadata, fallback: u32) -> u32 {
    fallback
}
