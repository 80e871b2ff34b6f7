//! Property tests over whole archives.

use embin_core::{assemble, Archive, Footer, MemoryProvider, ReadableTree, WritableTree, FOOTER_LEN};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Paths whose directory and file names cannot collide
fn path() -> impl Strategy<Value = String> {
    (prop::collection::vec("d[a-z]{0,3}", 0..4), "f[a-z]{0,3}\\.bin").prop_map(|(dirs, file)| {
        let mut path = String::new();
        for part in dirs.iter().chain(std::iter::once(&file)) {
            path.push('/');
            path.push_str(part);
        }
        path
    })
}

fn files() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(path(), prop::collection::vec(any::<u8>(), 0..64), 1..24)
}

fn writable(files: &BTreeMap<String, Vec<u8>>) -> WritableTree {
    let mut tree = WritableTree::new();
    for (path, bytes) in files {
        tree.write_file(path, bytes.clone()).unwrap();
    }
    tree
}

proptest! {
    #[test]
    fn prop_roundtrip_preserves_bytes_and_stat(files in files()) {
        let image = assemble(b"runtime", "/entry", writable(&files)).unwrap();
        let archive = Archive::from_bytes(image).unwrap();
        let tree = archive.tree();

        for (path, bytes) in &files {
            let stat = tree.stat(path);
            prop_assert!(stat.is_file);
            prop_assert!(!stat.is_directory);
            prop_assert_eq!(stat.size, bytes.len() as u64);
            prop_assert_eq!(&tree.read_file_sync(path, 0, None).unwrap()[..], &bytes[..]);

            // Every ancestor is a directory
            let mut dir = path.as_str();
            while let Some(cut) = dir.rfind('/').filter(|&i| i > 0) {
                dir = &dir[..cut];
                prop_assert!(tree.stat(dir).is_directory, "{} should be a directory", dir);
            }
        }
        prop_assert_eq!(tree.files().len(), files.len());
    }

    #[test]
    fn prop_offsets_are_contiguous_and_disjoint(files in files()) {
        let built = writable(&files).build().unwrap();
        let content_len = built.content.len() as u64;
        let tree = ReadableTree::from_buffer(
            &built.header,
            Arc::new(MemoryProvider::new(built.content)),
        )
        .unwrap();

        let mut entries: Vec<_> = tree.files().into_iter().map(|(_, entry)| entry).collect();
        entries.sort_by_key(|e| (e.byte_offset, e.byte_length));

        let mut expected = 0u64;
        for entry in &entries {
            prop_assert_eq!(u64::from(entry.byte_offset), expected);
            expected += u64::from(entry.byte_length);
        }
        prop_assert_eq!(expected, content_len);
    }

    #[test]
    fn prop_footer_is_last_sixteen_bytes(
        runtime in prop::collection::vec(any::<u8>(), 0..512),
        files in files(),
    ) {
        let image = assemble(&runtime, "/entry", writable(&files)).unwrap();
        let footer = Footer::decode(&image[image.len() - FOOTER_LEN..]).unwrap();

        prop_assert_eq!(&image[..runtime.len()], &runtime[..]);
        prop_assert_eq!(footer.header_offset as usize, runtime.len());
        prop_assert_eq!(footer.content_offset, footer.header_offset + footer.header_length);
        prop_assert_eq!(
            footer.content_offset as usize + footer.content_length as usize + FOOTER_LEN,
            image.len()
        );

        let archive = Archive::from_bytes(image).unwrap();
        prop_assert_eq!(archive.entry_path(), "/entry");
        prop_assert_eq!(archive.footer(), footer);
    }

    #[test]
    fn prop_reads_clamp_to_entry(
        bytes in prop::collection::vec(any::<u8>(), 0..64),
        offset in 0u64..128,
        length in prop::option::of(0u64..128),
    ) {
        let mut tree = WritableTree::new();
        tree.write_file("/pad.bin", vec![0xAAu8; 7]).unwrap();
        tree.write_file("/x.bin", bytes.clone()).unwrap();
        tree.write_file("/zz.bin", vec![0xBBu8; 7]).unwrap();
        let archive = Archive::from_bytes(assemble(b"", "/x.bin", tree).unwrap()).unwrap();

        let read = archive.tree().read_file_sync("/x.bin", offset, length).unwrap();
        let start = (offset as usize).min(bytes.len());
        let end = length.map_or(bytes.len(), |l| (start + l as usize).min(bytes.len()));
        prop_assert_eq!(&read[..], &bytes[start..end]);
    }
}
