//! Tests for the in-memory filesystem

use super::*;
use crate::storage::BlockStorageKind;
use std::io::{Read, Write};

fn filesystems() -> Vec<MemoryFileSystem> {
    [BlockStorageKind::Heap, BlockStorageKind::MappedFile]
        .into_iter()
        .map(|storage| {
            MemoryFileSystem::with_config(MapperConfig {
                block_size: 32,
                storage,
                ..MapperConfig::default()
            })
            .unwrap()
        })
        .collect()
}

#[test]
fn test_normalize_path() {
    assert_eq!(normalize_path("a/b.java").unwrap(), "/a/b.java");
    assert_eq!(normalize_path("//a///b.java").unwrap(), "/a/b.java");
    assert_eq!(normalize_path("a\\b.java").unwrap(), "/a/b.java");
    assert!(matches!(normalize_path("/"), Err(BlockError::InvalidPath(_))));
    assert!(matches!(normalize_path(""), Err(BlockError::InvalidPath(_))));
    assert!(matches!(normalize_path("a/../b"), Err(BlockError::InvalidPath(_))));
    assert!(matches!(normalize_path("./a"), Err(BlockError::InvalidPath(_))));
}

#[test]
fn test_write_read_rewrite() {
    for fs in filesystems() {
        fs.write("/gen/Lexer.java", b"class Lexer {}").unwrap();
        assert!(fs.exists("gen/Lexer.java"));
        assert_eq!(fs.read("/gen/Lexer.java").unwrap(), b"class Lexer {}");

        let long = "x".repeat(500);
        fs.write("/gen/Lexer.java", long.as_bytes()).unwrap();
        assert_eq!(fs.read("/gen/Lexer.java").unwrap(), long.as_bytes());
        assert_eq!(fs.len("/gen/Lexer.java").unwrap(), 500);
        assert_eq!(fs.file_count(), 1);
        assert_eq!(fs.mapper().live_records(), 1);
    }
}

#[test]
fn test_delete_and_missing() {
    for fs in filesystems() {
        fs.write("/a.class", &[0xCA, 0xFE, 0xBA, 0xBE]).unwrap();
        fs.delete("/a.class").unwrap();

        assert!(!fs.exists("/a.class"));
        assert!(fs.is_empty());
        assert!(matches!(fs.read("/a.class"), Err(BlockError::FileNotFound(_))));
        assert!(matches!(fs.delete("/a.class"), Err(BlockError::FileNotFound(_))));
        assert_eq!(fs.mapper().live_records(), 0);
    }
}

#[test]
fn test_list_prefix() {
    for fs in filesystems() {
        fs.write("/src/A.java", b"a").unwrap();
        fs.write("/src/sub/B.java", b"b").unwrap();
        fs.write("/srcx/C.java", b"c").unwrap();
        fs.write("/D.java", b"d").unwrap();

        assert_eq!(
            fs.list("/src").unwrap(),
            vec!["/src/A.java".to_string(), "/src/sub/B.java".to_string()]
        );
        assert_eq!(fs.list("/").unwrap().len(), 4);
        assert_eq!(fs.list("").unwrap().len(), 4);
        assert!(fs.list("/nothing").unwrap().is_empty());
    }
}

#[test]
fn test_streams() {
    for fs in filesystems() {
        {
            let mut out = fs.open_write("/out/Parser.class").unwrap();
            out.write_all(b"compiled ").unwrap();
            out.write_all(b"bytes").unwrap();
            out.close().unwrap();
        }

        let mut content = String::new();
        fs.open_read("/out/Parser.class")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "compiled bytes");
    }
}

#[test]
fn test_compact_keeps_files() {
    for fs in filesystems() {
        for i in 0..20 {
            fs.write(&format!("/f{}.bin", i), &vec![i as u8; 40 + i * 7]).unwrap();
        }
        for i in (0..20).step_by(3) {
            fs.delete(&format!("/f{}.bin", i)).unwrap();
        }

        fs.compact().unwrap();
        fs.mapper().check_invariants().unwrap();
        assert!(fs.mapper().stats().free_gaps <= 1);

        for i in (0..20).filter(|i| i % 3 != 0) {
            assert_eq!(fs.read(&format!("/f{}.bin", i)).unwrap(), vec![i as u8; 40 + i * 7]);
        }
    }
}
