//! End-to-end test against a real file on disk, standing in for a disk
//! image (spec.md §8 "hosted image testing").
//!
//! Requires the `no_std` feature to be disabled so that `FileBackedDevice`
//! exists. Run with `--no-default-features --features bindings,external_mutex`
//! (or simply `--no-default-features` plus whatever mutex feature the host
//! wants).

use bfs::device::FileBackedDevice;
use bfs::fat::dir::Attributes;
use bfs::fat::file::File as FatFile;
use bfs::flags::OpenFlags;
use bfs::fs::{Filesystem, ResolvedEntry};

use std::io::Write as _;

const SECTOR_SIZE: u64 = 512;
const TOTAL_SECTORS: u16 = 8000;
const ROOT_ENTRIES: u16 = 512;

fn write_fat16_bpb(sector: &mut [u8; 512]) {
    sector[0] = 0xEB;
    sector[1] = 0x3C;
    sector[2] = 0x90;
    sector[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
    sector[0x0D] = 1; // sectors per cluster
    sector[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
    sector[0x10] = 2; // num fats
    sector[0x11..0x13].copy_from_slice(&ROOT_ENTRIES.to_le_bytes());
    sector[0x13..0x15].copy_from_slice(&TOTAL_SECTORS.to_le_bytes());
    sector[0x15] = 0xF8;
    sector[0x16..0x18].copy_from_slice(&4u16.to_le_bytes()); // sectors per FAT
}

/// Lays out a blank FAT16 image at `path`: a valid boot sector followed by
/// zeroed FAT tables, root directory region, and data clusters.
fn make_fat16_image(path: &std::path::Path) {
    let mut file = std::fs::File::create(path).unwrap();
    file.set_len(TOTAL_SECTORS as u64 * SECTOR_SIZE).unwrap();

    let mut boot_sector = [0u8; 512];
    write_fat16_bpb(&mut boot_sector);
    file.write_all(&boot_sector).unwrap();
}

fn temp_image_path(name: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("bfs-test-{name}-{}.img", std::process::id()));
    path
}

#[test]
fn mount_detects_fat16_and_resolves_root_entries() {
    let path = temp_image_path("mount-detect");
    make_fat16_image(&path);

    let mut dev = FileBackedDevice::open(&path).unwrap();
    let mut fs = Filesystem::mount(&mut dev).unwrap();
    assert!(matches!(fs, Filesystem::Fat(_)));

    let geo = match &fs {
        Filesystem::Fat(f) => f.geometry.clone(),
        _ => unreachable!(),
    };
    let mut buf = [0u8; 512];
    let mut root = match &fs {
        Filesystem::Fat(f) => f.root_dir(),
        _ => unreachable!(),
    };
    root.write_entry(&mut dev, &geo, &mut buf, "hello.txt", Attributes::ARCHIVE, 0, 0).unwrap();

    let resolved = fs.resolve(&mut dev, &mut buf, "/hello.txt").unwrap();
    match resolved {
        ResolvedEntry::Fat(entry) => assert_eq!(entry.file_size, 0),
        ResolvedEntry::Ext(_) => panic!("expected a FAT entry"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn write_then_reopen_reads_back_identical_contents() {
    let path = temp_image_path("write-reopen");
    make_fat16_image(&path);

    let mut dev = FileBackedDevice::open(&path).unwrap();
    let mut fs = Filesystem::mount(&mut dev).unwrap();
    let mut buf = [0u8; 512];

    let geo = match &fs {
        Filesystem::Fat(f) => f.geometry.clone(),
        _ => unreachable!(),
    };
    let mut root = match &fs {
        Filesystem::Fat(f) => f.root_dir(),
        _ => unreachable!(),
    };
    let locator = root
        .write_entry(&mut dev, &geo, &mut buf, "data.bin", Attributes::ARCHIVE, 0, 0)
        .unwrap();

    let (entry, _) =
        root.next_entry(&mut dev, &geo, &mut buf, locator.short_entry_index).unwrap().unwrap();
    let mut handle = FatFile::new(
        entry.first_cluster,
        entry.file_size,
        OpenFlags::READ | OpenFlags::WRITE,
        root.location,
        entry.locator,
        entry.short_name,
        entry.attributes,
    );

    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let written = handle.write(&mut dev, &geo, &mut buf, &payload).unwrap();
    assert_eq!(written, payload.len());
    handle.close(&mut dev, &geo, &mut buf).unwrap();

    // Re-resolve from scratch, as a fresh process opening the image would.
    let resolved = fs.resolve(&mut dev, &mut buf, "/data.bin").unwrap();
    let entry = match resolved {
        ResolvedEntry::Fat(entry) => entry,
        ResolvedEntry::Ext(_) => panic!("expected a FAT entry"),
    };
    assert_eq!(entry.file_size, payload.len() as u32);

    let mut reader = FatFile::new(
        entry.first_cluster,
        entry.file_size,
        OpenFlags::READ,
        root.location,
        entry.locator,
        entry.short_name,
        entry.attributes,
    );
    let mut out = vec![0u8; payload.len()];
    let read = reader.read(&mut dev, &geo, &mut buf, &mut out).unwrap();
    assert_eq!(read, payload.len());
    assert_eq!(out, payload);

    std::fs::remove_file(&path).ok();
}
