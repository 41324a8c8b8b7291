//! A read benchmark that tries to measure read speed.

extern crate criterion;

use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    Throughput,
};

use bfs::device::BlockDevice;
use bfs::fat::dir::{Attributes, Directory};
use bfs::fat::file::File as FatFile;
use bfs::fat::table::FatGeometry;
use bfs::fat::types::FatType;
use bfs::flags::OpenFlags;

const SECTOR_SIZE: usize = 512;
const TOTAL_SECTORS: u64 = 200_000;
const SECTORS_PER_CLUSTER: u8 = 8;
const FAT_SIZE_SECTORS: u32 = 128;
const RESERVED_SECTORS: u16 = 1;
const ROOT_ENTRIES: u16 = 512;

const FILES: &[(&str, usize)] = &[("1k", 1024), ("64k", 64 * 1024), ("1m", 1024 * 1024)];

struct Mem {
    sectors: Vec<[u8; SECTOR_SIZE]>,
}

impl Mem {
    fn new(n: usize) -> Self {
        Self { sectors: vec![[0u8; SECTOR_SIZE]; n] }
    }
}

impl BlockDevice for Mem {
    type Error = core::convert::Infallible;
    fn read(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), Self::Error> {
        for i in 0..count as usize {
            buffer[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]
                .copy_from_slice(&self.sectors[lba as usize + i]);
        }
        Ok(())
    }
    fn write(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), Self::Error> {
        for i in 0..count as usize {
            self.sectors[lba as usize + i].copy_from_slice(&buffer[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
        }
        Ok(())
    }
    fn resize(&mut self, _block_size: u32) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn root_dir_sectors() -> u32 {
    ((ROOT_ENTRIES as u32 * 32) + SECTOR_SIZE as u32 - 1) / SECTOR_SIZE as u32
}

fn geometry() -> FatGeometry {
    let first_fat_sector = RESERVED_SECTORS as u32;
    let first_data_sector = first_fat_sector + 2 * FAT_SIZE_SECTORS + root_dir_sectors();
    let total_clusters = (TOTAL_SECTORS as u32 - first_data_sector) / SECTORS_PER_CLUSTER as u32;

    FatGeometry {
        fat_type: FatType::classify(total_clusters),
        bytes_per_sector: SECTOR_SIZE as u16,
        sectors_per_cluster: SECTORS_PER_CLUSTER,
        first_fat_sector,
        fat_size: FAT_SIZE_SECTORS,
        num_fats: 2,
        first_data_sector,
        total_clusters,
    }
}

/// Writes a single file of `size` bytes into the volume's root directory
/// and returns an open, readable handle to it.
fn seed_file(dev: &mut Mem, geo: &FatGeometry, name: &str, size: usize) -> FatFile {
    let mut buf = [0u8; SECTOR_SIZE];
    let mut root = Directory {
        location: bfs::fat::dir::DirLocation::FixedRoot {
            start_sector: (RESERVED_SECTORS as u32 + 2 * FAT_SIZE_SECTORS) as u64,
            sector_count: root_dir_sectors(),
        },
    };

    let locator = root.write_entry(dev, geo, &mut buf, name, Attributes::ARCHIVE, 0, 0).unwrap();
    let (entry, _) = root.next_entry(dev, geo, &mut buf, locator.short_entry_index).unwrap().unwrap();

    let mut file = FatFile::new(
        entry.first_cluster,
        entry.file_size,
        OpenFlags::READ | OpenFlags::WRITE,
        root.location,
        entry.locator,
        entry.short_name,
        entry.attributes,
    );

    let pattern: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
    file.write(dev, geo, &mut buf, &pattern).unwrap();
    file.close(dev, geo, &mut buf).unwrap();
    file.seek(0);
    file
}

fn bench_read_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("read speed");

    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    group.plot_config(plot_config);

    let geo = geometry();
    let mut dev = Mem::new(TOTAL_SECTORS as usize);
    let mut buf = [0u8; SECTOR_SIZE];

    for (name, size) in FILES.iter() {
        let mut file = seed_file(&mut dev, &geo, *name, *size);
        let mut out = vec![0u8; *size];

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("file read speed", size), size, |b, _| {
            b.iter(|| {
                file.seek(0);
                file.read(&mut dev, &geo, &mut buf, &mut out).unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_read_speed);

fn main() {
    std::thread::Builder::new()
        .stack_size(1024 * 1024 * 1024)
        .spawn(|| {
            benches();
            Criterion::default().configure_from_args().final_summary();
        })
        .unwrap()
        .join()
        .unwrap();
}
