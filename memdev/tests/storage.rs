#[macro_use]
extern crate hamcrest;
use hamcrest::prelude::*;
use memdev::config::DEFAULT_MEMORY_LIMIT;
use memdev::qset::{block_cost, slots_cost};
use memdev::uaccess::Fault;
use memdev::{
    Credentials, DevError, DeviceConfig, Interrupt, OpenFlags, Registry, ScullFile, UserSlice,
    UserSliceMut,
};
use std::io::SeekFrom;
use std::sync::Arc;

fn small_registry() -> Registry {
    Registry::new(DeviceConfig::default().quantum(4).qset(2).nr_devs(2)).unwrap()
}

async fn open_rw(registry: &Registry, minor: u32) -> ScullFile {
    registry
        .open(minor, OpenFlags::read_write(), Credentials::user())
        .await
        .unwrap()
}

async fn write_all(file: &mut ScullFile, mut data: &[u8]) {
    while !data.is_empty() {
        let n = file.write(data).await.unwrap();
        assert_that!(n, greater_than(0));
        data = &data[n..];
    }
}

async fn read_to_end(file: &mut ScullFile) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        let n = file.read(&mut buf).await.unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

struct FaultySource(usize);

impl UserSlice for FaultySource {
    fn len(&self) -> usize {
        self.0
    }

    fn copy_from_user(&self, _offset: usize, _dst: &mut [u8]) -> Result<(), Fault> {
        Err(Fault)
    }
}

struct FaultyDest(usize);

impl UserSliceMut for FaultyDest {
    fn len(&self) -> usize {
        self.0
    }

    fn copy_to_user(&mut self, _offset: usize, _src: &[u8]) -> Result<(), Fault> {
        Err(Fault)
    }
}

#[tokio::test]
async fn test_small_geometry_scenario() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;

    // writes are clipped at quantum boundaries: 4 + 4 + 2
    assert_that!(file.write(b"ABCDEFGHIJ").await.unwrap(), equal_to(4));
    assert_that!(file.write(b"EFGHIJ").await.unwrap(), equal_to(4));
    assert_that!(file.write(b"IJ").await.unwrap(), equal_to(2));
    assert_that!(file.size().await.unwrap(), equal_to(10));

    file.seek(SeekFrom::Start(0)).await.unwrap();
    let mut buf = [0u8; 10];
    assert_that!(file.read(&mut buf).await.unwrap(), equal_to(4));
    assert_eq!(&buf[..4], b"ABCD");
    assert_eq!(read_to_end(&mut file).await, b"EFGHIJ");

    assert_that!(file.seek(SeekFrom::Start(6)).await.unwrap(), equal_to(6));
    let mut two = [0u8; 2];
    assert_that!(file.read(&mut two).await.unwrap(), equal_to(2));
    assert_eq!(&two, b"GH");
}

#[tokio::test]
async fn test_round_trip_across_blocks() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    let data: Vec<u8> = (0..=200u8).collect();

    write_all(&mut file, &data).await;
    file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(read_to_end(&mut file).await, data);

    // 201 bytes in 8-byte blocks
    let dev = Arc::clone(file.device());
    assert_that!(dev.lock(&Interrupt::new()).await.unwrap().chain_len(), equal_to(26));
}

#[tokio::test]
async fn test_read_past_size_returns_zero() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    write_all(&mut file, b"abc").await;

    let mut buf = [0u8; 4];
    for pos in [3, 4, 1000, u64::from(u32::MAX)] {
        file.seek(SeekFrom::Start(pos)).await.unwrap();
        assert_that!(file.read(&mut buf).await.unwrap(), equal_to(0));
        assert_that!(file.position(), equal_to(pos));
    }
}

#[tokio::test]
async fn test_hole_reads_empty_until_written() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;

    file.seek(SeekFrom::Start(17)).await.unwrap();
    write_all(&mut file, b"xyz").await;
    assert_that!(file.size().await.unwrap(), equal_to(20));

    let mut buf = [0u8; 4];
    file.seek(SeekFrom::Start(2)).await.unwrap();
    assert_that!(file.read(&mut buf).await.unwrap(), equal_to(0));

    file.seek(SeekFrom::Start(17)).await.unwrap();
    assert_eq!(read_to_end(&mut file).await, b"xyz");

    // fill the hole
    file.seek(SeekFrom::Start(2)).await.unwrap();
    write_all(&mut file, b"hi").await;
    file.seek(SeekFrom::Start(2)).await.unwrap();
    assert_that!(file.read(&mut buf).await.unwrap(), equal_to(2));
    assert_eq!(&buf[..2], b"hi");
}

#[tokio::test]
async fn test_write_only_open_truncates() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    write_all(&mut file, b"populated").await;
    file.close();

    let writer = registry
        .open(0, OpenFlags::write_only(), Credentials::user())
        .await
        .unwrap();
    writer.close();

    let mut reader = registry
        .open(0, OpenFlags::read_only(), Credentials::user())
        .await
        .unwrap();
    let mut buf = [0u8; 4];
    assert_that!(reader.read(&mut buf).await.unwrap(), equal_to(0));
    assert_that!(reader.size().await.unwrap(), equal_to(0));
    assert_eq!(reader.write(b"no").await, Err(DevError::BadDescriptor));
}

#[tokio::test]
async fn test_instances_are_independent() {
    let registry = small_registry();
    let mut first = open_rw(&registry, 0).await;
    let mut second = open_rw(&registry, 1).await;

    write_all(&mut first, b"one").await;
    assert_that!(second.size().await.unwrap(), equal_to(0));
    write_all(&mut second, b"second").await;
    first.reset().await.unwrap();
    assert_that!(second.size().await.unwrap(), equal_to(6));
}

#[tokio::test]
async fn test_seek_bounds() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    write_all(&mut file, b"0123456789").await;

    assert_that!(file.seek(SeekFrom::End(-2)).await.unwrap(), equal_to(8));
    assert_that!(file.seek(SeekFrom::Current(-3)).await.unwrap(), equal_to(5));
    // seeking past the end is allowed
    assert_that!(file.seek(SeekFrom::End(5)).await.unwrap(), equal_to(15));

    assert_eq!(file.seek(SeekFrom::Current(-16)).await, Err(DevError::InvalidArgument));
    assert_eq!(file.seek(SeekFrom::Start(u64::MAX)).await, Err(DevError::InvalidArgument));
    assert_eq!(file.seek(SeekFrom::Current(i64::MAX)).await, Err(DevError::InvalidArgument));
    assert_that!(file.position(), equal_to(15));
}

#[tokio::test]
async fn test_fault_leaves_size_and_position() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    write_all(&mut file, b"abcd").await;

    assert_eq!(file.write(&FaultySource(3)).await, Err(DevError::Fault));
    assert_that!(file.size().await.unwrap(), equal_to(4));
    assert_that!(file.position(), equal_to(4));

    file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(file.read(&mut FaultyDest(4)).await, Err(DevError::Fault));
    assert_that!(file.position(), equal_to(0));
}

#[tokio::test]
async fn test_budget_exhaustion_keeps_written_data() {
    // room for one index block with its slots and two 4-byte quanta
    let limit = block_cost() + slots_cost(2) + 2 * 4;
    let registry = Registry::new(
        DeviceConfig::default()
            .quantum(4)
            .qset(2)
            .nr_devs(1)
            .memory_limit(limit),
    )
    .unwrap();
    let mut file = open_rw(&registry, 0).await;

    write_all(&mut file, b"12345678").await;
    assert_that!(registry.memory_usage(), equal_to(limit));
    assert_eq!(file.write(b"9").await, Err(DevError::NoMemory));

    assert_that!(file.size().await.unwrap(), equal_to(8));
    file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(read_to_end(&mut file).await, b"12345678");

    // trimming returns everything to the budget
    file.reset().await.unwrap();
    assert_that!(registry.memory_usage(), equal_to(0));
    file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_that!(file.write(b"9").await.unwrap(), equal_to(1));
}

#[tokio::test]
async fn test_far_write_stops_at_default_limit() {
    let registry = Registry::new(DeviceConfig::default().nr_devs(1)).unwrap();
    let mut file = open_rw(&registry, 0).await;

    // reaching this offset would need trillions of index blocks
    file.seek(SeekFrom::Start(1 << 62)).await.unwrap();
    assert_eq!(file.write(b"x").await, Err(DevError::NoMemory));
    assert_that!(registry.memory_usage(), less_than_or_equal_to(DEFAULT_MEMORY_LIMIT));
    assert_that!(file.size().await.unwrap(), equal_to(0));

    file.reset().await.unwrap();
    assert_that!(registry.memory_usage(), equal_to(0));
}

#[tokio::test]
async fn test_blocked_lock_is_interrupted() {
    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    let interrupt = file.interrupt().clone();
    let dev = Arc::clone(file.device());

    let held = dev.lock(&Interrupt::new()).await.unwrap();
    let task = tokio::spawn(async move {
        let result = file.write(b"data").await;
        (result, file)
    });
    tokio::task::yield_now().await;
    interrupt.raise();

    let (result, mut file) = task.await.unwrap();
    assert_eq!(result, Err(DevError::Interrupted));
    assert_eq!(DevError::Interrupted.errno(), memdev::error::ERESTARTSYS);
    drop(held);

    assert_that!(dev.lock(&Interrupt::new()).await.unwrap().size(), equal_to(0));
    assert_that!(file.position(), equal_to(0));

    // a pending signal does not stop an uncontended acquisition
    assert_that!(file.write(b"data").await.unwrap(), equal_to(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_do_not_interleave() {
    let registry = Registry::new(DeviceConfig::default().quantum(64).qset(4).nr_devs(1)).unwrap();
    let mut writers = Vec::new();
    for fill in [b'a', b'b', b'c'] {
        let mut file = open_rw(&registry, 0).await;
        writers.push(tokio::spawn(async move {
            let chunk = [fill; 64];
            for _ in 0..200 {
                file.seek(SeekFrom::Start(0)).await.unwrap();
                assert_eq!(file.write(&chunk).await, Ok(64));
            }
        }));
    }

    let mut reader = registry
        .open(0, OpenFlags::read_only(), Credentials::user())
        .await
        .unwrap();
    let mut buf = [0u8; 64];
    for _ in 0..200 {
        reader.seek(SeekFrom::Start(0)).await.unwrap();
        let n = reader.read(&mut buf).await.unwrap();
        if n > 0 {
            assert_that!(n, equal_to(64));
            assert!(buf.iter().all(|b| *b == buf[0]), "torn quantum: {buf:?}");
        }
        tokio::task::yield_now().await;
    }
    for writer in writers {
        writer.await.unwrap();
    }
}

#[tokio::test]
async fn test_embedded_io_traits() {
    use embedded_io_async::{Read, Seek, SeekFrom, Write};

    let registry = small_registry();
    let mut file = open_rw(&registry, 0).await;
    file.write_all(b"through the trait").await.unwrap();
    Seek::seek(&mut file, SeekFrom::Start(8)).await.unwrap();

    let mut buf = [0u8; 9];
    file.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"the trait");
}
