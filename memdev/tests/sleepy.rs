use memdev::{DevError, DeviceConfig, Interrupt, Registry};
use std::sync::Arc;

#[tokio::test]
async fn test_reader_sleeps_until_write() {
    let registry = Registry::new(DeviceConfig::default().nr_devs(1)).unwrap();
    let sleepy = Arc::clone(registry.sleepy());

    let reader = {
        let sleepy = Arc::clone(&sleepy);
        tokio::spawn(async move { sleepy.read(&Interrupt::new()).await })
    };
    while sleepy.sleepers() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(!reader.is_finished());

    assert_eq!(sleepy.write(b"go"), 2);
    assert_eq!(reader.await.unwrap(), Ok(0));
}

#[tokio::test]
async fn test_one_write_releases_one_reader() {
    let registry = Registry::new(DeviceConfig::default().nr_devs(1)).unwrap();
    let sleepy = Arc::clone(registry.sleepy());
    let interrupt = Interrupt::new();

    let mut readers = Vec::new();
    for _ in 0..2 {
        let sleepy = Arc::clone(&sleepy);
        let interrupt = interrupt.clone();
        readers.push(tokio::spawn(async move { sleepy.read(&interrupt).await }));
    }
    while sleepy.sleepers() < 2 {
        tokio::task::yield_now().await;
    }

    sleepy.write(b"");
    // the loser goes back to sleep
    while sleepy.sleepers() < 1 || readers.iter().all(|r| !r.is_finished()) {
        tokio::task::yield_now().await;
    }
    interrupt.raise();

    let mut results = Vec::new();
    for reader in readers {
        results.push(reader.await.unwrap());
    }
    results.sort_by_key(Result::is_err);
    assert_eq!(results, vec![Ok(0), Err(DevError::Interrupted)]);
}
