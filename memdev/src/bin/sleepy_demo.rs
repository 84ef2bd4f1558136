//! Sleepy demo
//!
//! A few readers go to sleep on the sleepy device; every line typed on
//! stdin wakes one of them.

use std::sync::Arc;

use memdev::{Interrupt, Sleepy};
use tokio::io::AsyncBufReadExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let sleepy = Arc::new(Sleepy::new());
    let interrupt = Interrupt::new();

    let mut readers = Vec::new();
    for id in 1..=3 {
        let sleepy = Arc::clone(&sleepy);
        let interrupt = interrupt.clone();
        readers.push(tokio::spawn(async move {
            match sleepy.read(&interrupt).await {
                Ok(_) => println!("reader {id}: awoken"),
                Err(e) => println!("reader {id}: {e}"),
            }
        }));
    }

    println!("Press enter to wake a reader (EOF to quit):");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sleepy.write(line.as_bytes());
        if readers.iter().all(tokio::task::JoinHandle::is_finished) {
            break;
        }
    }

    interrupt.raise();
    for reader in readers {
        reader.await?;
    }
    Ok(())
}
