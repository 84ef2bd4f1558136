//! Pipe demo
//!
//! Lines typed on stdin go into a small pipe; several readers drain it
//! concurrently. Run with `RUST_LOG=trace` to watch readers and the writer
//! sleep and wake.

use memdev::{DevError, DeviceConfig, Interrupt, OpenFlags, PipeFile, Registry};
use tokio::io::AsyncBufReadExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let registry = Registry::new(DeviceConfig::from_env()?)?;
    let interrupt = Interrupt::new();

    let writer = registry.open_pipe(0, OpenFlags::write_only(), interrupt.clone())?;
    let mut readers = Vec::new();
    for name in ["r1", "r2", "r3"] {
        let reader = registry.open_pipe(0, OpenFlags::read_only(), interrupt.clone())?;
        readers.push(tokio::spawn(read_all(name, reader)));
    }

    write_all(writer).await;

    // readers block on an empty pipe forever; the interrupt releases them
    interrupt.raise();
    for reader in readers {
        reader.await?;
    }
    println!("All tasks completed");
    Ok(())
}

async fn write_all(mut pipe: PipeFile) {
    println!("Enter text (empty line to quit):");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        let mut rest = trimmed.as_bytes();
        while !rest.is_empty() {
            match pipe.write(rest).await {
                Ok(n) => rest = &rest[n..],
                Err(e) => {
                    eprintln!("Write error: errno={}", e.errno());
                    return;
                }
            }
        }
    }
    pipe.close();
    println!("Writer closed");
}

async fn read_all(name: &str, mut pipe: PipeFile) {
    let mut buf = [0u8; 4];
    loop {
        match pipe.read(&mut buf[..]).await {
            Ok(n) => println!("({name}): {}", String::from_utf8_lossy(&buf[..n])),
            Err(DevError::Interrupted) => {
                println!("({name}) interrupted");
                break;
            }
            Err(e) => {
                eprintln!("({name}) Error: errno={}", e.errno());
                break;
            }
        }
    }
}
