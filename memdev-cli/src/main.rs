//! Command-line front end for the in-memory devices
//!
//! ```text
//! memdev [--admin] [--minor N] COMMAND...
//!
//! COMMAND:
//!   quantum [VALUE]   print or set the quantum size
//!   qset [VALUE]      print or set the index-block fanout
//!   reset             trim the instance and restore default geometry
//!   cat               copy stdin into the instance, then print it back
//!   info              print size, geometry and memory usage
//! ```
//!
//! Commands run in order against one device set created from the
//! `MEMDEV_*` environment, so `memdev --admin quantum 8 cat` stores stdin
//! with an 8-byte quantum: `cat` reapplies the geometry that its truncating
//! open resets. The exit status is the errno of a failed call.

use std::os::raw::c_int;
use std::process::ExitCode;

use memdev::ioctl::{
    SCULL_IOC_GET_QSET, SCULL_IOC_GET_QUANTUM, SCULL_IOC_RESET, SCULL_IOC_SET_QSET,
    SCULL_IOC_SET_QUANTUM,
};
use memdev::{Credentials, DevError, DeviceConfig, OpenFlags, Registry, ScullFile};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Quantum(Option<c_int>),
    Qset(Option<c_int>),
    Reset,
    Cat,
    Info,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    admin: bool,
    minor: Option<u32>,
    commands: Vec<Command>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        admin: false,
        minor: None,
        commands: Vec::new(),
    };
    let mut args = args.into_iter().peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--admin" => parsed.admin = true,
            "--minor" => {
                let value = args.next().ok_or("--minor needs a value")?;
                parsed.minor = Some(value.parse().map_err(|_| format!("bad minor '{value}'"))?);
            }
            "quantum" | "qset" => {
                // an optional numeric value follows
                let value = args.next_if(|next| next.parse::<c_int>().is_ok());
                let value = value.and_then(|v| v.parse::<c_int>().ok());
                parsed.commands.push(if arg == "quantum" {
                    Command::Quantum(value)
                } else {
                    Command::Qset(value)
                });
            }
            "reset" => parsed.commands.push(Command::Reset),
            "cat" => parsed.commands.push(Command::Cat),
            "info" => parsed.commands.push(Command::Info),
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    if parsed.commands.is_empty() {
        parsed.commands.push(Command::Info);
    }
    Ok(parsed)
}

async fn run_command(
    registry: &Registry,
    file: &mut ScullFile,
    minor: u32,
    creds: Credentials,
    command: &Command,
) -> Result<(), DevError> {
    match command {
        Command::Quantum(None) => {
            let mut value: c_int = 0;
            file.ioctl(SCULL_IOC_GET_QUANTUM, Some(&mut value)).await?;
            println!("quantum: {value}");
        }
        Command::Qset(None) => {
            let mut value: c_int = 0;
            file.ioctl(SCULL_IOC_GET_QSET, Some(&mut value)).await?;
            println!("qset: {value}");
        }
        Command::Quantum(Some(value)) => {
            let mut value = *value;
            file.ioctl(SCULL_IOC_SET_QUANTUM, Some(&mut value)).await?;
        }
        Command::Qset(Some(value)) => {
            let mut value = *value;
            file.ioctl(SCULL_IOC_SET_QSET, Some(&mut value)).await?;
        }
        Command::Reset => {
            file.ioctl(SCULL_IOC_RESET, None).await?;
        }
        Command::Cat => {
            cat(
                registry,
                file,
                minor,
                creds,
                &mut tokio::io::stdin(),
                &mut tokio::io::stdout(),
            )
            .await?;
        }
        Command::Info => {
            let geometry = file.geometry().await?;
            println!(
                "{}: size {} bytes, quantum {}, qset {}, memory in use {} bytes",
                file.device().name(),
                file.size().await?,
                geometry.quantum(),
                geometry.qset(),
                registry.memory_usage()
            );
        }
    }
    Ok(())
}

/// Copy `input` into the instance, then the instance to `output`
///
/// The write-only open truncates and restores the default geometry, so the
/// geometry seen through `file` beforehand is put back.
async fn cat<R, W>(
    registry: &Registry,
    file: &ScullFile,
    minor: u32,
    creds: Credentials,
    input: &mut R,
    output: &mut W,
) -> Result<(), DevError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 4096];
    let geometry = file.geometry().await?;

    let mut writer = registry.open(minor, OpenFlags::write_only(), creds).await?;
    let reset = writer.geometry().await?;
    if reset.quantum() != geometry.quantum() {
        writer.set_quantum(geometry.quantum_int()).await?;
    }
    if reset.qset() != geometry.qset() {
        writer.set_qset(geometry.qset_int()).await?;
    }
    loop {
        let n = input.read(&mut buf).await.map_err(|e| {
            error!(error = %e, "reading input");
            DevError::Fault
        })?;
        if n == 0 {
            break;
        }
        let mut rest = &buf[..n];
        while !rest.is_empty() {
            let written = writer.write(rest).await?;
            rest = &rest[written..];
        }
    }
    debug!(bytes = writer.position(), "input stored");
    writer.close();

    let mut reader = registry.open(minor, OpenFlags::read_only(), creds).await?;
    loop {
        let n = reader.read(&mut buf[..]).await?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await.map_err(|e| {
            error!(error = %e, "writing output");
            DevError::Fault
        })?;
    }
    output.flush().await.map_err(|_| DevError::Fault)?;
    reader.close();
    Ok(())
}

fn exit_code(err: DevError) -> ExitCode {
    ExitCode::from(u8::try_from(err.errno()).unwrap_or(u8::MAX))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("memdev: {msg}");
            eprintln!("usage: memdev [--admin] [--minor N] quantum|qset [VALUE] | reset | cat | info ...");
            return ExitCode::from(2);
        }
    };

    let config = match DeviceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("memdev: {e}");
            return ExitCode::from(2);
        }
    };
    let minor = args.minor.unwrap_or(config.minor);
    let registry = match Registry::new(config) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("memdev: {e}");
            return ExitCode::from(2);
        }
    };
    let creds = if args.admin {
        Credentials::admin()
    } else {
        Credentials::user()
    };

    let mut status = ExitCode::SUCCESS;
    match registry.open(minor, OpenFlags::read_only(), creds).await {
        Ok(mut file) => {
            for command in &args.commands {
                if let Err(e) = run_command(&registry, &mut file, minor, creds, command).await {
                    eprintln!("memdev: {command:?}: {e}");
                    status = exit_code(e);
                    break;
                }
            }
            file.close();
        }
        Err(e) => {
            eprintln!("memdev: minor {minor}: {e}");
            status = exit_code(e);
        }
    }
    registry.shutdown().await;
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdev::qset::{block_cost, slots_cost};

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn test_parse_sequence() {
        let parsed = args(&["--admin", "quantum", "8", "qset", "cat", "quantum"]).unwrap();
        assert!(parsed.admin);
        assert_eq!(
            parsed.commands,
            vec![
                Command::Quantum(Some(8)),
                Command::Qset(None),
                Command::Cat,
                Command::Quantum(None)
            ]
        );
    }

    #[test]
    fn test_parse_defaults_and_errors() {
        assert_eq!(args(&[]).unwrap().commands, vec![Command::Info]);
        assert_eq!(args(&["--minor", "2", "info"]).unwrap().minor, Some(2));
        assert!(args(&["quantum", "-x"]).is_err());
        assert!(args(&["frobnicate"]).is_err());
        assert!(args(&["--minor"]).is_err());
    }

    #[tokio::test]
    async fn test_cat_keeps_geometry_set_before_it() {
        let registry = Registry::new(DeviceConfig::default().nr_devs(1)).unwrap();
        let creds = Credentials::admin();
        let mut file = registry
            .open(0, OpenFlags::read_only(), creds)
            .await
            .unwrap();
        run_command(&registry, &mut file, 0, creds, &Command::Quantum(Some(8)))
            .await
            .unwrap();

        let input = b"twenty bytes of text";
        let mut output = Vec::new();
        cat(&registry, &file, 0, creds, &mut &input[..], &mut output)
            .await
            .unwrap();

        assert_eq!(output, input);
        assert_eq!(file.geometry().await.unwrap().quantum(), 8);
        // 20 bytes stored as three 8-byte quanta in one index block
        assert_eq!(
            registry.memory_usage(),
            block_cost() + slots_cost(1000) + 3 * 8
        );
    }

    #[tokio::test]
    async fn test_cat_without_admin_on_default_geometry() {
        let registry = Registry::new(DeviceConfig::default().nr_devs(1)).unwrap();
        let creds = Credentials::user();
        let file = registry
            .open(0, OpenFlags::read_only(), creds)
            .await
            .unwrap();

        let mut output = Vec::new();
        cat(&registry, &file, 0, creds, &mut &b"plain"[..], &mut output)
            .await
            .unwrap();
        assert_eq!(output, b"plain");
    }
}
