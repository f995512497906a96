//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use otapush_device_client::{HttpDevice, SimpleTarget, simple_upload};
use otapush_protocol::container::HEADER_LEN;
use otapush_protocol::{ContainerError, ContainerHeader, build_container};
use otapush_transfer::{FileSource, UploadSource, checksum_bytes, checksum_source};
use otapush_updater::{
    ConnectionIndicator, DeviceConnection, OtaUpdate, ReleasePoller, StatusPoller,
    check_release, fetch_status, start_release_update,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Command, ReleaseAction};
use crate::config::{CliConfig, config_path};
use crate::progress::{EventView, percent_bar};

/// How a command ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    Cancelled,
}

/// Route chosen for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    /// Resumable session with reconciliation.
    Resumable,
    /// One multipart request.
    Simple(SimpleTarget),
}

pub async fn run(
    command: Command,
    config: &CliConfig,
    cancel: CancellationToken,
) -> anyhow::Result<Outcome> {
    match command {
        Command::Upload {
            path,
            force,
            simple,
        } => upload(config, &path, force, simple, cancel).await,
        Command::Status { watch } => status(config, watch, cancel).await,
        Command::Release { action } => match action {
            ReleaseAction::Check => release_check(config).await,
            ReleaseAction::Update { no_wait } => release_update(config, no_wait, cancel).await,
        },
        Command::Pack {
            firmware,
            filesystem,
            output,
        } => pack(&firmware, &filesystem, &output).await,
        Command::Inspect { path } => inspect(&path).await,
        Command::Config => show_config(config),
    }
}

/// Picks the upload route from the file's name and its container check.
pub fn plan_upload(
    path: &Path,
    container: &Result<ContainerHeader, ContainerError>,
    force: bool,
    simple: bool,
) -> anyhow::Result<UploadPlan> {
    if simple {
        return match SimpleTarget::for_path(path) {
            Some(target) => Ok(UploadPlan::Simple(target)),
            None if container.is_ok() => Ok(UploadPlan::Simple(SimpleTarget::Container)),
            None => bail!(
                "cannot pick an upload endpoint for {}: expected a .bin or .zip file",
                path.display()
            ),
        };
    }

    match container {
        Ok(_) => Ok(UploadPlan::Resumable),
        Err(_) if SimpleTarget::for_path(path) == Some(SimpleTarget::Firmware) => {
            Ok(UploadPlan::Simple(SimpleTarget::Firmware))
        }
        Err(e) if force => {
            warn!(path = %path.display(), error = %e, "not a valid container, sending anyway");
            Ok(UploadPlan::Resumable)
        }
        Err(e) => bail!(
            "{} is not an update container ({e}); pass --force to send it anyway",
            path.display()
        ),
    }
}

/// Reads and checks the container header of `source`.
async fn check_container(
    source: &dyn UploadSource,
) -> anyhow::Result<Result<ContainerHeader, ContainerError>> {
    let total = source.total_size();
    if total < HEADER_LEN as u64 {
        return Ok(Err(ContainerError::TooShort(total as usize)));
    }
    let head = source.read_at(0, HEADER_LEN).await?;
    Ok(ContainerHeader::parse(&head).and_then(|h| h.validate_len(total).map(|()| h)))
}

fn connect(config: &CliConfig) -> anyhow::Result<HttpDevice> {
    HttpDevice::new(&config.device_url)
        .with_context(|| format!("invalid device address {:?}", config.device_url))
}

async fn upload(
    config: &CliConfig,
    path: &Path,
    force: bool,
    simple: bool,
    cancel: CancellationToken,
) -> anyhow::Result<Outcome> {
    let source = FileSource::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    let container = check_container(&source).await?;
    let plan = plan_upload(path, &container, force, simple)?;
    let device = connect(config)?;

    info!(
        device = %device.base_url(),
        path = %path.display(),
        size = source.total_size(),
        plan = ?plan,
        "starting upload"
    );

    match plan {
        UploadPlan::Simple(target) => simple_file(&device, target, path, cancel).await,
        UploadPlan::Resumable => resumable(config, &device, &source, cancel).await,
    }
}

async fn simple_file(
    device: &HttpDevice,
    target: SimpleTarget,
    path: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<Outcome> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "firmware.bin".into());

    let (tx, rx) = mpsc::unbounded_channel();
    let view = tokio::spawn(EventView::new(percent_bar()).follow(rx));

    let result = tokio::select! {
        r = simple_upload(device, target, &file_name, data, &tx) => Some(r),
        _ = cancel.cancelled() => None,
    };
    drop(tx);
    let _ = view.await;

    match result {
        Some(Ok(reply)) => {
            println!("{reply}");
            Ok(Outcome::Success)
        }
        Some(Err(e)) => {
            eprintln!("upload failed: {e}");
            Ok(Outcome::Failed)
        }
        None => Ok(Outcome::Cancelled),
    }
}

async fn resumable(
    config: &CliConfig,
    device: &HttpDevice,
    source: &FileSource,
    cancel: CancellationToken,
) -> anyhow::Result<Outcome> {
    let mut update = OtaUpdate::new(config.update_config());
    let Some(events) = update.take_events() else {
        bail!("update events already taken");
    };
    let view = tokio::spawn(EventView::new(percent_bar()).follow(events));

    let update_cancel = update.cancel_token();
    let forward = tokio::spawn(async move {
        cancel.cancelled().await;
        update_cancel.cancel();
    });

    let result = update.run(device, source).await;
    forward.abort();
    let _ = view.await;

    match result {
        Ok(summary) => {
            println!(
                "{} ({} bytes, {} chunk writes, {} reconciliations)",
                summary.message, summary.total, summary.chunk_writes, summary.reconciliations
            );
            if summary.resumed_from > 0 {
                println!("resumed from byte {}", summary.resumed_from);
            }
            Ok(Outcome::Success)
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("upload cancelled; run the same command again to resume");
            Ok(Outcome::Cancelled)
        }
        Err(e) => {
            eprintln!("upload failed: {e}");
            Ok(Outcome::Failed)
        }
    }
}

async fn status(config: &CliConfig, watch: bool, cancel: CancellationToken) -> anyhow::Result<Outcome> {
    let device = connect(config)?;

    if !watch {
        return match fetch_status(&device, config.request_timeout()).await {
            Ok(status) => {
                let indicator = ConnectionIndicator::from_status(Some(&status));
                println!("{indicator}");
                println!("  mode:    {}", status.wifi.mode);
                println!("  ip:      {}", status.wifi.ip);
                println!("  ssid:    {}", status.wifi.ssid);
                println!("  app:     {} {}", status.app.name, status.app.version);
                if status.ota.active {
                    println!("  flashing {}/{} bytes", status.ota.written, status.ota.total);
                }
                Ok(Outcome::Success)
            }
            Err(e) => {
                println!("{}", ConnectionIndicator::Offline);
                eprintln!("status request failed: {e}");
                Ok(Outcome::Failed)
            }
        };
    }

    let conn: Arc<dyn DeviceConnection> = Arc::new(device);
    let (poller, mut rx) = StatusPoller::spawn(
        conn,
        config.status_poll_interval(),
        config.request_timeout(),
    );
    println!("{}", *rx.borrow_and_update());

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", *rx.borrow_and_update());
            }
            _ = cancel.cancelled() => break,
        }
    }

    poller.stop();
    poller.wait().await;
    Ok(Outcome::Success)
}

async fn release_check(config: &CliConfig) -> anyhow::Result<Outcome> {
    let device = connect(config)?;
    match check_release(&device, config.request_timeout()).await {
        Ok(release) => {
            println!("{} ({} bytes)", release.tag, release.size);
            Ok(Outcome::Success)
        }
        Err(e) => {
            eprintln!("release check failed: {e}");
            Ok(Outcome::Failed)
        }
    }
}

async fn release_update(
    config: &CliConfig,
    no_wait: bool,
    cancel: CancellationToken,
) -> anyhow::Result<Outcome> {
    let device = connect(config)?;

    let release = match check_release(&device, config.request_timeout()).await {
        Ok(release) => release,
        Err(e) => {
            eprintln!("release check failed: {e}");
            return Ok(Outcome::Failed);
        }
    };
    println!("installing {} ({} bytes)", release.tag, release.size);

    match start_release_update(&device, config.request_timeout()).await {
        Ok(reply) => info!(reply = %reply, "release update started"),
        Err(e) => {
            eprintln!("device refused the release update: {e}");
            return Ok(Outcome::Failed);
        }
    }
    if no_wait {
        return Ok(Outcome::Success);
    }

    let conn: Arc<dyn DeviceConnection> = Arc::new(device);
    let (poller, mut rx) = ReleasePoller::spawn(
        conn,
        config.release_poll_interval(),
        config.request_timeout(),
    );
    let bar = percent_bar();
    let mut last_phase = String::new();
    let mut last = None;

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                bar.set_position(u64::from(snapshot.percent()));
                if snapshot.phase != last_phase {
                    bar.set_message(snapshot.phase.clone());
                    last_phase.clone_from(&snapshot.phase);
                }
                if !snapshot.msg.is_empty() {
                    bar.println(format!("   {}", snapshot.msg));
                }
                last = Some(snapshot);
            }
            _ = cancel.cancelled() => {
                poller.stop();
                bar.abandon_with_message("stopped watching");
                poller.wait().await;
                return Ok(Outcome::Cancelled);
            }
        }
    }
    poller.wait().await;

    match last {
        Some(p) if p.phase == "done" => {
            bar.finish_with_message("done");
            Ok(Outcome::Success)
        }
        Some(p) => {
            bar.abandon_with_message("failed");
            eprintln!("release update failed: {}", p.msg);
            Ok(Outcome::Failed)
        }
        None => {
            bar.abandon();
            eprintln!("no progress reported by the device");
            Ok(Outcome::Failed)
        }
    }
}

async fn pack(firmware: &Path, filesystem: &Path, output: &Path) -> anyhow::Result<Outcome> {
    let fw = tokio::fs::read(firmware)
        .await
        .with_context(|| format!("cannot read {}", firmware.display()))?;
    let fs = tokio::fs::read(filesystem)
        .await
        .with_context(|| format!("cannot read {}", filesystem.display()))?;

    let container = build_container(&fw, &fs)?;
    tokio::fs::write(output, &container)
        .await
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "{}: {} bytes (firmware {}, filesystem {})",
        output.display(),
        container.len(),
        fw.len(),
        fs.len()
    );
    println!("sha256 {}", checksum_bytes(&container));
    Ok(Outcome::Success)
}

async fn inspect(path: &Path) -> anyhow::Result<Outcome> {
    let source = FileSource::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;

    println!("{}: {} bytes", path.display(), source.total_size());
    println!("sha256 {}", checksum_source(&source).await?);

    match check_container(&source).await? {
        Ok(header) => {
            println!("  firmware:   {} bytes", header.firmware_size);
            println!("  filesystem: {} bytes", header.filesystem_size);
            println!("valid update container");
            Ok(Outcome::Success)
        }
        Err(e) => {
            println!("not a valid update container: {e}");
            Ok(Outcome::Failed)
        }
    }
}

fn show_config(config: &CliConfig) -> anyhow::Result<Outcome> {
    match config_path() {
        Ok(path) => println!("# {}", path.display()),
        Err(e) => warn!(error = %e, "cannot resolve configuration path"),
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(Outcome::Success)
}
