use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use castcontrol::{DeviceController, DeviceRecord, Discoverer, FoundCallback};
use castserver::{MediaServer, build_media_url};
use casttranscode::Transcoder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Picks a device by 1-based list index, then exact name, then name substring
/// (names compared case-insensitively).
pub fn select_device<'a>(devices: &'a [DeviceRecord], selector: &str) -> Option<&'a DeviceRecord> {
    if let Ok(index) = selector.trim().parse::<usize>() {
        return index.checked_sub(1).and_then(|i| devices.get(i));
    }

    let wanted = selector.trim().to_lowercase();
    devices
        .iter()
        .find(|d| d.display_name().to_lowercase() == wanted)
        .or_else(|| {
            devices
                .iter()
                .find(|d| d.display_name().to_lowercase().contains(&wanted))
        })
}

fn is_description_url(selector: &str) -> bool {
    selector.starts_with("http://") || selector.starts_with("https://")
}

fn describe(index: usize, device: &DeviceRecord) -> String {
    let model = [device.manufacturer.as_deref(), device.model_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if model.is_empty() {
        format!("[{}] {}  {}", index, device.display_name(), device.location)
    } else {
        format!(
            "[{}] {} ({})  {}",
            index,
            device.display_name(),
            model,
            device.location
        )
    }
}

async fn search(timeout: Option<u64>, cancel: &CancellationToken, live: bool) -> Result<Vec<DeviceRecord>> {
    let discoverer = Discoverer::new_configured().context("cannot open SSDP socket")?;
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or(discoverer.options().timeout);

    let on_found: Option<FoundCallback> = if live {
        Some(Arc::new(|device: &DeviceRecord| {
            println!("  found {} ({})", device.display_name(), device.location);
        }))
    } else {
        None
    };

    Ok(discoverer.search(timeout, cancel, on_found).await)
}

pub async fn discover(timeout: Option<u64>, json: bool, cancel: &CancellationToken) -> Result<()> {
    let devices = search(timeout, cancel, !json).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No renderer found");
    } else {
        println!("{} device(s):", devices.len());
        for (i, device) in devices.iter().enumerate() {
            println!("{}", describe(i + 1, device));
        }
    }
    Ok(())
}

pub async fn tracks(file: &Path, json: bool) -> Result<()> {
    let transcoder = Transcoder::new_configured()?;
    let result = async {
        let subtitles = transcoder.probe_subtitles(file).await?;
        let audio = transcoder.probe_audio(file).await?;

        if json {
            let report = serde_json::json!({ "subtitles": subtitles, "audio": audio });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Subtitles:");
        if subtitles.is_empty() {
            println!("  none");
        }
        for track in &subtitles {
            println!(
                "  {}{}: {} {}",
                track.position,
                if track.is_default { "*" } else { " " },
                if track.language.is_empty() { "und" } else { &track.language },
                track.title
            );
        }

        println!("Audio:");
        if audio.is_empty() {
            println!("  none");
        }
        for track in &audio {
            println!(
                "  {}{}: {} [{}] {}",
                track.position,
                if track.is_default { "*" } else { " " },
                if track.language.is_empty() { "und" } else { &track.language },
                track.codec_name,
                track.title
            );
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    transcoder.cleanup().await?;
    result
}

pub async fn serve(dir: &Path, cancel: &CancellationToken) -> Result<()> {
    let server = MediaServer::new_configured();
    let base_url = server.start(dir).await?;
    println!("Serving {} at {}", dir.display(), base_url);
    println!("Press Ctrl+C to stop...");

    cancel.cancelled().await;
    server.stop().await;
    Ok(())
}

pub async fn cast(
    file: &Path,
    device: Option<&str>,
    subtitle: Option<u32>,
    audio: Option<u32>,
    timeout: Option<u64>,
    cancel: &CancellationToken,
) -> Result<()> {
    let file = std::fs::canonicalize(file)
        .with_context(|| format!("cannot open {}", file.display()))?;
    let (dir, file_name) = split_media_path(&file)?;

    let location = match device {
        Some(selector) if is_description_url(selector) => selector.to_string(),
        selector => {
            let devices = search(timeout, cancel, true).await?;
            let chosen = match selector {
                Some(selector) => select_device(&devices, selector)
                    .ok_or_else(|| anyhow!("no renderer matches '{}'", selector))?,
                None => devices.first().ok_or_else(|| anyhow!("no renderer found"))?,
            };
            info!("Selected {}", chosen.display_name());
            chosen.location.clone()
        }
    };

    let server = MediaServer::new_configured();
    let base_url = server.start(&dir).await?;
    let media_url = build_media_url(&base_url, &file_name, subtitle, audio);

    let played = async {
        let controller = DeviceController::create_configured(&location, cancel).await?;
        controller.play_media(&media_url, cancel).await?;
        println!(
            "Playing {} on {}",
            file_name,
            controller.device_info().friendly_name
        );
        println!("Press Ctrl+C to stop...");
        cancel.cancelled().await;
        controller.stop();
        Ok::<(), castcontrol::ControlError>(())
    }
    .await;

    server.stop().await;
    if let Err(e) = &played {
        warn!("Cast failed: {}", e);
    }
    played.map_err(Into::into)
}

fn split_media_path(file: &Path) -> Result<(PathBuf, String)> {
    let dir = file
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", file.display()))?;
    let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
        bail!("{} is not a valid file name", file.display());
    };
    Ok((dir.to_path_buf(), name.to_string()))
}
