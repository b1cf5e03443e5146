use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::sha256_hex;
use crate::model::Snapshot;

const MANIFEST_ENTRY: &str = "manifest.json";
const SNAPSHOT_ENTRY: &str = "snapshot.json";
const SETTINGS_ENTRY: &str = "settings.json";
pub const BUNDLE_FORMAT_V1: &str = "reportcard-workspace-v1";
pub const RAW_SNAPSHOT_FORMAT: &str = "raw-snapshot-json";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub snapshot_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportedBundle {
    pub bundle_format_detected: String,
    pub snapshot: Snapshot,
    /// `None` for raw documents, which carry no settings.
    pub settings: Option<serde_json::Map<String, serde_json::Value>>,
}

pub fn export_workspace_bundle(
    snapshot: &Snapshot,
    settings: &serde_json::Map<String, serde_json::Value>,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let snapshot_text =
        serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;
    let snapshot_sha256 = sha256_hex(snapshot_text.as_bytes());

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "snapshotSha256": snapshot_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(SNAPSHOT_ENTRY, opts)
        .context("failed to start snapshot entry")?;
    zip.write_all(snapshot_text.as_bytes())
        .context("failed to write snapshot entry")?;

    zip.start_file(SETTINGS_ENTRY, opts)
        .context("failed to start settings entry")?;
    zip.write_all(
        serde_json::to_string_pretty(settings)
            .context("failed to serialize settings")?
            .as_bytes(),
    )
    .context("failed to write settings entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        snapshot_sha256,
    })
}

/// Reads a bundle without touching the workspace. The caller swaps the
/// result in once it has been fully validated.
pub fn import_workspace_bundle(in_path: &Path) -> anyhow::Result<ImportedBundle> {
    if !is_zip_file(in_path)? {
        let text = std::fs::read_to_string(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&text).context("input is neither a zip bundle nor snapshot JSON")?;
        return Ok(ImportedBundle {
            bundle_format_detected: RAW_SNAPSHOT_FORMAT.to_string(),
            snapshot: snapshot.upgrade()?,
            settings: None,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let manifest_text = read_entry(&mut archive, MANIFEST_ENTRY)?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let expected = manifest
        .get("snapshotSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing snapshotSha256"))?;
    let snapshot_text = read_entry(&mut archive, SNAPSHOT_ENTRY)?;
    let actual = sha256_hex(snapshot_text.as_bytes());
    if actual != expected {
        return Err(anyhow!(
            "snapshot checksum mismatch: manifest {}, actual {}",
            expected,
            actual
        ));
    }
    let snapshot: Snapshot =
        serde_json::from_str(&snapshot_text).context("snapshot.json is invalid")?;

    let settings = match archive.by_name(SETTINGS_ENTRY) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .context("failed to read settings.json")?;
            serde_json::from_str(&text).context("settings.json is invalid")?
        }
        Err(_) => serde_json::Map::new(),
    };

    Ok(ImportedBundle {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        snapshot: snapshot.upgrade()?,
        settings: Some(settings),
    })
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> anyhow::Result<String> {
    let mut text = String::new();
    archive
        .by_name(name)
        .with_context(|| format!("bundle missing {}", name))?
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(text)
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
