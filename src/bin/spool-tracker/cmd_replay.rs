use std::path::Path;

use anyhow::Result;
use bambulabs::{
    message::{Message, Print},
    parser::parse_message,
};
use spool_tracker::{
    CheckpointStore, Config, Dispatcher, DryRunInventory, FilamentTracker, Inventory, ModelFetcher, ModelProvider,
    SettingsFile, SpoolDirectory, SpoolSwitch, TagDirectory, TrayConfiguration,
};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn main(cfg: &Config, file: &Path, dry_run: bool) -> Result<()> {
    let models = ModelFetcher::new(cfg.models.timeout())?;
    let trays = SettingsFile::new(&cfg.tracker.settings_file);
    let checkpoints = CheckpointStore::new(&cfg.tracker.checkpoint_dir);

    if dry_run {
        let tracker = FilamentTracker::new(models, DryRunInventory, trays, checkpoints);
        return replay(Dispatcher::new(tracker), None::<SpoolSwitch<TagDirectory>>, file).await;
    }

    let spoolman = spoolman::Client::new(&cfg.spoolman.url, cfg.spoolman.verify_tls, cfg.spoolman.timeout())?;
    match spoolman.health().await {
        Ok(true) => match spoolman.info().await {
            Ok(info) => tracing::info!(url = cfg.spoolman.url, version = info.version, "connected to spoolman"),
            Err(e) => tracing::warn!(url = cfg.spoolman.url, error = format!("{:?}", e), "failed to get spoolman info"),
        },
        Ok(false) => tracing::warn!(url = cfg.spoolman.url, "spoolman is unhealthy, consumption may be lost"),
        Err(e) => tracing::warn!(
            url = cfg.spoolman.url,
            error = format!("{:?}", e),
            "spoolman unreachable, consumption will be lost"
        ),
    }

    let switch = cfg.spoolman.tray_uuid_field.as_ref().map(|field| {
        tracing::info!(field, "assigning tagged spools to trays");
        SpoolSwitch::new(
            TagDirectory::new(spoolman.clone(), field.clone()),
            SettingsFile::new(&cfg.tracker.settings_file),
        )
    });

    let tracker = FilamentTracker::new(models, spoolman, trays, checkpoints);
    replay(Dispatcher::new(tracker), switch, file).await
}

async fn replay<M, I, T, D>(
    mut dispatcher: Dispatcher<M, I, T>,
    mut switch: Option<SpoolSwitch<D>>,
    file: &Path,
) -> Result<()>
where
    M: ModelProvider,
    I: Inventory,
    T: TrayConfiguration,
    D: SpoolDirectory,
{
    let mut lines = BufReader::new(tokio::fs::File::open(file).await?).lines();

    let mut reports = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = parse_message(line.as_bytes());
        if let (Some(switch), Message::Print(Print::PushStatus(push))) = (switch.as_mut(), &message) {
            switch.sync(push).await;
        }
        dispatcher.dispatch(&message).await;
        reports += 1;
    }

    tracing::info!(
        reports,
        tracking = dispatcher.tracker().is_tracking(),
        status = format!("{:?}", dispatcher.status()),
        "replay finished"
    );
    Ok(())
}
