use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use bulkmail::configuration::get_configuration;
use bulkmail::contacts;
use bulkmail::dispatch::Dispatcher;
use bulkmail::domain::Campaign;
use bulkmail::reports::write_reports;
use bulkmail::schedule;
use bulkmail::telemetry::get_subscriber;
use bulkmail::telemetry::init_subscriber;
use tokio_util::sync::CancellationToken;

/// Run one campaign end to end: ingest, resolve the schedule, dispatch,
/// write the result artifacts. Everything before the dispatch call fails
/// fast; nothing is sent unless ingestion and scheduling both succeed.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("bulkmail", "info", std::io::stdout);
    init_subscriber(subscriber);

    let cfg = get_configuration().context("failed to load configuration")?;

    let contact_list = contacts::ingest(&cfg.campaign.contacts_path)?;
    for warning in &contact_list.warnings {
        tracing::warn!("{warning}");
    }
    for error in &contact_list.errors {
        tracing::error!("{error}");
    }
    tracing::info!(
        total = contact_list.total(),
        valid = contact_list.valid_count(),
        invalid = contact_list.invalid_count(),
        "ingested contact source {}",
        cfg.campaign.contacts_path
    );

    // resolved once for the whole campaign
    let schedule_time = cfg
        .campaign
        .schedule
        .as_deref()
        .map(schedule::parse)
        .transpose()?
        .map(|instant| schedule::provider_format(&instant));
    schedule::validate(schedule_time.as_deref())?;

    let template_path = &cfg.campaign.template_path;
    let body_template = std::fs::read_to_string(template_path)
        .with_context(|| format!("failed to read template {template_path}"))?;
    let template_name = Path::new(template_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(template_path)
        .to_string();

    let mut campaign = Campaign::new(
        cfg.sender.sender(),
        cfg.campaign.subject.clone(),
        body_template,
        template_name,
        contact_list.contacts,
    );
    campaign.schedule_time = schedule_time;

    let dispatcher = Dispatcher::new(cfg.provider.client(), cfg.dispatch.clone());

    // an interrupt stops scheduling new sends; whatever already completed
    // still gets reported
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; no further sends will be scheduled");
            interrupt.cancel();
        }
    });

    let started = Instant::now();
    let results = dispatcher.dispatch(&campaign, cancel).await;

    let sent = results.iter().filter(|r| r.success).count();
    let failed = results.len() - sent;
    tracing::info!(
        sent,
        failed,
        attempted = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "campaign {} complete",
        campaign.campaign_id
    );

    write_reports(
        &results,
        Path::new(&cfg.output.sent_report),
        Path::new(&cfg.output.failed_report),
    )
    .context("failed to write result artifacts")?;

    Ok(())
}
