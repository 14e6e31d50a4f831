use anyhow::{bail, Context, Result};
use arrears::{
    dispatch::{
        dispatch_batch, per_agency_targets, per_member_targets, DispatchConfig, DispatchMode,
        HttpTransport,
    },
    ingest::{parse_upload, SchemaVariant},
    stats,
};
use std::{env, fs, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

const USAGE: &str =
    "usage: arrears <file.csv|file.xlsx> [--variant full|notification] [--mode agency|member] [--send]";

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,arrears=info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();

    // ─── 2) parse arguments ──────────────────────────────────────────
    let mut path: Option<PathBuf> = None;
    let mut variant = SchemaVariant::Full;
    let mut mode = DispatchMode::PerAgency;
    let mut send = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--variant" => {
                let value = args.next().context("--variant needs a value")?;
                variant = match value.as_str() {
                    "full" => SchemaVariant::Full,
                    "notification" => SchemaVariant::NotificationOnly,
                    other => bail!("unknown variant \"{}\"\n{}", other, USAGE),
                };
            }
            "--mode" => {
                let value = args.next().context("--mode needs a value")?;
                mode = match value.as_str() {
                    "agency" => DispatchMode::PerAgency,
                    "member" => DispatchMode::PerMember,
                    other => bail!("unknown mode \"{}\"\n{}", other, USAGE),
                };
            }
            "--send" => send = true,
            other if path.is_none() => path = Some(PathBuf::from(other)),
            other => bail!("unexpected argument \"{}\"\n{}", other, USAGE),
        }
    }
    let path = path.context(USAGE)?;

    // ─── 3) ingest the file ──────────────────────────────────────────
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file path has no usable name")?
        .to_string();
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;

    let result = parse_upload(&bytes, &file_name, variant)?;
    let summary = stats::summarize(&result.groups);
    info!(
        total_members = result.total_members,
        total_agencies = result.total_agencies,
        rejected_rows = result.errors.len(),
        total_amount = summary.total_amount,
        average_days_late = summary.average_days_late,
        agencies_needing_lookup = summary.agencies_needing_lookup,
        "parsed {}",
        file_name
    );
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !send {
        return Ok(());
    }

    // ─── 4) dispatch notifications ───────────────────────────────────
    let endpoint = env::var("ARREARS_DISPATCH_URL")
        .context("ARREARS_DISPATCH_URL must be set to use --send")?;
    let reply_to =
        env::var("ARREARS_REPLY_TO").context("ARREARS_REPLY_TO must be set to use --send")?;

    let targets = match mode {
        DispatchMode::PerAgency => per_agency_targets(&result.groups, &reply_to),
        DispatchMode::PerMember => per_member_targets(&result.groups, &reply_to),
    };
    if targets.is_empty() {
        warn!("nothing to dispatch");
        return Ok(());
    }

    let transport = HttpTransport::new(Url::parse(&endpoint).context("parsing dispatch URL")?);
    let report = dispatch_batch(&transport, &targets, &DispatchConfig::default()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.overall_success {
        bail!(
            "{} of {} notifications failed",
            report.failed.len(),
            report.sent.len() + report.failed.len()
        );
    }
    Ok(())
}
