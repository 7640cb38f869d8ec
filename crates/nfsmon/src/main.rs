use anyhow::{Context, Result};
use clap::Parser;
use nfsmon::{
    config::{load_config, Args, Config},
    monitors::StateKind,
    pages::{ClientsChange, ClientsPage, StatsChange, StatsPage},
    report,
    source::{fetch_once, Endpoint, HttpSource},
};
use nfsmon_core::VersionInfo;
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = load_config(Args::parse()).context("invalid configuration")?;
    init_logging(&config);

    let source = HttpSource::new(config.base_url.clone()).context("failed to build http client")?;
    info!(
        event = "nfsmon_start",
        url = %config.base_url,
        poll_ms = config.poll.interval.as_millis() as u64,
        sequencing = %config.poll.sequencing,
        hidden_sections = %config.poll.hidden_sections
    );

    match fetch_once::<_, VersionInfo>(&source, &Endpoint::Version).await {
        Ok(version) => println!("server version {version}"),
        Err(err) => warn!(event = "version_fetch_failed", kind = err.kind(), error = %err),
    }

    let mut stats = config
        .pages
        .stats()
        .then(|| StatsPage::open(&source, config.poll));
    let mut clients = config
        .pages
        .clients()
        .then(|| ClientsPage::open(&source, config.poll));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(event = "nfsmon_stop", reason = "signal");
                break;
            }
            change = next_stats_change(&mut stats) => match change {
                Some(change) => print_stats(&stats, change),
                None => {
                    error!(event = "page_closed", page = "stats");
                    stats = None;
                }
            },
            change = next_clients_change(&mut clients) => match change {
                Some(change) => print_clients(&clients, change),
                None => {
                    error!(event = "page_closed", page = "clients");
                    clients = None;
                }
            },
        }
        if stats.is_none() && clients.is_none() {
            break;
        }
    }

    Ok(())
}

async fn next_stats_change(page: &mut Option<StatsPage>) -> Option<StatsChange> {
    match page {
        Some(page) => page.changed().await,
        None => std::future::pending().await,
    }
}

async fn next_clients_change(page: &mut Option<ClientsPage<HttpSource>>) -> Option<ClientsChange> {
    match page {
        Some(page) => page.changed().await,
        None => std::future::pending().await,
    }
}

fn print_stats(page: &Option<StatsPage>, change: StatsChange) {
    let Some(page) = page else {
        return;
    };
    match change {
        StatsChange::Filesystem => {
            for line in report::filesystem_lines(&page.filesystem.borrow()) {
                println!("{line}");
            }
        }
        StatsChange::Operations(family) => {
            println!("{}", report::operations_line(family, &page.operations(family).borrow()));
        }
    }
}

fn print_clients(page: &Option<ClientsPage<HttpSource>>, change: ClientsChange) {
    let Some(page) = page else {
        return;
    };
    match change {
        ClientsChange::Clients => println!("{}", report::clients_line(&page.clients().borrow())),
        ClientsChange::Summary => {
            if let Some(summary) = page.summary() {
                for line in report::summary_lines(&summary.borrow()) {
                    println!("{line}");
                }
            }
        }
        ClientsChange::State(kind) => print_state(page, kind),
    }
}

fn print_state(page: &ClientsPage<HttpSource>, kind: StateKind) {
    if let Some(state) = page.state(kind) {
        println!("{}", report::state_line(kind, &state.borrow()));
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let make_writer = if config.log_stderr {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::sink)
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialised");
    }
}
