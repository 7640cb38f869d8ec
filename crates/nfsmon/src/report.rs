//! Plain-text rendering of reconciled views for the headless monitor.

use crate::monitors::{
    ClientListView, ClientSummaryView, FilesystemView, OperationsView, StateKind, StateSummaryView,
};
use crate::scheduler::{Feed, FeedHealth};
use nfsmon_core::{format_addresses, humanize_optional, Device, ProtocolFamily, Replica};

fn health_suffix(health: &FeedHealth) -> String {
    if health.stale {
        format!(" [stale after {} failures]", health.consecutive_failures)
    } else {
        String::new()
    }
}

pub fn filesystem_lines(feed: &Feed<FilesystemView>) -> Vec<String> {
    let view = &feed.view;
    let stats = &view.stats;
    let mut lines = vec![
        format!(
            "fs space total={} free={} avail={}{}",
            humanize_optional(stats.total_space),
            humanize_optional(stats.free_space),
            humanize_optional(stats.avail_space),
            health_suffix(&feed.health)
        ),
        format!(
            "fs files total={} free={} avail={} repair_queue={}",
            humanize_optional(stats.total_files),
            humanize_optional(stats.free_files),
            humanize_optional(stats.avail_files),
            stats
                .repair_queue_size
                .map(|size| size.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
    ];
    if !view.devices.is_hidden() {
        lines.extend(view.devices.list().iter().map(device_line));
    }
    if !view.replicas.is_hidden() {
        lines.extend(view.replicas.list().iter().map(replica_line));
    }
    lines
}

fn device_line(device: &Device) -> String {
    format!(
        "device {} state={} color={} owner={} free={}/{} addrs={}",
        device.id,
        device.state,
        device.color.map(|color| color.as_str()).unwrap_or("-"),
        device.owner.as_deref().unwrap_or("-"),
        humanize_optional(device.free_space),
        humanize_optional(device.total_space),
        format_addresses(device.addresses.as_deref().unwrap_or_default()).join(",")
    )
}

fn replica_line(replica: &Replica) -> String {
    format!(
        "replica {} state={} color={} addrs={}",
        replica.id,
        replica.state,
        replica.color.map(|color| color.as_str()).unwrap_or("-"),
        format_addresses(replica.addresses.as_deref().unwrap_or_default()).join(",")
    )
}

pub fn operations_line(family: ProtocolFamily, feed: &Feed<OperationsView>) -> String {
    let counts: Vec<String> = feed
        .view
        .operations
        .iter()
        .map(|row| format!("{}={}", row.name, row.count))
        .collect();
    format!("{family} ops {}{}", counts.join(" "), health_suffix(&feed.health))
}

pub fn clients_line(feed: &Feed<ClientListView>) -> String {
    let clients: Vec<String> = feed
        .view
        .clients
        .iter()
        .map(|id| {
            if feed.view.selected() == Some(id) {
                format!("*{id}")
            } else {
                id.clone()
            }
        })
        .collect();
    format!("clients [{}]{}", clients.join(" "), health_suffix(&feed.health))
}

pub fn summary_lines(feed: &Feed<ClientSummaryView>) -> Vec<String> {
    let view = &feed.view;
    let mut lines = vec![format!(
        "client {} confirmed={} sessions={} channels=[{}]{}",
        view.client_id,
        view.confirmed,
        view.sessions.len(),
        view.channels(),
        health_suffix(&feed.health)
    )];
    for kind in StateKind::ALL {
        let states = view.states(kind);
        if states.ids.is_empty() {
            continue;
        }
        lines.push(format!(
            "  {kind} {} selected={}",
            states.ids.items().join(" "),
            states.selected().map(String::as_str).unwrap_or("-")
        ));
    }
    lines
}

pub fn state_line(kind: StateKind, feed: &Feed<StateSummaryView>) -> String {
    let view = &feed.view;
    match &view.detail {
        Some(detail) => format!(
            "  {kind} {} expiry={} fh={} revoked={} access={} deny={}{}",
            view.state_id,
            detail.expiry,
            detail.fh,
            detail.revoked,
            detail.access_bits().label(),
            detail.deny_bits().label(),
            health_suffix(&feed.health)
        ),
        None => format!("  {kind} {} pending", view.state_id),
    }
}
