//! Human-readable output for envelopes and agent status

use chrono::{DateTime, Local, TimeDelta};
use ctxmesh_common::{ContextId, Entry, EntryKind, Envelope, Reply, ReplicaView, ServerId};
use ctxmesh_proto::AgentStatus;
use std::fmt::Write;

pub fn render_envelope(envelope: &Envelope) -> String {
    if let Some(error) = &envelope.error {
        return format!("error [{}]: {}", error.kind, error.message);
    }
    match &envelope.data {
        Some(reply) => render_reply(reply),
        None => "ok".to_string(),
    }
}

pub fn render_reply(reply: &Reply) -> String {
    match reply {
        Reply::Created { context, servers } => {
            format!("context {} created on servers {}", context, join(servers))
        }
        Reply::RoundOpened {
            context,
            round,
            responses,
        } => {
            let mut out = format!("round {} on context {}\n", round, context);
            for (server, text) in responses {
                let _ = writeln!(out, "  [server {}] {}", server, text);
            }
            let _ = write!(out, "choose one with: choose {} <server_id>", context);
            out
        }
        Reply::Chosen {
            context,
            round,
            server,
            committed,
            ..
        } => format!(
            "round {} on context {}: committed server {}'s response to servers {}",
            round,
            context,
            server,
            join(committed)
        ),
        Reply::Context { context, replicas } => render_context(*context, replicas),
        Reply::AllContexts { contexts } => {
            if contexts.is_empty() {
                return "no contexts".to_string();
            }
            contexts
                .iter()
                .map(|(context, replicas)| render_context(*context, replicas))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Reply::Link { src, dest, up } => {
            format!("link {} <-> {} {}", src, dest, if *up { "up" } else { "down" })
        }
        Reply::Node { node, alive } => {
            format!("server {} {}", node, if *alive { "alive" } else { "failed" })
        }
        Reply::Resynced { context, updated } => {
            if updated.is_empty() {
                format!("context {} already in sync", context)
            } else {
                format!("resync of context {} updated servers {}", context, join(updated))
            }
        }
    }
}

fn render_context(context: ContextId, replicas: &ReplicaView) -> String {
    let mut out = format!("context {}", context);
    for (server, entries) in replicas {
        let _ = write!(out, "\n  server {}:", server);
        if entries.is_empty() {
            out.push_str(" (empty)");
        }
        for entry in entries {
            let _ = write!(out, "\n    {}", render_entry(entry));
        }
    }
    out
}

fn render_entry(entry: &Entry) -> String {
    match &entry.kind {
        EntryKind::Query { text } => format!("#{} query from {}: {}", entry.seq, entry.origin, text),
        EntryKind::Response { text } => {
            format!("#{} response by {}: {}", entry.seq, entry.origin, text)
        }
    }
}

fn join(servers: &[ServerId]) -> String {
    if servers.is_empty() {
        return "(none)".to_string();
    }
    servers
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn links(pairs: &[(ServerId, ServerId)]) -> String {
    if pairs.is_empty() {
        return "(none)".to_string();
    }
    pairs
        .iter()
        .map(|(a, b)| format!("{}-{}", a, b))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_status(status: &AgentStatus, now: DateTime<Local>) -> String {
    let started = TimeDelta::try_seconds(status.uptime_seconds as i64)
        .and_then(|uptime| now.checked_sub_signed(uptime))
        .unwrap_or(now);

    let mut out = String::new();
    let _ = writeln!(out, "Agent Status");
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "Version:          {}", status.version);
    let _ = writeln!(out, "Servers:          {}", status.servers);
    let _ = writeln!(out, "Ingress:          {}", status.ingress);
    let _ = writeln!(out, "Routing:          {}", status.routing);
    let _ = writeln!(out, "Commit:           {}", status.commit);
    let _ = writeln!(out, "Alive:            {}", join(&status.alive));
    let _ = writeln!(out, "Failed Links:     {}", links(&status.failed_links));
    let _ = writeln!(out, "Contexts:         {}", status.contexts);
    let _ = writeln!(out, "Sessions:         {}", status.sessions);
    let _ = writeln!(out, "Commands Handled: {}", status.commands_handled);
    let _ = write!(
        out,
        "Uptime:           {}s (since {})",
        status.uptime_seconds,
        started.format("%Y-%m-%d %H:%M:%S")
    );
    out
}
