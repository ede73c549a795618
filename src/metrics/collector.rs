use crate::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Prometheus collectors for the command surface and query rounds
pub struct MeshMetrics {
    registry: Registry,
    commands: IntCounterVec,
    rounds_opened: IntCounter,
    responses_collected: IntCounter,
    undelivered: IntCounterVec,
    open_rounds: IntGauge,
}

impl MeshMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let commands = IntCounterVec::new(
            Opts::new("ctxmesh_commands_total", "Commands handled by outcome"),
            &["command", "outcome"],
        )?;
        let rounds_opened = IntCounter::new(
            "ctxmesh_rounds_opened_total",
            "Query rounds opened with at least one response",
        )?;
        let responses_collected = IntCounter::new(
            "ctxmesh_responses_collected_total",
            "Candidate responses collected across all rounds",
        )?;
        let undelivered = IntCounterVec::new(
            Opts::new(
                "ctxmesh_undelivered_total",
                "Cross-server messages that did not complete",
            ),
            &["reason"],
        )?;
        let open_rounds = IntGauge::new("ctxmesh_open_rounds", "Rounds awaiting a choice")?;

        registry.register(Box::new(commands.clone()))?;
        registry.register(Box::new(rounds_opened.clone()))?;
        registry.register(Box::new(responses_collected.clone()))?;
        registry.register(Box::new(undelivered.clone()))?;
        registry.register(Box::new(open_rounds.clone()))?;

        Ok(Self {
            registry,
            commands,
            rounds_opened,
            responses_collected,
            undelivered,
            open_rounds,
        })
    }

    pub fn record_command(&self, command: &str, outcome: &str) {
        self.commands.with_label_values(&[command, outcome]).inc();
    }

    pub fn round_opened(&self, responses: usize) {
        self.rounds_opened.inc();
        self.responses_collected.inc_by(responses as u64);
        self.open_rounds.inc();
    }

    pub fn round_closed(&self) {
        self.open_rounds.dec();
    }

    pub fn undelivered(&self, reason: &str) {
        self.undelivered.with_label_values(&[reason]).inc();
    }

    pub fn commands_total(&self, command: &str, outcome: &str) -> u64 {
        self.commands.with_label_values(&[command, outcome]).get()
    }

    pub fn open_rounds(&self) -> i64 {
        self.open_rounds.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
