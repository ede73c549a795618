use crate::metrics::collector::MeshMetrics;
use crate::{MeshError, Result};
use prometheus::{Encoder, TextEncoder};

/// Render every collector in the Prometheus text exposition format
pub fn encode_text(metrics: &MeshMetrics) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metrics.registry().gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| MeshError::MetricsError(prometheus::Error::Msg(e.to_string())))
}
