pub mod collector;
pub mod exporter;

pub use collector::MeshMetrics;
pub use exporter::encode_text;
