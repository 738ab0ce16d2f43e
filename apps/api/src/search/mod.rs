// Search runs: HTTP surface, the per-run pipeline and the registry of live runs.

pub mod handlers;
pub mod pipeline;
pub mod registry;
pub mod url;
