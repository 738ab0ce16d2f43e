// Candidate profile ingestion: résumé upload -> text -> summary -> embedding.

pub mod handlers;
pub mod ingest;
pub mod prompts;
