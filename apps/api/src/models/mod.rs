pub mod job;
pub mod profile;
pub mod progress;
pub mod search;
