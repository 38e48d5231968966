pub mod channel;
pub mod commit;
pub mod common;
pub mod completions;
pub mod config;
pub mod plan;
pub mod status;
pub mod sync;
pub mod tx;
pub mod wallet;
