pub mod blocks;
pub mod client;
pub mod collection;
pub mod config;
pub mod export;
pub mod reconcile;
pub mod record;
pub mod runtime;

#[cfg(test)]
mod test_support;
