mod common;
mod recompile;
mod sled_store;
mod transactions;
