pub mod background_saver;
pub mod commands;
pub mod controller;
pub mod events;
pub mod keydb;
pub mod registry;
pub mod respawn;
pub mod session;
pub mod snapshot;
pub mod world;

#[cfg(test)]
pub(crate) mod testutil;
