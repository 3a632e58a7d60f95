//! # Realm Server Library
//!
//! A tick-based game server speaking a framed binary protocol over TCP.
//! Players log in through an RSA-protected handshake, are represented in the
//! world as entities built from components, and receive one batch of update
//! packets per tick describing what they can see.
//!
//! ## Core Responsibilities
//!
//! ### Login Gate
//! Every accepted socket runs the handshake on its own task:
//! - Connect magic, world capacity and login switch checks
//! - Credential block decryption and revision check
//! - Account lookup, creation and password verification
//! - Reconnects onto a player whose connection dropped
//!
//! Accepted connections are queued for the tick loop, which is the only place
//! entities are created or touched.
//!
//! ### Entity Simulation
//! Entities are a position plus a set of components ordered by priority.
//! Components talk to each other only through messages delivered by the
//! entity, so adding behaviour means adding a component rather than editing
//! the others.
//!
//! ### Client Synchronisation
//! After movement and sight are settled each tick, every connected client is
//! sent its region changes, ground item changes and one entity update packet
//! carrying movement and update flags for itself and everything in view.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Tick Loop
//! The [`game::World`] is owned by one task and advanced by a fixed interval.
//! Sockets are read and written by small per-connection tasks that exchange
//! raw bytes with the world over channels, so a tick never waits on I/O.
//!
//! ### Presence Directory
//! The login gate needs to know who is online without touching the world.
//! The tick loop publishes a presence record per player in a shared
//! [`directory::PlayerDirectory`], and the gate reserves a name there before
//! handing a login over.
//!
//! ## Module Organization
//!
//! - `gate`: the login handshake state machine
//! - `network`: listener, tick loop and per-connection socket tasks
//! - `game`: the world and its tick phases
//! - `entity`, `components`: the entity message bus and its components
//! - `transform`, `directions`, `sight`: positions, pathing and visibility
//! - `update`, `sync`: update flags and per-client packet composition
//! - `accounts`, `crypto`, `config`, `directory`, `error`: supporting services
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use server::accounts::MemoryAccountStore;
//! use server::config::ServerConfig;
//! use server::crypto::LoginKey;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::parse();
//!     let key = LoginKey::load_or_generate(&config.private_key)?;
//!     let mut server = Server::new(config, key, Arc::new(MemoryAccountStore::new())).await?;
//!
//!     // Ticks until ctrl-c, then saves every player
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod components;
pub mod config;
pub mod crypto;
pub mod directions;
pub mod directory;
pub mod entity;
pub mod error;
pub mod factory;
pub mod game;
pub mod gate;
pub mod network;
pub mod probe;
pub mod sight;
pub mod sync;
pub mod transform;
pub mod update;
