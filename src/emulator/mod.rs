/*
 *  emulator/mod.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Engine emulator: runs a plugin script without a game server
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! Stands in for the engine: obtains a callback object through
//! `CreateInterface` like a real host would, then drives it through a
//! level with a few clients.
//!
//! - [`config`]: layered scenario configuration
//! - [`session`]: the callback sequence itself

pub mod config;
pub mod session;

pub use config::{ClientConfig, ConfigError, EmulatorConfig, SessionConfig};
pub use session::{ConnectOutcome, Scenario, SessionReport, run};
