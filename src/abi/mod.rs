/*
 *  abi/mod.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Binary interface between the engine and the plugin
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

//! The engine loads a server plugin, asks its `CreateInterface` for an
//! `IServerPluginCallbacks` of some revision and then calls into the
//! returned C++ object for the rest of the session.
//!
//! - [`ffi`]: C-compatible types and slot signatures
//! - [`shapes`]: one vtable layout per interface revision
//! - [`adapter`]: the slot functions and the object handed to the engine
//! - [`router`]: version string to facade lookup

pub mod adapter;
pub mod ffi;
pub mod router;
pub mod shapes;

pub use adapter::Facade;
pub use ffi::{Command, CreateInterfaceFn, Edict, PluginResult};
pub use router::{HostFlavor, Router};
pub use shapes::{CallbackTable, CallbacksPortal2, CallbacksV1, CallbacksV2, CallbacksV3, ShapeKind};
