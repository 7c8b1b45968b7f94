/*
 *  lib.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Bridge entry point: the CreateInterface export
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

//! luaplug
//!
//! A Source engine server plugin whose callbacks are written in Lua.
//!
//! Copy the built library next to a Lua script with the same base name
//! (`addons/hello.so` + `addons/hello.lua`, or `addons/hello/init.lua`) and
//! load it like any other server plugin. The script returns a table; each
//! engine callback invokes the table method of the same name, if it exists.
//!
//! ```lua
//! local Hello = {}
//!
//! function Hello:Load(interface_factory, game_server_factory)
//!     print("hello from Lua")
//! end
//!
//! function Hello:ClientCommand(entity, args)
//!     return PluginResult.CONTINUE
//! end
//!
//! return Hello
//! ```

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

pub mod abi;
pub mod engine;
pub mod error;
pub mod guard;
pub mod identity;
pub mod platform;
pub mod plugin;
pub mod script;

#[cfg(feature = "emulator")]
pub mod emulator;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

pub use abi::{Facade, HostFlavor, PluginResult, Router, ShapeKind};
pub use engine::{LogSink, MemorySink};
pub use error::BridgeError;
pub use platform::{HostOverrides, install_overrides};
pub use plugin::Plugin;

/// The plugin's interface factory, looked up by name by the engine.
///
/// Returns the callback object for a supported `ISERVERPLUGINCALLBACKS`
/// version, or null. `return_code`, when given, receives 1 on success and
/// 0 otherwise.
///
/// # Safety
///
/// `name` must be null or a NUL terminated string and `return_code` null or
/// valid for a write.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn CreateInterface(name: *const c_char, return_code: *mut c_int) -> *mut c_void {
    let interface = panic::catch_unwind(AssertUnwindSafe(|| {
        let Some(sink) = engine::host_sink() else {
            return ptr::null_mut();
        };
        if name.is_null() {
            return ptr::null_mut();
        }
        // SAFETY: non-null and NUL terminated per the contract above.
        let version = unsafe { CStr::from_ptr(name) };
        abi::router::global(&sink).lookup(version)
    }))
    .unwrap_or(ptr::null_mut());

    // SAFETY: checked for null, valid for a write per the contract above.
    if let Some(status) = unsafe { return_code.as_mut() } {
        *status = c_int::from(!interface.is_null());
    }
    interface
}
