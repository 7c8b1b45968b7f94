/*
 *  abi/ffi.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  C ABI types shared with the host engine
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

//! FFI types for the server plugin interface
//!
//! The host sees the bridge as a C++ object: a pointer to a table of
//! virtual functions followed by data it never touches. Every type here is
//! `#[repr(C)]` or an opaque handle so the layout matches what the engine
//! was compiled against.

use std::ffi::{c_char, c_int, c_void};

use super::adapter::Facade;

/// Declares a virtual member function (or its pointer type) with the calling
/// convention the engine uses for C++ methods: `thiscall` on 32-bit Windows,
/// the C convention with `this` first everywhere else.
#[cfg(all(windows, target_arch = "x86"))]
macro_rules! virtual_fn {
    (fn $($rest:tt)*) => { unsafe extern "thiscall" fn $($rest)* };
    ($vis:vis fn $($rest:tt)*) => { $vis unsafe extern "thiscall" fn $($rest)* };
}

#[cfg(not(all(windows, target_arch = "x86")))]
macro_rules! virtual_fn {
    (fn $($rest:tt)*) => { unsafe extern "C" fn $($rest)* };
    ($vis:vis fn $($rest:tt)*) => { $vis unsafe extern "C" fn $($rest)* };
}

pub(crate) use virtual_fn;

/// What a callback tells the engine to do with the event.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginResult {
    /// Keep going with other plugins
    #[default]
    Continue = 0,
    /// Run the game's own handling, but use our return value
    Override = 1,
    /// Skip other plugins and the game
    Stop = 2,
}

impl PluginResult {
    pub const ALL: [PluginResult; 3] = [Self::Continue, Self::Override, Self::Stop];

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| *r as i64 == code)
    }

    /// Name as exposed to scripts through the `PluginResult` global.
    pub fn name(self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Override => "OVERRIDE",
            Self::Stop => "STOP",
        }
    }
}

/// Opaque engine entity (`edict_t`)
#[repr(C)]
pub struct Edict {
    _private: [u8; 0],
}

/// Opaque console command arguments (`CCommand`)
#[repr(C)]
pub struct Command {
    _private: [u8; 0],
}

/// The engine's interface factory, `void *(const char *name, int *status)`.
pub type CreateInterfaceFn = unsafe extern "C" fn(name: *const c_char, return_code: *mut c_int) -> *mut c_void;

// Slot signatures. `this` always points at a `Facade`.

pub type LoadFn = virtual_fn!(fn(
    this: *mut Facade,
    interface_factory: Option<CreateInterfaceFn>,
    game_server_factory: Option<CreateInterfaceFn>,
) -> bool);
pub type VoidFn = virtual_fn!(fn(this: *mut Facade));
pub type DescriptionFn = virtual_fn!(fn(this: *mut Facade) -> *const c_char);
pub type LevelInitFn = virtual_fn!(fn(this: *mut Facade, map_name: *const c_char));
pub type ServerActivateFn = virtual_fn!(fn(this: *mut Facade, edict_list: *mut Edict, edict_count: c_int, client_max: c_int));
pub type GameFrameFn = virtual_fn!(fn(this: *mut Facade, simulating: bool));
pub type EdictFn = virtual_fn!(fn(this: *mut Facade, entity: *mut Edict));
pub type EdictFreedFn = virtual_fn!(fn(this: *mut Facade, entity: *const Edict));
pub type ClientPutInServerFn = virtual_fn!(fn(this: *mut Facade, entity: *mut Edict, player_name: *const c_char));
pub type SetCommandClientFn = virtual_fn!(fn(this: *mut Facade, index: c_int));
pub type ClientConnectFn = virtual_fn!(fn(
    this: *mut Facade,
    allow_connect: *mut bool,
    entity: *mut Edict,
    name: *const c_char,
    address: *const c_char,
    reject: *mut c_char,
    max_reject_length: c_int,
) -> PluginResult);
pub type ClientCommandFn = virtual_fn!(fn(this: *mut Facade, entity: *mut Edict, args: *const Command) -> PluginResult);
pub type NetworkIdValidatedFn = virtual_fn!(fn(this: *mut Facade, user_name: *const c_char, network_id: *const c_char) -> PluginResult);
pub type QueryCvarValueFinishedFn = virtual_fn!(fn(
    this: *mut Facade,
    cookie: c_int,
    player: *mut Edict,
    status: c_int,
    cvar_name: *const c_char,
    cvar_value: *const c_char,
));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes_match_the_engine() {
        assert_eq!(PluginResult::Continue as c_int, 0);
        assert_eq!(PluginResult::Override as c_int, 1);
        assert_eq!(PluginResult::Stop as c_int, 2);
        assert_eq!(std::mem::size_of::<PluginResult>(), std::mem::size_of::<c_int>());
    }

    #[test]
    fn test_from_code() {
        assert_eq!(PluginResult::from_code(1), Some(PluginResult::Override));
        assert_eq!(PluginResult::from_code(3), None);
        assert_eq!(PluginResult::from_code(-1), None);
    }

    #[test]
    fn test_slots_are_pointer_sized() {
        assert_eq!(std::mem::size_of::<ClientConnectFn>(), std::mem::size_of::<usize>());
        assert_eq!(std::mem::size_of::<Option<CreateInterfaceFn>>(), std::mem::size_of::<usize>());
    }

    #[test]
    fn test_adapters_fit_their_slot_types() {
        use crate::abi::adapter;

        let load: LoadFn = adapter::load;
        let connect: ClientConnectFn = adapter::client_connect;
        let freed: EdictFreedFn = adapter::on_edict_freed;
        let this = std::ptr::null_mut();
        unsafe {
            assert!(!load(this, None, None));
            let mut allow = true;
            let result = connect(this, &mut allow, std::ptr::null_mut(), std::ptr::null(), std::ptr::null(), std::ptr::null_mut(), 0);
            assert_eq!(result, PluginResult::Continue);
            freed(this, std::ptr::null());
        }
    }
}
