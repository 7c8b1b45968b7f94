/*
 *  abi/shapes.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  The known IServerPluginCallbacks vtable layouts
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

//! Callback-interface shapes
//!
//! Each engine branch was compiled against one revision of
//! `IServerPluginCallbacks`. A shape is that revision's version string plus
//! its ordered virtual method list. Slot order is the ABI: the engine calls
//! "the n-th function in the table", so every table here is generated from a
//! single ordered list by [`callback_shape!`].

use std::ffi::c_void;

use super::adapter;
use super::ffi::*;
use super::router::HostFlavor;

/// A vtable struct for one shape.
///
/// # Safety
///
/// `SHAPE` must name the shape whose static table has type `Self`;
/// [`adapter::Facade::callbacks`] reinterprets the facade's vtable pointer
/// based on it.
pub unsafe trait CallbackTable: Sync + 'static {
    const SHAPE: ShapeKind;
    const VERSION: &'static str;
    /// Engine-side method names in slot order.
    const METHODS: &'static [&'static str];
}

macro_rules! callback_shape {
    (
        $(#[$meta:meta])*
        $name:ident = $kind:expr, $version:literal {
            $($method:ident ($host:literal): $ty:ty = $adapter:path,)*
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            $(pub $method: $ty,)*
        }

        impl $name {
            pub const TABLE: Self = Self {
                $($method: $adapter,)*
            };
        }

        unsafe impl CallbackTable for $name {
            const SHAPE: ShapeKind = $kind;
            const VERSION: &'static str = $version;
            const METHODS: &'static [&'static str] = &[$($host),*];
        }
    };
}

callback_shape! {
    /// `ISERVERPLUGINCALLBACKS001`, the original interface.
    CallbacksV1 = ShapeKind::V1, "ISERVERPLUGINCALLBACKS001" {
        load("Load"): LoadFn = adapter::load,
        unload("Unload"): VoidFn = adapter::unload,
        pause("Pause"): VoidFn = adapter::pause,
        un_pause("UnPause"): VoidFn = adapter::un_pause,
        get_plugin_description("GetPluginDescription"): DescriptionFn = adapter::get_plugin_description,
        level_init("LevelInit"): LevelInitFn = adapter::level_init,
        server_activate("ServerActivate"): ServerActivateFn = adapter::server_activate,
        game_frame("GameFrame"): GameFrameFn = adapter::game_frame,
        level_shutdown("LevelShutdown"): VoidFn = adapter::level_shutdown,
        client_active("ClientActive"): EdictFn = adapter::client_active,
        client_disconnect("ClientDisconnect"): EdictFn = adapter::client_disconnect,
        client_put_in_server("ClientPutInServer"): ClientPutInServerFn = adapter::client_put_in_server,
        set_command_client("SetCommandClient"): SetCommandClientFn = adapter::set_command_client,
        client_settings_changed("ClientSettingsChanged"): EdictFn = adapter::client_settings_changed,
        client_connect("ClientConnect"): ClientConnectFn = adapter::client_connect,
        client_command("ClientCommand"): ClientCommandFn = adapter::client_command,
        network_id_validated("NetworkIDValidated"): NetworkIdValidatedFn = adapter::network_id_validated,
    }
}

callback_shape! {
    /// `ISERVERPLUGINCALLBACKS002`, adds cvar query replies.
    CallbacksV2 = ShapeKind::V2, "ISERVERPLUGINCALLBACKS002" {
        load("Load"): LoadFn = adapter::load,
        unload("Unload"): VoidFn = adapter::unload,
        pause("Pause"): VoidFn = adapter::pause,
        un_pause("UnPause"): VoidFn = adapter::un_pause,
        get_plugin_description("GetPluginDescription"): DescriptionFn = adapter::get_plugin_description,
        level_init("LevelInit"): LevelInitFn = adapter::level_init,
        server_activate("ServerActivate"): ServerActivateFn = adapter::server_activate,
        game_frame("GameFrame"): GameFrameFn = adapter::game_frame,
        level_shutdown("LevelShutdown"): VoidFn = adapter::level_shutdown,
        client_active("ClientActive"): EdictFn = adapter::client_active,
        client_disconnect("ClientDisconnect"): EdictFn = adapter::client_disconnect,
        client_put_in_server("ClientPutInServer"): ClientPutInServerFn = adapter::client_put_in_server,
        set_command_client("SetCommandClient"): SetCommandClientFn = adapter::set_command_client,
        client_settings_changed("ClientSettingsChanged"): EdictFn = adapter::client_settings_changed,
        client_connect("ClientConnect"): ClientConnectFn = adapter::client_connect,
        client_command("ClientCommand"): ClientCommandFn = adapter::client_command,
        network_id_validated("NetworkIDValidated"): NetworkIdValidatedFn = adapter::network_id_validated,
        on_query_cvar_value_finished("OnQueryCvarValueFinished"): QueryCvarValueFinishedFn = adapter::on_query_cvar_value_finished,
    }
}

callback_shape! {
    /// `ISERVERPLUGINCALLBACKS003`, adds edict allocation notices.
    CallbacksV3 = ShapeKind::V3, "ISERVERPLUGINCALLBACKS003" {
        load("Load"): LoadFn = adapter::load,
        unload("Unload"): VoidFn = adapter::unload,
        pause("Pause"): VoidFn = adapter::pause,
        un_pause("UnPause"): VoidFn = adapter::un_pause,
        get_plugin_description("GetPluginDescription"): DescriptionFn = adapter::get_plugin_description,
        level_init("LevelInit"): LevelInitFn = adapter::level_init,
        server_activate("ServerActivate"): ServerActivateFn = adapter::server_activate,
        game_frame("GameFrame"): GameFrameFn = adapter::game_frame,
        level_shutdown("LevelShutdown"): VoidFn = adapter::level_shutdown,
        client_active("ClientActive"): EdictFn = adapter::client_active,
        client_disconnect("ClientDisconnect"): EdictFn = adapter::client_disconnect,
        client_put_in_server("ClientPutInServer"): ClientPutInServerFn = adapter::client_put_in_server,
        set_command_client("SetCommandClient"): SetCommandClientFn = adapter::set_command_client,
        client_settings_changed("ClientSettingsChanged"): EdictFn = adapter::client_settings_changed,
        client_connect("ClientConnect"): ClientConnectFn = adapter::client_connect,
        client_command("ClientCommand"): ClientCommandFn = adapter::client_command,
        network_id_validated("NetworkIDValidated"): NetworkIdValidatedFn = adapter::network_id_validated,
        on_query_cvar_value_finished("OnQueryCvarValueFinished"): QueryCvarValueFinishedFn = adapter::on_query_cvar_value_finished,
        on_edict_allocated("OnEdictAllocated"): EdictFn = adapter::on_edict_allocated,
        on_edict_freed("OnEdictFreed"): EdictFreedFn = adapter::on_edict_freed,
    }
}

callback_shape! {
    /// Portal 2's `ISERVERPLUGINCALLBACKS003`: same version string as
    /// [`CallbacksV3`], with `ClientFullyConnect` right after `ClientActive`.
    CallbacksPortal2 = ShapeKind::Portal2, "ISERVERPLUGINCALLBACKS003" {
        load("Load"): LoadFn = adapter::load,
        unload("Unload"): VoidFn = adapter::unload,
        pause("Pause"): VoidFn = adapter::pause,
        un_pause("UnPause"): VoidFn = adapter::un_pause,
        get_plugin_description("GetPluginDescription"): DescriptionFn = adapter::get_plugin_description,
        level_init("LevelInit"): LevelInitFn = adapter::level_init,
        server_activate("ServerActivate"): ServerActivateFn = adapter::server_activate,
        game_frame("GameFrame"): GameFrameFn = adapter::game_frame,
        level_shutdown("LevelShutdown"): VoidFn = adapter::level_shutdown,
        client_active("ClientActive"): EdictFn = adapter::client_active,
        client_fully_connect("ClientFullyConnect"): EdictFn = adapter::client_fully_connect,
        client_disconnect("ClientDisconnect"): EdictFn = adapter::client_disconnect,
        client_put_in_server("ClientPutInServer"): ClientPutInServerFn = adapter::client_put_in_server,
        set_command_client("SetCommandClient"): SetCommandClientFn = adapter::set_command_client,
        client_settings_changed("ClientSettingsChanged"): EdictFn = adapter::client_settings_changed,
        client_connect("ClientConnect"): ClientConnectFn = adapter::client_connect,
        client_command("ClientCommand"): ClientCommandFn = adapter::client_command,
        network_id_validated("NetworkIDValidated"): NetworkIdValidatedFn = adapter::network_id_validated,
        on_query_cvar_value_finished("OnQueryCvarValueFinished"): QueryCvarValueFinishedFn = adapter::on_query_cvar_value_finished,
        on_edict_allocated("OnEdictAllocated"): EdictFn = adapter::on_edict_allocated,
        on_edict_freed("OnEdictFreed"): EdictFreedFn = adapter::on_edict_freed,
    }
}

static CALLBACKS_V1: CallbacksV1 = CallbacksV1::TABLE;
static CALLBACKS_V2: CallbacksV2 = CallbacksV2::TABLE;
static CALLBACKS_V3: CallbacksV3 = CallbacksV3::TABLE;
static CALLBACKS_PORTAL2: CallbacksPortal2 = CallbacksPortal2::TABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    V1,
    V2,
    V3,
    Portal2,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [Self::V1, Self::V2, Self::V3, Self::Portal2];

    pub fn version(self) -> &'static str {
        match self {
            Self::V1 => CallbacksV1::VERSION,
            Self::V2 => CallbacksV2::VERSION,
            Self::V3 => CallbacksV3::VERSION,
            Self::Portal2 => CallbacksPortal2::VERSION,
        }
    }

    /// The host this shape is specific to, if any.
    pub fn host(self) -> Option<HostFlavor> {
        match self {
            Self::Portal2 => Some(HostFlavor::Portal2),
            _ => None,
        }
    }

    pub fn methods(self) -> &'static [&'static str] {
        match self {
            Self::V1 => CallbacksV1::METHODS,
            Self::V2 => CallbacksV2::METHODS,
            Self::V3 => CallbacksV3::METHODS,
            Self::Portal2 => CallbacksPortal2::METHODS,
        }
    }

    pub(crate) fn vtable(self) -> *const c_void {
        match self {
            Self::V1 => (&CALLBACKS_V1 as *const CallbacksV1).cast(),
            Self::V2 => (&CALLBACKS_V2 as *const CallbacksV2).cast(),
            Self::V3 => (&CALLBACKS_V3 as *const CallbacksV3).cast(),
            Self::Portal2 => (&CALLBACKS_PORTAL2 as *const CallbacksPortal2).cast(),
        }
    }
}
