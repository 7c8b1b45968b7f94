/*
 *  abi/adapter.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Vtable slot functions forwarding engine calls to the shared plugin
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

use std::any::Any;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use log::error;

use super::ffi::{Command, CreateInterfaceFn, Edict, PluginResult, virtual_fn};
use super::shapes::{CallbackTable, ShapeKind};
use crate::plugin::Plugin;

/// The object handed to the engine.
///
/// Laid out like a C++ object with virtual functions: the vtable pointer
/// comes first. The engine only ever reads that pointer and calls through
/// it with `this` pointing back here.
#[repr(C)]
pub struct Facade {
    vtable: *const c_void,
    plugin: &'static Plugin,
    shape: ShapeKind,
}

// SAFETY: fields are never mutated after construction. The vtable is an
// immutable static and the plugin is Sync.
unsafe impl Send for Facade {}
unsafe impl Sync for Facade {}

impl Facade {
    pub fn new(shape: ShapeKind, plugin: &'static Plugin) -> Self {
        Self {
            vtable: shape.vtable(),
            plugin,
            shape,
        }
    }

    pub fn shape(&self) -> ShapeKind {
        self.shape
    }

    pub fn plugin(&self) -> &'static Plugin {
        self.plugin
    }

    /// The `this` pointer the engine passes back into every slot.
    pub fn as_this(&self) -> *mut Facade {
        self as *const Self as *mut Self
    }

    /// The typed vtable, if this facade exposes shape `V`.
    pub fn callbacks<V: CallbackTable>(&self) -> Option<&'static V> {
        // SAFETY: the vtable of a facade of shape V::SHAPE is a static V.
        (self.shape == V::SHAPE).then(|| unsafe { &*self.vtable.cast::<V>() })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown error"
    }
}

/// Runs `body` against the plugin behind `this`, returning `default` for a
/// null `this` or a panic. Nested calls from the engine are forwarded too.
macro_rules! forward {
    ($this:expr, $name:literal, $default:expr, |$plugin:ident| $body:expr) => {{
        let this: *mut Facade = $this;
        match panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: the engine passes back the pointer CreateInterface returned.
            match unsafe { this.as_ref() } {
                Some(facade) => {
                    let $plugin = facade.plugin;
                    $body
                }
                None => $default,
            }
        })) {
            Ok(value) => value,
            Err(payload) => {
                error!("Caught panic in {}: {}", $name, panic_message(&*payload));
                $default
            }
        }
    }};
}

/// Borrow a C string argument; null stays `None`.
unsafe fn text<'a>(value: *const c_char) -> Option<&'a CStr> {
    // SAFETY: the engine passes NUL terminated strings valid for the call.
    (!value.is_null()).then(|| unsafe { CStr::from_ptr(value) })
}

virtual_fn! {
    pub(crate) fn load(
        this: *mut Facade,
        interface_factory: Option<CreateInterfaceFn>,
        game_server_factory: Option<CreateInterfaceFn>,
    ) -> bool {
        forward!(this, "Load", false, |plugin| plugin.load(interface_factory, game_server_factory))
    }
}

virtual_fn! {
    pub(crate) fn unload(this: *mut Facade) {
        forward!(this, "Unload", (), |plugin| plugin.unload())
    }
}

virtual_fn! {
    pub(crate) fn pause(this: *mut Facade) {
        forward!(this, "Pause", (), |plugin| plugin.pause())
    }
}

virtual_fn! {
    pub(crate) fn un_pause(this: *mut Facade) {
        forward!(this, "UnPause", (), |plugin| plugin.un_pause())
    }
}

virtual_fn! {
    pub(crate) fn get_plugin_description(this: *mut Facade) -> *const c_char {
        // The plugin keeps the text alive until the description changes.
        forward!(this, "GetPluginDescription", c"".as_ptr(), |plugin| plugin.get_plugin_description().as_ptr())
    }
}

virtual_fn! {
    pub(crate) fn level_init(this: *mut Facade, map_name: *const c_char) {
        forward!(this, "LevelInit", (), |plugin| plugin.level_init(unsafe { text(map_name) }))
    }
}

virtual_fn! {
    pub(crate) fn server_activate(this: *mut Facade, edict_list: *mut Edict, edict_count: c_int, client_max: c_int) {
        forward!(this, "ServerActivate", (), |plugin| plugin.server_activate(edict_list, edict_count, client_max))
    }
}

virtual_fn! {
    pub(crate) fn game_frame(this: *mut Facade, simulating: bool) {
        forward!(this, "GameFrame", (), |plugin| plugin.game_frame(simulating))
    }
}

virtual_fn! {
    pub(crate) fn level_shutdown(this: *mut Facade) {
        forward!(this, "LevelShutdown", (), |plugin| plugin.level_shutdown())
    }
}

virtual_fn! {
    pub(crate) fn client_active(this: *mut Facade, entity: *mut Edict) {
        forward!(this, "ClientActive", (), |plugin| plugin.client_active(entity))
    }
}

virtual_fn! {
    pub(crate) fn client_fully_connect(this: *mut Facade, entity: *mut Edict) {
        forward!(this, "ClientFullyConnect", (), |plugin| plugin.client_fully_connect(entity))
    }
}

virtual_fn! {
    pub(crate) fn client_disconnect(this: *mut Facade, entity: *mut Edict) {
        forward!(this, "ClientDisconnect", (), |plugin| plugin.client_disconnect(entity))
    }
}

virtual_fn! {
    pub(crate) fn client_put_in_server(this: *mut Facade, entity: *mut Edict, player_name: *const c_char) {
        forward!(this, "ClientPutInServer", (), |plugin| {
            plugin.client_put_in_server(entity, unsafe { text(player_name) })
        })
    }
}

virtual_fn! {
    pub(crate) fn set_command_client(this: *mut Facade, index: c_int) {
        forward!(this, "SetCommandClient", (), |plugin| plugin.set_command_client(index))
    }
}

virtual_fn! {
    pub(crate) fn client_settings_changed(this: *mut Facade, entity: *mut Edict) {
        forward!(this, "ClientSettingsChanged", (), |plugin| plugin.client_settings_changed(entity))
    }
}

virtual_fn! {
    pub(crate) fn client_connect(
        this: *mut Facade,
        allow_connect: *mut bool,
        entity: *mut Edict,
        name: *const c_char,
        address: *const c_char,
        reject: *mut c_char,
        max_reject_length: c_int,
    ) -> PluginResult {
        forward!(this, "ClientConnect", PluginResult::Continue, |plugin| {
            let mut ignored = true;
            // SAFETY: a non-null out-pointer is valid for the call.
            let allow = match unsafe { allow_connect.as_mut() } {
                Some(allow) => allow,
                None => &mut ignored,
            };
            let reject: &mut [u8] = if reject.is_null() || max_reject_length <= 0 {
                &mut []
            } else {
                // SAFETY: the engine hands us a buffer of max_reject_length bytes.
                unsafe { std::slice::from_raw_parts_mut(reject.cast::<u8>(), max_reject_length as usize) }
            };
            plugin.client_connect(allow, entity, unsafe { text(name) }, unsafe { text(address) }, reject)
        })
    }
}

virtual_fn! {
    pub(crate) fn client_command(this: *mut Facade, entity: *mut Edict, args: *const Command) -> PluginResult {
        forward!(this, "ClientCommand", PluginResult::Continue, |plugin| plugin.client_command(entity, args))
    }
}

virtual_fn! {
    pub(crate) fn network_id_validated(this: *mut Facade, user_name: *const c_char, network_id: *const c_char) -> PluginResult {
        forward!(this, "NetworkIDValidated", PluginResult::Continue, |plugin| {
            plugin.network_id_validated(unsafe { text(user_name) }, unsafe { text(network_id) })
        })
    }
}

virtual_fn! {
    pub(crate) fn on_query_cvar_value_finished(
        this: *mut Facade,
        cookie: c_int,
        player: *mut Edict,
        status: c_int,
        cvar_name: *const c_char,
        cvar_value: *const c_char,
    ) {
        forward!(this, "OnQueryCvarValueFinished", (), |plugin| {
            plugin.on_query_cvar_value_finished(cookie, player, status, unsafe { text(cvar_name) }, unsafe { text(cvar_value) })
        })
    }
}

virtual_fn! {
    pub(crate) fn on_edict_allocated(this: *mut Facade, entity: *mut Edict) {
        forward!(this, "OnEdictAllocated", (), |plugin| plugin.on_edict_allocated(entity))
    }
}

virtual_fn! {
    pub(crate) fn on_edict_freed(this: *mut Facade, entity: *const Edict) {
        forward!(this, "OnEdictFreed", (), |plugin| plugin.on_edict_freed(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::shapes::{CallbacksV1, CallbacksV2, CallbacksV3};
    use crate::engine::MemorySink;

    fn leaked_plugin() -> &'static Plugin {
        Box::leak(Box::new(Plugin::new(None, MemorySink::new())))
    }

    #[test]
    fn test_null_this_returns_defaults() {
        let this = std::ptr::null_mut();
        unsafe {
            assert!(!load(this, None, None));
            assert_eq!(CStr::from_ptr(get_plugin_description(this)), c"");
            let mut allow = true;
            let result = client_connect(this, &mut allow, std::ptr::null_mut(), c"p".as_ptr(), c"a".as_ptr(), std::ptr::null_mut(), 0);
            assert_eq!(result, PluginResult::Continue);
            assert!(allow);
            unload(this);
        }
    }

    #[test]
    fn test_callbacks_only_for_matching_shape() {
        let facade = Facade::new(ShapeKind::V2, leaked_plugin());
        assert!(facade.callbacks::<CallbacksV2>().is_some());
        assert!(facade.callbacks::<CallbacksV1>().is_none());
        assert!(facade.callbacks::<CallbacksV3>().is_none());
    }

    #[test]
    fn test_vtable_pointer_is_first() {
        let facade = Facade::new(ShapeKind::V1, leaked_plugin());
        let first = unsafe { *(facade.as_this() as *const *const c_void) };
        assert_eq!(first, ShapeKind::V1.vtable());
    }

    #[test]
    fn test_unloaded_plugin_answers_with_defaults() {
        let facade = Facade::new(ShapeKind::V3, leaked_plugin());
        let this = facade.as_this();
        unsafe {
            assert_eq!(network_id_validated(this, c"Player".as_ptr(), c"STEAM_0:1:1".as_ptr()), PluginResult::Continue);
            game_frame(this, true);
            on_edict_freed(this, std::ptr::null());
        }
    }
}
