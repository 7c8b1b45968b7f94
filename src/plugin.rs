/*
 *  plugin.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  The one plugin object behind every exposed interface revision
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

use std::ffi::{CStr, CString, c_int, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use mlua::Value;

use crate::abi::ffi::{Command, CreateInterfaceFn, Edict, PluginResult};
use crate::engine::{LogSink, PluginLog};
use crate::error::BridgeError;
use crate::identity::PluginIdentity;
use crate::script::value::plugin_result;
use crate::script::{CallResults, HostValue, ScriptEnvironment};

/// Implements every callback of every interface revision by forwarding to
/// the plugin's Lua module.
///
/// Until `Load` succeeds, and after `Unload`, there is no Lua state and
/// every callback returns its default without doing anything.
///
/// The engine may call back in while a script callback is still running,
/// for example firing `OnEdictAllocated` for an entity spawned from
/// `GameFrame`. No lock is held while Lua runs, so nested calls reach the
/// script like any other.
pub struct Plugin {
    identity: Option<PluginIdentity>,
    log: PluginLog,
    description: Mutex<Arc<CStr>>,
    environment: Mutex<Option<Arc<ScriptEnvironment>>>,
}

impl Plugin {
    pub fn new(identity: Option<PluginIdentity>, sink: Arc<dyn LogSink>) -> Self {
        let name = identity.as_ref().map(PluginIdentity::name).unwrap_or_default();
        Self {
            log: PluginLog::new(name, sink),
            description: Mutex::new(Arc::from(CString::new(name).unwrap_or_default())),
            identity,
            environment: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> Option<&PluginIdentity> {
        self.identity.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot().is_some()
    }

    pub fn environment(&self) -> Option<Arc<ScriptEnvironment>> {
        self.slot().clone()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<ScriptEnvironment>>> {
        self.environment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load(&self, interface_factory: Option<CreateInterfaceFn>, game_server_factory: Option<CreateInterfaceFn>) -> bool {
        if self.is_loaded() {
            warn!("Load called on a loaded plugin, unloading first");
            self.unload();
        }

        let args = [factory(interface_factory), factory(game_server_factory)];
        match self.start(&args) {
            Ok(environment) => {
                info!("plugin loaded from {}", environment.entry_point().display());
                let previous = self.slot().replace(Arc::new(environment));
                // a nested Load got there first
                if let Some(previous) = previous {
                    self.shut_down(previous);
                }
                true
            }
            Err(e) => {
                if !e.reported() {
                    self.log.warn(&e.to_string());
                }
                false
            }
        }
    }

    fn start(&self, load_args: &[HostValue]) -> Result<ScriptEnvironment, BridgeError> {
        let identity = self.identity.as_ref().ok_or(BridgeError::NoIdentity)?;
        let entry_point = identity.resolve_entry_point()?;
        ScriptEnvironment::load(identity, &entry_point, &self.log, load_args)
    }

    pub fn unload(&self) {
        let environment = self.slot().take();
        if let Some(environment) = environment {
            self.shut_down(environment);
            info!("plugin unloaded");
        }
    }

    /// Run the script's `Unload` and close its state. A callback still
    /// running on the state keeps it open; the state closes when the last
    /// of them returns.
    fn shut_down(&self, environment: Arc<ScriptEnvironment>) {
        let _ = environment.call("Unload", &[], 0);
        match Arc::try_unwrap(environment) {
            Ok(environment) => environment.close(),
            Err(_) => debug!("unloaded from inside a callback, closing the state when it returns"),
        }
    }

    pub fn pause(&self) {
        self.notify("Pause", &[]);
    }

    pub fn un_pause(&self) {
        self.notify("UnPause", &[]);
    }

    /// The script's description if it offers a usable one, otherwise the
    /// last known description (initially the plugin name).
    ///
    /// The cache keeps the returned text alive until the description next
    /// changes, which is what the engine expects of the pointer it gets.
    pub fn get_plugin_description(&self) -> Arc<CStr> {
        if let Some(results) = self.call("GetPluginDescription", &[], 1) {
            if let Some(Value::String(text)) = results.values().first() {
                let bytes = text.as_bytes();
                if !bytes.is_empty() {
                    if let Ok(description) = CString::new(bytes.to_vec()) {
                        *self.cached_description() = Arc::from(description);
                    }
                }
            }
        }
        self.cached_description().clone()
    }

    fn cached_description(&self) -> MutexGuard<'_, Arc<CStr>> {
        self.description.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn level_init(&self, map_name: Option<&CStr>) {
        self.notify("LevelInit", &[HostValue::Text(map_name)]);
    }

    pub fn server_activate(&self, edict_list: *mut Edict, edict_count: c_int, client_max: c_int) {
        self.notify(
            "ServerActivate",
            &[
                HostValue::handle(edict_list),
                HostValue::Int(edict_count.into()),
                HostValue::Int(client_max.into()),
            ],
        );
    }

    pub fn game_frame(&self, simulating: bool) {
        self.notify("GameFrame", &[HostValue::Bool(simulating)]);
    }

    pub fn level_shutdown(&self) {
        self.notify("LevelShutdown", &[]);
    }

    pub fn client_active(&self, entity: *mut Edict) {
        self.notify("ClientActive", &[HostValue::handle(entity)]);
    }

    pub fn client_fully_connect(&self, entity: *mut Edict) {
        self.notify("ClientFullyConnect", &[HostValue::handle(entity)]);
    }

    pub fn client_disconnect(&self, entity: *mut Edict) {
        self.notify("ClientDisconnect", &[HostValue::handle(entity)]);
    }

    pub fn client_put_in_server(&self, entity: *mut Edict, player_name: Option<&CStr>) {
        self.notify("ClientPutInServer", &[HostValue::handle(entity), HostValue::Text(player_name)]);
    }

    pub fn set_command_client(&self, index: c_int) {
        self.notify("SetCommandClient", &[HostValue::Int(index.into())]);
    }

    pub fn client_settings_changed(&self, entity: *mut Edict) {
        self.notify("ClientSettingsChanged", &[HostValue::handle(entity)]);
    }

    /// `ClientConnect(self, entity, name, address, allow, max_reject_length)`
    /// may return `result, allow, reject_reason`.
    pub fn client_connect(
        &self,
        allow_connect: &mut bool,
        entity: *mut Edict,
        name: Option<&CStr>,
        address: Option<&CStr>,
        reject: &mut [u8],
    ) -> PluginResult {
        let args = [
            HostValue::handle(entity),
            HostValue::Text(name),
            HostValue::Text(address),
            HostValue::Bool(*allow_connect),
            HostValue::Int(reject.len() as i64),
        ];
        let Some(results) = self.call("ClientConnect", &args, 3) else {
            return PluginResult::Continue;
        };

        let mut values = results.into_values().into_iter();
        let result = values
            .next()
            .map_or(PluginResult::Continue, |v| plugin_result("ClientConnect", &v, &self.log));
        if let Some(Value::Boolean(allow)) = values.next() {
            *allow_connect = allow;
        }
        if let Some(Value::String(reason)) = values.next() {
            write_c_string(reject, &reason.as_bytes());
        }
        result
    }

    pub fn client_command(&self, entity: *mut Edict, args: *const Command) -> PluginResult {
        self.ask("ClientCommand", &[HostValue::handle(entity), HostValue::handle(args)])
    }

    pub fn network_id_validated(&self, user_name: Option<&CStr>, network_id: Option<&CStr>) -> PluginResult {
        self.ask("NetworkIDValidated", &[HostValue::Text(user_name), HostValue::Text(network_id)])
    }

    pub fn on_query_cvar_value_finished(
        &self,
        cookie: c_int,
        player: *mut Edict,
        status: c_int,
        cvar_name: Option<&CStr>,
        cvar_value: Option<&CStr>,
    ) {
        self.notify(
            "OnQueryCvarValueFinished",
            &[
                HostValue::Int(cookie.into()),
                HostValue::handle(player),
                HostValue::Int(status.into()),
                HostValue::Text(cvar_name),
                HostValue::Text(cvar_value),
            ],
        );
    }

    pub fn on_edict_allocated(&self, entity: *mut Edict) {
        self.notify("OnEdictAllocated", &[HostValue::handle(entity)]);
    }

    pub fn on_edict_freed(&self, entity: *const Edict) {
        self.notify("OnEdictFreed", &[HostValue::handle(entity)]);
    }

    fn call(&self, name: &str, args: &[HostValue], wanted: usize) -> Option<CallResults> {
        // clone out of the slot so nothing stays locked while Lua runs
        let environment = self.slot().clone()?;
        environment.call(name, args, wanted)
    }

    fn notify(&self, name: &str, args: &[HostValue]) {
        let _ = self.call(name, args, 0);
    }

    fn ask(&self, name: &str, args: &[HostValue]) -> PluginResult {
        match self.call(name, args, 1) {
            Some(results) => results
                .values()
                .first()
                .map_or(PluginResult::Continue, |v| plugin_result(name, v, &self.log)),
            None => PluginResult::Continue,
        }
    }
}

fn factory(function: Option<CreateInterfaceFn>) -> HostValue<'static> {
    HostValue::Handle(function.map_or(ptr::null(), |f| f as *const c_void))
}

/// Copy `text` into a C buffer, truncating so the NUL always fits.
fn write_c_string(buffer: &mut [u8], text: &[u8]) {
    let Some(room) = buffer.len().checked_sub(1) else {
        return;
    };
    let len = text.len().min(room);
    buffer[..len].copy_from_slice(&text[..len]);
    buffer[len] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemorySink;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        plugin: Plugin,
        sink: Arc<MemorySink>,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("demo.lua"), script).unwrap();
        let identity = PluginIdentity::from_module_path(&dir.path().join("demo.so"));
        let sink = MemorySink::new();
        let plugin = Plugin::new(identity, sink.clone());
        Fixture { _dir: dir, plugin, sink }
    }

    fn loaded(script: &str) -> Fixture {
        let f = fixture(script);
        assert!(f.plugin.load(None, None), "load failed: {:?}", f.sink.warnings());
        f
    }

    #[test]
    fn test_without_identity_load_fails_with_warning() {
        let sink = MemorySink::new();
        let plugin = Plugin::new(None, sink.clone());
        assert!(!plugin.load(None, None));
        assert_eq!(sink.warnings().len(), 1);
        assert_eq!(&*plugin.get_plugin_description(), c"");
    }

    #[test]
    fn test_missing_entry_point_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let plugin = Plugin::new(PluginIdentity::from_module_path(&dir.path().join("ghost.so")), sink.clone());
        assert!(!plugin.load(None, None));
        let warnings = sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("[ghost] Lua entry point not found."));
    }

    #[test]
    fn test_calls_before_load_are_noops() {
        let f = fixture("error('never run')");
        assert_eq!(f.plugin.network_id_validated(Some(c"a"), Some(c"b")), PluginResult::Continue);
        f.plugin.game_frame(true);
        f.plugin.unload();
        assert_eq!(&*f.plugin.get_plugin_description(), c"demo");
        assert!(f.sink.lines().is_empty());
    }

    #[test]
    fn test_absent_callbacks_default_without_warnings() {
        let f = loaded("return {}");
        let mut allow = true;
        let mut reject = [0u8; 16];
        let result = f.plugin.client_connect(&mut allow, ptr::null_mut(), Some(c"p"), Some(c"1.2.3.4"), &mut reject);
        assert_eq!(result, PluginResult::Continue);
        assert!(allow);
        assert_eq!(reject, [0u8; 16]);
        assert_eq!(f.plugin.client_command(ptr::null_mut(), ptr::null()), PluginResult::Continue);
        f.plugin.level_init(Some(c"map"));
        f.plugin.on_edict_freed(ptr::null());
        assert!(f.sink.lines().is_empty());
    }

    #[test]
    fn test_error_in_callback_is_contained() {
        let f = loaded(
            r#"
            return { ClientCommand = function() error("bad command handler") end }
            "#,
        );
        assert_eq!(f.plugin.client_command(ptr::null_mut(), ptr::null()), PluginResult::Continue);
        let warnings = f.sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bad command handler"));
        assert!(warnings[0].contains("stack traceback:"));
        // still loaded and usable
        assert!(f.plugin.is_loaded());
    }

    #[test]
    fn test_result_values() {
        let f = loaded(
            r#"
            return {
                NetworkIDValidated = function(self, user, id)
                    if user == "stop" then return PluginResult.STOP end
                    if user == "bogus" then return 9 end
                    return PluginResult.OVERRIDE
                end,
            }
            "#,
        );
        assert_eq!(f.plugin.network_id_validated(Some(c"stop"), None), PluginResult::Stop);
        assert_eq!(f.plugin.network_id_validated(Some(c"x"), None), PluginResult::Override);
        assert_eq!(f.plugin.network_id_validated(Some(c"bogus"), None), PluginResult::Continue);
        assert_eq!(
            f.sink.warnings(),
            vec!["[demo] Invalid result value 9 returned from NetworkIDValidated.\n".to_string()]
        );
    }

    #[test]
    fn test_description_round_trip_and_cache() {
        let f = loaded(
            r#"
            local P = { text = "First" }
            function P:GetPluginDescription() return self.text end
            return P
            "#,
        );
        assert_eq!(&*f.plugin.get_plugin_description(), c"First");

        f.plugin.environment().unwrap().module().set("text", "").unwrap();
        assert_eq!(&*f.plugin.get_plugin_description(), c"First");

        f.plugin.environment().unwrap().module().set("text", "has\0nul").unwrap();
        assert_eq!(&*f.plugin.get_plugin_description(), c"First");

        f.plugin.environment().unwrap().module().set("text", "Second").unwrap();
        assert_eq!(&*f.plugin.get_plugin_description(), c"Second");

        f.plugin.unload();
        assert_eq!(&*f.plugin.get_plugin_description(), c"Second");
    }

    #[test]
    fn test_client_connect_out_parameters() {
        let f = loaded(
            r#"
            return {
                ClientConnect = function(self, entity, name, address, allow, max)
                    assert(allow == true and max == 8)
                    return PluginResult.STOP, false, "Server is full, try later"
                end,
            }
            "#,
        );
        let mut allow = true;
        let mut reject = [0xffu8; 8];
        let result = f.plugin.client_connect(&mut allow, ptr::null_mut(), Some(c"p"), Some(c"addr"), &mut reject);
        assert_eq!(result, PluginResult::Stop);
        assert!(!allow);
        assert_eq!(&reject, b"Server \0");
        assert!(f.sink.warnings().is_empty());
    }

    #[test]
    fn test_client_connect_with_zero_length_buffer() {
        let f = loaded(
            r#"
            return { ClientConnect = function() return 0, true, "ignored" end }
            "#,
        );
        let mut allow = false;
        let result = f.plugin.client_connect(&mut allow, ptr::null_mut(), None, None, &mut []);
        assert_eq!(result, PluginResult::Continue);
        assert!(allow);
    }

    #[test]
    fn test_unload_then_load_gives_fresh_state() {
        let f = loaded(
            r#"
            counter = (counter or 0) + 1
            return { GetPluginDescription = function() return "run " .. counter end }
            "#,
        );
        assert_eq!(&*f.plugin.get_plugin_description(), c"run 1");
        f.plugin.unload();
        assert!(f.plugin.load(None, None));
        assert_eq!(&*f.plugin.get_plugin_description(), c"run 1");
    }

    #[test]
    fn test_second_load_replaces_environment() {
        let f = loaded(
            r#"
            return { Unload = function() print("unloading") end }
            "#,
        );
        assert!(f.plugin.load(None, None));
        assert_eq!(f.sink.printed(), vec!["[demo] unloading\n".to_string()]);
        assert!(f.plugin.is_loaded());
    }

    #[test]
    fn test_teardown_happens_exactly_once() {
        let f = fixture(
            r#"
            print("booting")
            return { Load = function() return false end, Unload = function() print("never") end }
            "#,
        );
        let baseline = Arc::strong_count(&f.sink);
        assert!(!f.plugin.load(None, None));
        // the state captured the sink while alive; it has let go of it again
        assert_eq!(Arc::strong_count(&f.sink), baseline);
        assert!(!f.plugin.is_loaded());
        f.plugin.unload();
        f.plugin.unload();
        assert_eq!(f.sink.printed(), vec!["[demo] booting\n".to_string()]);
        assert_eq!(
            f.sink.warnings(),
            vec!["[demo] Load function returned false; plugin will not be loaded.\n".to_string()]
        );
    }

    #[test]
    fn test_unload_calls_script_and_releases_state() {
        let f = loaded(r#"return { Unload = function() print("bye") end }"#);
        let loaded_count = Arc::strong_count(&f.sink);
        f.plugin.unload();
        assert!(Arc::strong_count(&f.sink) < loaded_count);
        assert_eq!(f.sink.printed(), vec!["[demo] bye\n".to_string()]);
        f.plugin.unload();
        assert_eq!(f.sink.printed().len(), 1);
    }

    #[test]
    fn test_arguments_reach_the_script() {
        let f = loaded(
            r#"
            local P = {}
            function P:LevelInit(map) self.map = map end
            function P:ServerActivate(list, count, max) self.count, self.max = count, max end
            function P:SetCommandClient(index) self.index = index end
            function P:OnQueryCvarValueFinished(cookie, player, status, name, value)
                self.cvar = table.concat({ cookie, status, name, value }, ",")
            end
            return P
            "#,
        );
        f.plugin.level_init(Some(c"cp_badlands"));
        f.plugin.server_activate(ptr::null_mut(), 2048, 24);
        f.plugin.set_command_client(3);
        f.plugin.on_query_cvar_value_finished(7, ptr::null_mut(), 0, Some(c"sv_cheats"), Some(c"0"));

        let environment = f.plugin.environment().unwrap();
        let module = environment.module();
        assert_eq!(module.get::<String>("map").unwrap(), "cp_badlands");
        assert_eq!(module.get::<i64>("count").unwrap(), 2048);
        assert_eq!(module.get::<i64>("max").unwrap(), 24);
        assert_eq!(module.get::<i64>("index").unwrap(), 3);
        assert_eq!(module.get::<String>("cvar").unwrap(), "7,0,sv_cheats,0");
    }

    #[test]
    fn test_nested_callbacks_reach_the_script() {
        let f = loaded(
            r#"
            local P = { spawned = 0, frames = 0 }
            function P:GameFrame() self.frames = self.frames + 1; spawn() end
            function P:OnEdictAllocated() self.spawned = self.spawned + 1 end
            return P
            "#,
        );
        let plugin = Arc::new(f.plugin);
        let environment = plugin.environment().unwrap();
        let inner = Arc::downgrade(&plugin);
        let spawn = environment
            .lua()
            .create_function(move |_, ()| {
                if let Some(plugin) = inner.upgrade() {
                    plugin.on_edict_allocated(ptr::null_mut());
                }
                Ok(())
            })
            .unwrap();
        environment.lua().globals().set("spawn", spawn).unwrap();

        plugin.game_frame(true);
        plugin.game_frame(true);
        assert_eq!(environment.module().get::<i64>("frames").unwrap(), 2);
        assert_eq!(environment.module().get::<i64>("spawned").unwrap(), 2);
        assert!(f.sink.warnings().is_empty());
    }

    #[test]
    fn test_unload_from_inside_a_callback_closes_after_it_returns() {
        let f = loaded(
            r#"
            local P = {}
            function P:GameFrame() quit(); print("still running") end
            function P:Unload() print("unloading") end
            return P
            "#,
        );
        let plugin = Arc::new(f.plugin);
        let inner = Arc::downgrade(&plugin);
        let quit = plugin
            .environment()
            .unwrap()
            .lua()
            .create_function(move |_, ()| {
                if let Some(plugin) = inner.upgrade() {
                    plugin.unload();
                }
                Ok(())
            })
            .unwrap();
        plugin.environment().unwrap().lua().globals().set("quit", quit).unwrap();

        let loaded_count = Arc::strong_count(&f.sink);
        plugin.game_frame(true);
        assert!(!plugin.is_loaded());
        assert!(Arc::strong_count(&f.sink) < loaded_count);
        assert_eq!(
            f.sink.printed(),
            vec!["[demo] unloading\n".to_string(), "[demo] still running\n".to_string()]
        );
        plugin.game_frame(true);
        assert_eq!(f.sink.printed().len(), 2);
    }

    #[test]
    fn test_write_c_string_truncates() {
        let mut buffer = [1u8; 4];
        write_c_string(&mut buffer, b"abcdef");
        assert_eq!(&buffer, b"abc\0");
        let mut buffer = [1u8; 4];
        write_c_string(&mut buffer, b"ab");
        assert_eq!(&buffer, b"ab\0\x01");
        write_c_string(&mut [], b"ab");
    }
}
