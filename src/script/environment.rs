/*
 *  script/environment.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Creation, configuration and teardown of a plugin's Lua state
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

use std::panic;
use std::path::{Path, PathBuf};

use log::debug;
use mlua::{Lua, LuaOptions, MultiValue, StdLib, Table, Value};

use super::call::{CallProtocol, CallResults};
use super::intrinsics;
use super::value::{HostValue, describe, lua_type_name};
use crate::engine::PluginLog;
use crate::error::BridgeError;
use crate::guard::ScopeGuard;
use crate::identity::PluginIdentity;

/// A configured Lua state and the protocol used to call into it.
pub struct ScriptState {
    // protocol holds references into lua and goes first
    protocol: CallProtocol,
    lua: Lua,
}

impl ScriptState {
    /// New state with every standard library, `print`/`warn` bound to
    /// `log` and `require` rooted at the plugin directory.
    pub fn create(identity: &PluginIdentity, log: &PluginLog) -> Result<Self, BridgeError> {
        // luaL_openlibs semantics: debug and C module loading included
        let lua = panic::catch_unwind(|| unsafe { Lua::unsafe_new_with(StdLib::ALL, LuaOptions::default()) })
            .map_err(|_| BridgeError::StateCreation)?;
        let lua = ScopeGuard::new(lua, close_lua);

        intrinsics::install(&lua, log)?;
        intrinsics::set_search_path(&lua, identity.base_dir())?;
        let protocol = CallProtocol::install(&lua, log.clone())?;

        Ok(Self {
            protocol,
            lua: ScopeGuard::defuse(lua),
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn log(&self) -> &PluginLog {
        self.protocol.log()
    }

    /// Run the entry script; it must evaluate to the plugin module table.
    pub fn run_entry_point(&self, path: &Path) -> Result<Table, BridgeError> {
        let script = || BridgeError::Script {
            callback: path.display().to_string(),
        };

        intrinsics::set_script_arg(&self.lua, path)?;
        let chunk = match self.lua.load(path).into_function() {
            Ok(chunk) => chunk,
            Err(e) => {
                self.log().warn(&e.to_string());
                return Err(script());
            }
        };
        let results = self.protocol.call(&chunk, MultiValue::new(), 1).ok_or_else(script)?;

        if results.returned() == 0 {
            return Err(BridgeError::NotATable {
                path: path.to_path_buf(),
                type_name: "no value",
            });
        }
        match results.into_values().into_iter().next() {
            Some(Value::Table(module)) => Ok(module),
            other => Err(BridgeError::NotATable {
                path: path.to_path_buf(),
                type_name: other.as_ref().map_or("nil", lua_type_name),
            }),
        }
    }

    pub fn call(&self, module: &Table, name: &str, args: &[HostValue], wanted: usize) -> Option<CallResults> {
        self.protocol.call_method(&self.lua, module, name, args, wanted)
    }

    /// Close the state. Every Rust value captured by the state is dropped
    /// before this returns.
    pub fn close(self) {
        let Self { protocol, lua } = self;
        drop(protocol);
        close_lua(lua);
    }
}

fn close_lua(lua: Lua) {
    debug!("closing Lua state ({} bytes in use)", lua.used_memory());
    drop(lua);
}

/// A running plugin script: its state plus the module table it returned.
pub struct ScriptEnvironment {
    module: Table,
    state: ScriptState,
    entry_point: PathBuf,
}

impl ScriptEnvironment {
    /// Create a state, run the entry script and call its `Load` method.
    ///
    /// The state is closed again on every failure path; on success it is
    /// owned by the returned environment.
    pub fn load(
        identity: &PluginIdentity,
        entry_point: &Path,
        log: &PluginLog,
        load_args: &[HostValue],
    ) -> Result<Self, BridgeError> {
        let state = ScopeGuard::new(ScriptState::create(identity, log)?, ScriptState::close);

        let module = state.run_entry_point(entry_point)?;
        let results = state
            .call(&module, "Load", load_args, 1)
            .ok_or_else(|| BridgeError::Script { callback: "Load".into() })?;
        // nothing returned counts as success, an explicit nil doesn't
        if results.returned() > 0 {
            if let Some(value @ (Value::Nil | Value::Boolean(false))) = results.values().first() {
                return Err(BridgeError::LoadRejected { value: describe(value) });
            }
        }

        Ok(Self {
            module,
            state: ScopeGuard::defuse(state),
            entry_point: entry_point.to_path_buf(),
        })
    }

    pub fn entry_point(&self) -> &Path {
        &self.entry_point
    }

    pub fn lua(&self) -> &Lua {
        self.state.lua()
    }

    pub fn module(&self) -> &Table {
        &self.module
    }

    /// Forward to `module:name(args...)`.
    pub fn call(&self, name: &str, args: &[HostValue], wanted: usize) -> Option<CallResults> {
        self.state.call(&self.module, name, args, wanted)
    }

    pub fn close(self) {
        let Self { module, state, .. } = self;
        drop(module);
        state.close();
    }
}
