/*
 *  script/call.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Protected calls into plugin scripts
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

use log::trace;
use mlua::{Function, Lua, MultiValue, Table, Value};

use super::value::{HostValue, lua_type_name};
use crate::engine::PluginLog;

/// Message handler run by `xpcall` while the failing frame is still on the
/// stack, so the traceback points at the script and not at us.
const MESSAGE_HANDLER: &str = r#"
local tostring, traceback, type = tostring, debug.traceback, type
return function(message)
    if type(message) ~= "string" then
        message = tostring(message)
    end
    return traceback(message, 2)
end
"#;

/// Values a script call produced, padded with `nil` or cut to the number
/// the caller asked for.
#[derive(Debug)]
pub struct CallResults {
    values: Vec<Value>,
    returned: usize,
}

impl CallResults {
    fn collect(values: impl Iterator<Item = Value>, wanted: usize) -> Self {
        let mut values: Vec<Value> = values.collect();
        let returned = values.len();
        values.resize(wanted, Value::Nil);
        Self { values, returned }
    }

    /// What an absent function "returns".
    fn absent(wanted: usize) -> Self {
        Self {
            values: vec![Value::Nil; wanted],
            returned: 0,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// How many values the script actually returned.
    pub fn returned(&self) -> usize {
        self.returned
    }
}

/// Runs script functions under `xpcall`. Lua errors end up on the warning
/// sink with a traceback and never propagate to the engine.
pub struct CallProtocol {
    xpcall: Function,
    handler: Function,
    log: PluginLog,
}

impl CallProtocol {
    /// Capture `xpcall` and build the message handler. Must run before any
    /// script code so later changes to the globals can't affect us.
    pub fn install(lua: &Lua, log: PluginLog) -> mlua::Result<Self> {
        let xpcall: Function = lua.globals().get("xpcall")?;
        let handler: Function = lua.load(MESSAGE_HANDLER).set_name("=luaplug").eval()?;
        Ok(Self { xpcall, handler, log })
    }

    pub fn log(&self) -> &PluginLog {
        &self.log
    }

    /// Call `function(args...)`. `None` means the call failed and the
    /// failure has been reported.
    pub fn call(&self, function: &Function, args: impl IntoIterator<Item = Value>, wanted: usize) -> Option<CallResults> {
        let call_args: MultiValue = [Value::Function(function.clone()), Value::Function(self.handler.clone())]
            .into_iter()
            .chain(args)
            .collect();

        let mut returned = match self.xpcall.call::<MultiValue>(call_args) {
            Ok(returned) => returned.into_iter(),
            Err(e) => {
                self.log.warn(&e.to_string());
                return None;
            }
        };
        match returned.next() {
            Some(Value::Boolean(true)) => Some(CallResults::collect(returned, wanted)),
            _ => {
                let message: String = match returned.next() {
                    Some(Value::String(message)) => message.to_string_lossy().into(),
                    Some(other) => format!("(error object is a {} value)", lua_type_name(&other)),
                    None => "(no error message)".to_owned(),
                };
                self.log.warn(&message);
                None
            }
        }
    }

    /// Call `table:name(args...)`. A missing method is not an error: no
    /// call happens and `wanted` nils come back.
    pub fn call_method(
        &self,
        lua: &Lua,
        table: &Table,
        name: &str,
        args: &[HostValue],
        wanted: usize,
    ) -> Option<CallResults> {
        let function = match table.get::<Value>(name) {
            Ok(Value::Function(function)) => function,
            Ok(_) => {
                trace!("{} not implemented by script", name);
                return Some(CallResults::absent(wanted));
            }
            Err(e) => {
                self.log.warn(&format!("Could not look up {}: {}", name, e));
                return None;
            }
        };

        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(Value::Table(table.clone()));
        for arg in args {
            match arg.to_lua(lua) {
                Ok(value) => call_args.push(value),
                Err(e) => {
                    self.log.warn(&format!("Could not pass arguments to {}: {}", name, e));
                    return None;
                }
            }
        }
        self.call(&function, call_args, wanted)
    }
}
