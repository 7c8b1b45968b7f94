/*
 *  script/value.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Host values going into Lua, callback results coming back out
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

use std::ffi::{CStr, c_void};

use mlua::{LightUserData, Lua, Value};

use crate::abi::ffi::PluginResult;
use crate::engine::PluginLog;

/// An argument passed from the engine to a script function.
///
/// Nothing is copied except C strings, which become Lua byte strings.
/// Handles are addresses only; scripts can compare and pass them on but
/// never look inside.
#[derive(Debug, Clone, Copy)]
pub enum HostValue<'a> {
    Int(i64),
    Bool(bool),
    Text(Option<&'a CStr>),
    Handle(*const c_void),
}

impl HostValue<'_> {
    pub fn handle<T>(pointer: *const T) -> Self {
        Self::Handle(pointer.cast())
    }

    pub fn to_lua(self, lua: &Lua) -> mlua::Result<Value> {
        Ok(match self {
            Self::Int(value) => Value::Integer(value),
            Self::Bool(value) => Value::Boolean(value),
            Self::Text(None) => Value::Nil,
            Self::Text(Some(text)) => Value::String(lua.create_string(text.to_bytes())?),
            Self::Handle(pointer) if pointer.is_null() => Value::Nil,
            Self::Handle(pointer) => Value::LightUserData(LightUserData(pointer.cast_mut())),
        })
    }
}

/// The name Lua's own `type()` gives the value. mlua tells integers apart
/// from floats; Lua calls both "number".
pub fn lua_type_name(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "number",
        other => other.type_name(),
    }
}

/// Short rendering of a Lua value for diagnostics.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s.to_string_lossy()),
        other => lua_type_name(other).to_owned(),
    }
}

/// Interpret a script's answer to a `PluginResult` callback.
///
/// `nil` is `Continue`. Anything that isn't one of the three codes is
/// reported and treated as `Continue`.
pub fn plugin_result(callback: &str, value: &Value, log: &PluginLog) -> PluginResult {
    let code = match value {
        Value::Nil => return PluginResult::Continue,
        Value::Integer(code) => Some(*code),
        Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    };
    match code.and_then(PluginResult::from_code) {
        Some(result) => result,
        None => {
            log.warn(&format!(
                "Invalid result value {} returned from {}.",
                describe(value),
                callback
            ));
            PluginResult::Continue
        }
    }
}
