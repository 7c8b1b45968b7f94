/*
 *  script/intrinsics.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Globals the bridge provides to every plugin state
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

use std::env::consts::DLL_EXTENSION;
use std::path::Path;

use mlua::{Function, Lua, MultiValue, Table, Value};

use crate::abi::ffi::PluginResult;
use crate::engine::PluginLog;

/// Replace `print` and `warn` with versions writing to the plugin's log,
/// and publish the `PluginResult` codes.
pub fn install(lua: &Lua, log: &PluginLog) -> mlua::Result<()> {
    let globals = lua.globals();

    let printer = log.clone();
    let print = lua.create_function(move |lua, args: MultiValue| {
        printer.print(&join(lua, args)?);
        Ok(())
    })?;
    globals.set("print", print)?;

    let warner = log.clone();
    let warn = lua.create_function(move |lua, args: MultiValue| {
        warner.warn(&join(lua, args)?);
        Ok(())
    })?;
    globals.set("warn", warn)?;

    let results = lua.create_table()?;
    for result in PluginResult::ALL {
        results.set(result.name(), result as i64)?;
    }
    globals.set("PluginResult", results)?;
    Ok(())
}

/// Make `require` look in the plugin's directory and nowhere else.
pub fn set_search_path(lua: &Lua, base_dir: &Path) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let base = base_dir.to_string_lossy();
    package.set("path", format!("{base}/?.lua;{base}/?/init.lua"))?;
    package.set("cpath", format!("{base}/?.{DLL_EXTENSION}"))?;
    Ok(())
}

/// The `arg` table a standalone interpreter would set up.
pub fn set_script_arg(lua: &Lua, script: &Path) -> mlua::Result<()> {
    let arg = lua.create_table()?;
    arg.raw_set(0, script.to_string_lossy().into_owned())?;
    lua.globals().set("arg", arg)
}

/// Stringify like the stock `print`: `tostring` on every argument, tabs
/// in between.
fn join(lua: &Lua, args: MultiValue) -> mlua::Result<String> {
    let tostring: Function = lua.globals().get("tostring")?;
    let mut line = String::new();
    for (index, value) in args.into_iter().enumerate() {
        if index > 0 {
            line.push('\t');
        }
        match tostring.call::<Value>(value)? {
            Value::String(text) => line.push_str(&text.to_string_lossy()),
            _ => return Err(mlua::Error::runtime("'tostring' must return a string")),
        }
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemorySink;
    use std::sync::Arc;

    fn state() -> (Lua, Arc<MemorySink>) {
        let lua = Lua::new();
        let sink = MemorySink::new();
        install(&lua, &PluginLog::new("demo", sink.clone())).unwrap();
        (lua, sink)
    }

    #[test]
    fn test_print_joins_with_tabs() {
        let (lua, sink) = state();
        lua.load(r#"print("a", 1, nil, true, 2.5)"#).exec().unwrap();
        assert_eq!(sink.printed(), vec!["[demo] a\t1\tnil\ttrue\t2.5\n".to_string()]);
    }

    #[test]
    fn test_print_uses_global_tostring() {
        let (lua, sink) = state();
        lua.load(
            r#"
            local t = setmetatable({}, { __tostring = function() return "thing" end })
            print(t)
            "#,
        )
        .exec()
        .unwrap();
        assert_eq!(sink.printed(), vec!["[demo] thing\n".to_string()]);
    }

    #[test]
    fn test_tostring_returning_non_string_is_an_error() {
        let (lua, sink) = state();
        let err = lua
            .load(
                r#"
                tostring = function() return 5 end
                print("x")
                "#,
            )
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("'tostring' must return a string"));
        assert!(sink.printed().is_empty());
    }

    #[test]
    fn test_warn_goes_to_warning_channel() {
        let (lua, sink) = state();
        lua.load(r#"warn("careful", "now")"#).exec().unwrap();
        assert_eq!(sink.warnings(), vec!["[demo] careful\tnow\n".to_string()]);
        assert!(sink.printed().is_empty());
    }

    #[test]
    fn test_plugin_result_codes() {
        let (lua, _sink) = state();
        let sum: i64 = lua
            .load("return PluginResult.CONTINUE * 100 + PluginResult.OVERRIDE * 10 + PluginResult.STOP")
            .eval()
            .unwrap();
        assert_eq!(sum, 12);
    }

    #[test]
    fn test_search_path_is_the_plugin_directory_only() {
        let lua = Lua::new();
        set_search_path(&lua, Path::new("/srv/addons")).unwrap();
        let (path, cpath): (String, String) = lua.load("return package.path, package.cpath").eval().unwrap();
        assert_eq!(path, "/srv/addons/?.lua;/srv/addons/?/init.lua");
        assert_eq!(cpath, format!("/srv/addons/?.{}", DLL_EXTENSION));
    }

    #[test]
    fn test_require_finds_sibling_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.lua"), "return { answer = 42 }").unwrap();
        let lua = Lua::new();
        set_search_path(&lua, dir.path()).unwrap();
        let answer: i64 = lua.load("return require('util').answer").eval().unwrap();
        assert_eq!(answer, 42);
    }

    #[test]
    fn test_script_arg_zero() {
        let lua = Lua::new();
        set_script_arg(&lua, Path::new("/srv/addons/hello.lua")).unwrap();
        let arg0: String = lua.load("return arg[0]").eval().unwrap();
        assert_eq!(arg0, "/srv/addons/hello.lua");
    }
}
