/*
 *  identity.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Plugin name and script root, derived from the module's own path
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

use std::path::{Path, PathBuf};

use crate::error::BridgeError;
use crate::platform;

/// Where a plugin lives and what it is called.
///
/// A bridge copied to `addons/hello.so` is the plugin `hello`, and its Lua
/// code lives in `addons/`, either as `hello.lua` or `hello/init.lua`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    base_dir: PathBuf,
    name: String,
}

impl PluginIdentity {
    pub fn from_module_path(path: &Path) -> Option<Self> {
        let name = path.file_stem()?.to_string_lossy().into_owned();
        if name.is_empty() {
            return None;
        }
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Some(Self { base_dir, name })
    }

    /// Identity of the running bridge module.
    pub fn discover() -> Option<Self> {
        platform::module_path().and_then(|path| Self::from_module_path(&path))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// First existing of `<base>/<name>.lua` and `<base>/<name>/init.lua`.
    pub fn resolve_entry_point(&self) -> Result<PathBuf, BridgeError> {
        let single = self.base_dir.join(format!("{}.lua", self.name));
        if platform::file_exists(&single) {
            return Ok(single);
        }
        let package = self.base_dir.join(&self.name).join("init.lua");
        if platform::file_exists(&package) {
            return Ok(package);
        }
        Err(BridgeError::EntryPointNotFound {
            name: self.name.clone(),
            base_dir: self.base_dir.clone(),
        })
    }
}
