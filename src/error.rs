/*
 *  error.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Errors raised while bringing up a plugin's script environment
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

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop `Load` from producing a live script environment.
///
/// The `Display` text is what the server operator sees in the console.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Could not determine where the plugin module lives; no Lua entry point can be loaded.")]
    NoIdentity,

    #[error(
        "Lua entry point not found. Neither \"{name}.lua\" nor \"{name}/init.lua\" were found inside \"{}\".",
        base_dir.display()
    )]
    EntryPointNotFound { name: String, base_dir: PathBuf },

    #[error("Could not create Lua state.")]
    StateCreation,

    #[error("Lua state setup failed: {0}")]
    Setup(#[from] mlua::Error),

    #[error("Lua entry point \"{}\" must return a table, got {type_name}.", path.display())]
    NotATable { path: PathBuf, type_name: &'static str },

    /// A Lua error already printed, with its traceback, by the call protocol.
    #[error("{callback} raised a Lua error")]
    Script { callback: String },

    #[error("Load function returned {value}; plugin will not be loaded.")]
    LoadRejected { value: String },
}

impl BridgeError {
    /// True when the diagnostic has already reached the warning sink.
    pub fn reported(&self) -> bool {
        matches!(self, Self::Script { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_message_names_both_candidates() {
        let err = BridgeError::EntryPointNotFound {
            name: "hello".into(),
            base_dir: PathBuf::from("/srv/addons"),
        };
        assert_eq!(
            err.to_string(),
            "Lua entry point not found. Neither \"hello.lua\" nor \"hello/init.lua\" were found inside \"/srv/addons\"."
        );
    }

    #[test]
    fn test_only_script_errors_are_prereported() {
        assert!(BridgeError::Script { callback: "Load".into() }.reported());
        assert!(!BridgeError::StateCreation.reported());
        assert!(!BridgeError::LoadRejected { value: "false".into() }.reported());
    }

    #[test]
    fn test_not_a_table_message() {
        let err = BridgeError::NotATable {
            path: PathBuf::from("/srv/addons/hello.lua"),
            type_name: "number",
        };
        assert_eq!(
            err.to_string(),
            "Lua entry point \"/srv/addons/hello.lua\" must return a table, got number."
        );
    }
}
