/*
 *  emulator/session.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  A scripted server session driven through the plugin's vtable
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

use std::ffi::{CStr, CString, c_int};
use std::ptr;

use log::{info, warn};

use super::config::{ClientConfig, SessionConfig};
use crate::abi::ffi::{Edict, PluginResult};
use crate::abi::shapes::{CallbacksPortal2, CallbacksV1, CallbacksV2, CallbacksV3, ShapeKind};
use crate::abi::Facade;

pub const DEFAULT_MAP: &str = "emulator";
pub const DEFAULT_MAX_CLIENTS: u32 = 32;
pub const DEFAULT_EDICT_COUNT: u32 = 2048;
pub const DEFAULT_FRAMES: u32 = 3;

/// Size of the reject reason buffer the engine hands to `ClientConnect`.
const REJECT_BUFFER: usize = 255;

/// `eQueryCvarValueStatus_ValueIntact`
const CVAR_VALUE_INTACT: c_int = 0;

/// Call a slot through whichever typed vtable the facade exposes.
///
/// `|table, this| body` runs with `table` bound to the matching vtable and
/// `this` to the facade pointer; shapes missing the slot yield `None`.
macro_rules! dispatch {
    ($facade:expr, all, |$table:ident, $this:ident| $body:expr) => {
        dispatch!($facade, [CallbacksV1, CallbacksV2, CallbacksV3, CallbacksPortal2], |$table, $this| $body)
    };
    ($facade:expr, [$($shape:ty),+], |$table:ident, $this:ident| $body:expr) => {{
        let facade: &Facade = $facade;
        let $this = facade.as_this();
        None$(.or_else(|| facade.callbacks::<$shape>().map(|$table| unsafe { $body })))+
    }};
}

/// A session with every default filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub map: String,
    pub max_clients: u32,
    pub edict_count: u32,
    pub frames: u32,
    pub pause_at_frame: Option<u32>,
    pub clients: Vec<ClientConfig>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            map: DEFAULT_MAP.into(),
            max_clients: DEFAULT_MAX_CLIENTS,
            edict_count: DEFAULT_EDICT_COUNT,
            frames: DEFAULT_FRAMES,
            pause_at_frame: None,
            clients: vec![ClientConfig {
                name: "Player".into(),
                address: None,
                network_id: None,
                commands: None,
                cvars: None,
            }],
        }
    }
}

impl Scenario {
    pub fn from_config(config: Option<&SessionConfig>) -> Self {
        let defaults = Self::default();
        let Some(config) = config else {
            return defaults;
        };
        Self {
            map: config.map.clone().unwrap_or(defaults.map),
            max_clients: config.max_clients.unwrap_or(defaults.max_clients),
            edict_count: config.edict_count.unwrap_or(defaults.edict_count),
            frames: config.frames.unwrap_or(defaults.frames),
            pause_at_frame: config.pause_at_frame,
            clients: config.clients.clone().unwrap_or(defaults.clients),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOutcome {
    pub client: String,
    pub result: PluginResult,
    pub allowed: bool,
    pub reject_reason: String,
}

/// What the plugin answered during a session.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub loaded: bool,
    pub description: String,
    pub connects: Vec<ConnectOutcome>,
    pub validations: Vec<PluginResult>,
    pub commands: Vec<PluginResult>,
    pub frames: u32,
}

/// Fake edict storage: distinct, stable, non-null addresses. Nothing ever
/// reads through them.
struct EdictPool {
    slots: Vec<u8>,
}

impl EdictPool {
    fn new(count: u32) -> Self {
        Self {
            slots: vec![0; count.max(1) as usize],
        }
    }

    fn get(&self, index: usize) -> *mut Edict {
        self.slots.as_ptr().wrapping_add(index).cast_mut().cast()
    }
}

fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

/// Drive `facade` through one load, level and unload.
pub fn run(facade: &Facade, scenario: &Scenario) -> SessionReport {
    let mut report = SessionReport::default();
    let edicts = EdictPool::new(scenario.edict_count);

    report.loaded = dispatch!(facade, all, |t, this| (t.load)(this, None, None)).unwrap_or(false);
    if !report.loaded {
        warn!("plugin refused to load; session aborted");
        return report;
    }

    report.description = dispatch!(facade, all, |t, this| (t.get_plugin_description)(this))
        .filter(|p| !p.is_null())
        .map(|p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!("loaded \"{}\" as {:?}", report.description, facade.shape());

    let map = c_string(&scenario.map);
    dispatch!(facade, all, |t, this| (t.level_init)(this, map.as_ptr()));
    dispatch!(facade, all, |t, this| (t.server_activate)(
        this,
        edicts.get(0),
        scenario.edict_count as c_int,
        scenario.max_clients as c_int
    ));

    // a level entity that comes and goes while the map runs
    let prop = edicts.get(scenario.max_clients as usize + 1);
    dispatch!(facade, [CallbacksV3, CallbacksPortal2], |t, this| (t.on_edict_allocated)(this, prop));

    let mut connected = Vec::new();
    for (slot, client) in scenario.clients.iter().enumerate() {
        // edict 0 is the world, players start at 1
        let entity = edicts.get(slot + 1);
        if connect(facade, entity, client, &mut report) {
            enter(facade, slot, entity, client, &mut report);
            connected.push(entity);
        }
    }

    for frame in 0..scenario.frames {
        if scenario.pause_at_frame == Some(frame) {
            info!("pausing at frame {}", frame);
            dispatch!(facade, all, |t, this| (t.pause)(this));
            dispatch!(facade, all, |t, this| (t.game_frame)(this, false));
            dispatch!(facade, all, |t, this| (t.un_pause)(this));
        }
        dispatch!(facade, all, |t, this| (t.game_frame)(this, true));
        report.frames += 1;
    }

    for entity in connected.into_iter().rev() {
        dispatch!(facade, all, |t, this| (t.client_disconnect)(this, entity));
    }
    dispatch!(facade, [CallbacksV3, CallbacksPortal2], |t, this| (t.on_edict_freed)(this, prop.cast_const()));
    dispatch!(facade, all, |t, this| (t.level_shutdown)(this));
    dispatch!(facade, all, |t, this| (t.unload)(this));
    info!("session finished after {} frames", report.frames);
    report
}

fn connect(facade: &Facade, entity: *mut Edict, client: &ClientConfig, report: &mut SessionReport) -> bool {
    let name = c_string(&client.name);
    let address = c_string(client.address.as_deref().unwrap_or("127.0.0.1:27005"));
    let mut allowed = true;
    let mut reject = [0u8; REJECT_BUFFER];

    let result = dispatch!(facade, all, |t, this| (t.client_connect)(
        this,
        &mut allowed,
        entity,
        name.as_ptr(),
        address.as_ptr(),
        reject.as_mut_ptr().cast(),
        REJECT_BUFFER as c_int
    ))
    .unwrap_or_default();

    let reject_reason = CStr::from_bytes_until_nul(&reject)
        .map(|r| r.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(
        "ClientConnect({}) -> {:?}, allowed: {}, reason: {:?}",
        client.name, result, allowed, reject_reason
    );
    report.connects.push(ConnectOutcome {
        client: client.name.clone(),
        result,
        allowed,
        reject_reason,
    });
    allowed
}

fn enter(facade: &Facade, slot: usize, entity: *mut Edict, client: &ClientConfig, report: &mut SessionReport) {
    let name = c_string(&client.name);
    dispatch!(facade, all, |t, this| (t.client_put_in_server)(this, entity, name.as_ptr()));
    dispatch!(facade, all, |t, this| (t.client_active)(this, entity));
    if facade.shape() == ShapeKind::Portal2 {
        dispatch!(facade, [CallbacksPortal2], |t, this| (t.client_fully_connect)(this, entity));
    }

    let network_id = c_string(client.network_id.as_deref().unwrap_or("BOT"));
    let validated = dispatch!(facade, all, |t, this| (t.network_id_validated)(
        this,
        name.as_ptr(),
        network_id.as_ptr()
    ))
    .unwrap_or_default();
    info!("NetworkIDValidated({}) -> {:?}", client.name, validated);
    report.validations.push(validated);

    for (cookie, (cvar, value)) in client.cvars.iter().flatten().enumerate() {
        let (cvar, value) = (c_string(cvar), c_string(value));
        dispatch!(facade, [CallbacksV2, CallbacksV3, CallbacksPortal2], |t, this| {
            (t.on_query_cvar_value_finished)(
                this,
                cookie as c_int,
                entity,
                CVAR_VALUE_INTACT,
                cvar.as_ptr(),
                value.as_ptr(),
            )
        });
    }

    dispatch!(facade, all, |t, this| (t.client_settings_changed)(this, entity));

    for _ in 0..client.commands.unwrap_or(0) {
        dispatch!(facade, all, |t, this| (t.set_command_client)(this, slot as c_int));
        // command arguments are not emulated
        let result = dispatch!(facade, all, |t, this| (t.client_command)(this, entity, ptr::null()))
            .unwrap_or_default();
        info!("ClientCommand({}) -> {:?}", client.name, result);
        report.commands.push(result);
    }
}
