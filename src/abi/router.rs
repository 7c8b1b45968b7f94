/*
 *  abi/router.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Interface-version lookup for CreateInterface
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
use std::ptr;
use std::sync::{Arc, OnceLock};

use log::{debug, info};

use super::adapter::Facade;
use super::shapes::ShapeKind;
use crate::engine::LogSink;
use crate::identity::PluginIdentity;
use crate::platform;
use crate::plugin::Plugin;

/// Which engine branch is hosting us, as far as the vtable layout cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFlavor {
    Generic,
    Portal2,
}

impl HostFlavor {
    pub fn detect(executable_name: &str) -> Self {
        if executable_name.to_ascii_lowercase().contains("portal2") {
            Self::Portal2
        } else {
            Self::Generic
        }
    }
}

/// One facade per known shape, all forwarding to the same plugin.
pub struct Router {
    host: HostFlavor,
    facades: Vec<Facade>,
}

impl Router {
    pub fn new(host: HostFlavor, plugin: &'static Plugin) -> Self {
        let facades = ShapeKind::ALL
            .into_iter()
            .map(|shape| Facade::new(shape, plugin))
            .collect();
        Self { host, facades }
    }

    pub fn host(&self) -> HostFlavor {
        self.host
    }

    /// The facade for an exact version string. A shape made for the running
    /// host wins over a generic shape with the same version.
    pub fn select(&self, version: &[u8]) -> Option<&Facade> {
        let mut generic = None;
        for facade in &self.facades {
            let shape = facade.shape();
            if shape.version().as_bytes() != version {
                continue;
            }
            match shape.host() {
                Some(host) if host == self.host => return Some(facade),
                Some(_) => {}
                None => {
                    generic.get_or_insert(facade);
                }
            }
        }
        generic
    }

    pub fn lookup(&self, version: &CStr) -> *mut c_void {
        match self.select(version.to_bytes()) {
            Some(facade) => {
                debug!("{:?} served as {:?}", version, facade.shape());
                facade.as_this().cast()
            }
            None => {
                debug!("no callback shape matches {:?}", version);
                ptr::null_mut()
            }
        }
    }
}

static PLUGIN: OnceLock<Plugin> = OnceLock::new();
static ROUTER: OnceLock<Router> = OnceLock::new();

/// The process-wide router, built on first use and never torn down.
///
/// The host flavor is detected and the plugin identity discovered exactly
/// once, here.
pub fn global(sink: &Arc<dyn LogSink>) -> &'static Router {
    ROUTER.get_or_init(|| {
        let host = HostFlavor::detect(&platform::executable_name());
        let plugin = PLUGIN.get_or_init(|| {
            let identity = PluginIdentity::discover();
            match &identity {
                Some(identity) => info!("plugin {} rooted at {}", identity.name(), identity.base_dir().display()),
                None => info!("plugin module path unknown"),
            }
            Plugin::new(identity, sink.clone())
        });
        let router = Router::new(host, plugin);
        debug!("host flavor {:?}", router.host());
        router
    })
}
