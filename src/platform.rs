/*
 *  platform.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Thin OS wrappers: own module path, executable name, loaded symbols
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
use std::sync::{Arc, OnceLock};

use log::debug;

use crate::engine::LogSink;

/// Stand-ins for the collaborators normally discovered from the host process.
///
/// Installed once, before the first `CreateInterface` call. The emulator
/// uses this to run a plugin without the engine's tier0 library, and tests
/// use it to point the bridge at a fixture directory.
#[derive(Clone, Default)]
pub struct HostOverrides {
    pub log_sink: Option<Arc<dyn LogSink>>,
    pub module_path: Option<PathBuf>,
    pub executable_name: Option<String>,
}

static OVERRIDES: OnceLock<HostOverrides> = OnceLock::new();

/// Install host overrides. Fails, handing them back, once anything has
/// already read the overrides (the first `CreateInterface` does).
pub fn install_overrides(overrides: HostOverrides) -> Result<(), HostOverrides> {
    OVERRIDES.set(overrides)
}

pub(crate) fn overrides() -> &'static HostOverrides {
    OVERRIDES.get_or_init(HostOverrides::default)
}

/// Full path of the module this code was linked into.
pub fn module_path() -> Option<PathBuf> {
    if let Some(path) = overrides().module_path.clone() {
        return Some(path);
    }
    let path = own_module_path();
    debug!("own module path: {:?}", path);
    path
}

/// File name of the running executable, e.g. `srcds_linux` or `portal2.exe`.
pub fn executable_name() -> String {
    if let Some(name) = overrides().executable_name.clone() {
        return name;
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn own_module_path() -> Option<PathBuf> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let address = own_module_path as *const () as *const libc::c_void;
    // SAFETY: Dl_info is plain old data and dladdr only writes into it.
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    if unsafe { libc::dladdr(address, &mut info) } == 0 || info.dli_fname.is_null() {
        return None;
    }
    // SAFETY: dladdr succeeded, dli_fname points at a NUL terminated path.
    let name = unsafe { CStr::from_ptr(info.dli_fname) };
    Some(PathBuf::from(OsStr::from_bytes(name.to_bytes())))
}

#[cfg(windows)]
fn own_module_path() -> Option<PathBuf> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use winapi::shared::minwindef::{DWORD, HMODULE};
    use winapi::um::libloaderapi::{
        GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
        GetModuleFileNameW, GetModuleHandleExW,
    };
    use winapi::um::winnt::LPCWSTR;

    let flags = GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT;
    let address = own_module_path as *const () as LPCWSTR;
    let mut module: HMODULE = std::ptr::null_mut();
    if unsafe { GetModuleHandleExW(flags, address, &mut module) } == 0 {
        return None;
    }

    let mut buffer = vec![0u16; 260];
    loop {
        let written = unsafe { GetModuleFileNameW(module, buffer.as_mut_ptr(), buffer.len() as DWORD) } as usize;
        if written == 0 {
            return None;
        }
        if written < buffer.len() {
            buffer.truncate(written);
            return Some(PathBuf::from(OsString::from_wide(&buffer)));
        }
        // truncated, retry with a larger buffer
        let grown = buffer.len() * 2;
        buffer.resize(grown, 0);
    }
}

/// A module that was already mapped into the process when we looked it up.
pub struct ModuleHandle(libloading::Library);

/// Look up a module by file name without loading it.
pub fn module_handle(name: &str) -> Option<ModuleHandle> {
    #[cfg(unix)]
    let library = unsafe {
        libloading::os::unix::Library::open(Some(name), libc::RTLD_LAZY | libc::RTLD_NOLOAD)
    };
    #[cfg(windows)]
    let library = libloading::os::windows::Library::open_already_loaded(name);

    match library {
        Ok(library) => Some(ModuleHandle(library.into())),
        Err(e) => {
            debug!("module {} not loaded: {}", name, e);
            None
        }
    }
}

/// Resolve an exported symbol of a loaded module.
///
/// # Safety
///
/// `T` must match the actual type of the exported symbol.
pub unsafe fn symbol_address<T: Copy>(module: &ModuleHandle, name: &str) -> Option<T> {
    match unsafe { module.0.get::<T>(name.as_bytes()) } {
        Ok(symbol) => Some(*symbol),
        Err(e) => {
            debug!("symbol {} not found: {}", name, e);
            None
        }
    }
}
