/*
 *  bin/luaplug-emulator.rs
 *
 *  luaplug Engine Emulator - run a Lua plugin without a game server
 *
 *  (c) 2026 luaplug contributors
 *
 *  Loads the bridge in-process, asks it for a callback object the way the
 *  engine does and plays a scripted level against it.
 *
 *  Usage:
 *    cargo run --features emulator --bin luaplug-emulator -- --plugin addons/hello.so
 *    cargo run --features emulator --bin luaplug-emulator -- --config demos/session.yaml --executable-name portal2.exe
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

#[cfg(feature = "emulator")]
fn main() -> anyhow::Result<()> {
    use std::ffi::{CString, c_int};
    use std::sync::Arc;

    use anyhow::{Context, anyhow, bail};
    use env_logger::Env;
    use log::info;

    use luaplug::emulator::{Scenario, config, session};
    use luaplug::engine::ConsoleSink;
    use luaplug::{BUILD_DATE, CreateInterface, Facade, HostOverrides, ShapeKind, install_overrides};

    let cfg = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level.as_deref().unwrap_or("info")))
        .format_timestamp_secs()
        .init();

    info!("{} engine emulator", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    install_overrides(HostOverrides {
        log_sink: Some(Arc::new(ConsoleSink)),
        module_path: cfg.plugin.clone(),
        executable_name: cfg.executable_name.clone(),
    })
    .map_err(|_| anyhow!("host overrides already installed"))?;

    let version = cfg
        .interface_version
        .clone()
        .unwrap_or_else(|| ShapeKind::V3.version().to_owned());
    let name = CString::new(version.as_str()).context("interface version contains a NUL byte")?;

    let mut status: c_int = 0;
    // SAFETY: `name` is NUL terminated and `status` is valid for a write.
    let interface = unsafe { CreateInterface(name.as_ptr(), &mut status) };
    if interface.is_null() {
        bail!("CreateInterface(\"{}\") failed with status {}", version, status);
    }
    // SAFETY: a non-null CreateInterface result is a Facade that lives for
    // the rest of the process.
    let facade: &Facade = unsafe { &*interface.cast::<Facade>() };
    info!("CreateInterface(\"{}\") -> {:?}", version, facade.shape());

    let scenario = Scenario::from_config(cfg.session.as_ref());
    let report = session::run(facade, &scenario);
    if !report.loaded {
        bail!("plugin failed to load");
    }

    info!(
        "{}: {} connects ({} rejected), {} commands, {} frames",
        report.description,
        report.connects.len(),
        report.connects.iter().filter(|c| !c.allowed).count(),
        report.commands.len(),
        report.frames
    );
    Ok(())
}

#[cfg(not(feature = "emulator"))]
fn main() {
    eprintln!("ERROR: This binary requires the 'emulator' feature.");
    eprintln!();
    eprintln!("Please compile with:");
    eprintln!("  cargo run --bin luaplug-emulator --features emulator");
    std::process::exit(1);
}
