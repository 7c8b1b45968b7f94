/*
 *  engine.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Host console output: tier0 Msg/Warning, plugin prefixes, log bridge
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

use std::ffi::{CString, c_char};
use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{LevelFilter, Log, Metadata, Record, info, warn};

use crate::platform::{self, ModuleHandle};

/// Environment variable holding the bridge's own log level.
pub const LOG_ENV: &str = "LUAPLUG_LOG";

/// Where console text ends up. Implementations receive complete text,
/// newline included.
pub trait LogSink: Send + Sync {
    fn print(&self, text: &str);
    fn warn(&self, text: &str);
}

/// tier0's `Msg` / `Warning`, both `void (const char *fmt, ...)`.
type SpewFn = unsafe extern "C" fn(format: *const c_char, ...);

#[cfg(windows)]
const TIER0_MODULES: &[&str] = &["tier0.dll"];
#[cfg(target_os = "macos")]
const TIER0_MODULES: &[&str] = &["libtier0.dylib"];
#[cfg(all(unix, not(target_os = "macos")))]
const TIER0_MODULES: &[&str] = &["libtier0.so", "libtier0_srv.so"];

/// The engine's own console, resolved from the already loaded tier0 module.
pub struct EngineSink {
    // keeps the symbols below valid
    _tier0: ModuleHandle,
    msg: SpewFn,
    warning: SpewFn,
}

impl EngineSink {
    pub fn connect() -> Option<Self> {
        let tier0 = TIER0_MODULES.iter().find_map(|name| platform::module_handle(name))?;
        // SAFETY: both exports have the variadic printf-like signature above.
        let msg = unsafe { platform::symbol_address::<SpewFn>(&tier0, "Msg") }?;
        let warning = unsafe { platform::symbol_address::<SpewFn>(&tier0, "Warning") }?;
        Some(Self { _tier0: tier0, msg, warning })
    }

    fn spew(function: SpewFn, text: &str) {
        let text = c_text(text);
        // Script text is passed as an argument, never as the format.
        unsafe { function(c"%s".as_ptr(), text.as_ptr()) }
    }
}

impl LogSink for EngineSink {
    fn print(&self, text: &str) {
        Self::spew(self.msg, text);
    }

    fn warn(&self, text: &str) {
        Self::spew(self.warning, text);
    }
}

fn c_text(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

/// Stdout/stderr, for running outside the engine.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn print(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn warn(&self, text: &str) {
        let _ = std::io::stderr().lock().write_all(text.as_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Print,
    Warn,
}

/// Records everything written to it; inspect with [`MemorySink::lines`].
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Channel, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Channel, String)> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn printed(&self) -> Vec<String> {
        self.on(Channel::Print)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.on(Channel::Warn)
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn on(&self, channel: Channel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text)
            .collect()
    }

    fn record(&self, channel: Channel, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel, text.to_owned()));
    }
}

impl LogSink for MemorySink {
    fn print(&self, text: &str) {
        self.record(Channel::Print, text);
    }

    fn warn(&self, text: &str) {
        self.record(Channel::Warn, text);
    }
}

/// A sink bound to one plugin: every line gets a `[<name>] ` prefix.
#[derive(Clone)]
pub struct PluginLog {
    name: Arc<str>,
    sink: Arc<dyn LogSink>,
}

impl PluginLog {
    pub fn new(name: &str, sink: Arc<dyn LogSink>) -> Self {
        Self { name: name.into(), sink }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn print(&self, message: &str) {
        self.sink.print(&self.prefixed(message));
    }

    pub fn warn(&self, message: &str) {
        self.sink.warn(&self.prefixed(message));
    }

    fn prefixed(&self, message: &str) -> String {
        let mut text = String::with_capacity(message.len() + self.name.len() + 4);
        if message.is_empty() {
            text.push_str(&format!("[{}] \n", self.name));
        }
        for line in message.lines() {
            text.push('[');
            text.push_str(&self.name);
            text.push_str("] ");
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// `log` records routed to the engine console.
pub struct EngineLogger {
    sink: Arc<dyn LogSink>,
    level: LevelFilter,
}

impl EngineLogger {
    pub fn new(sink: Arc<dyn LogSink>, level: LevelFilter) -> Self {
        Self { sink, level }
    }

    /// Install as the global logger unless the process already has one.
    pub fn install(sink: Arc<dyn LogSink>) -> bool {
        let level = level_from(std::env::var(LOG_ENV).ok().as_deref());
        if log::set_boxed_logger(Box::new(Self::new(sink, level))).is_ok() {
            log::set_max_level(level);
            true
        } else {
            false
        }
    }
}

impl Log for EngineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let text = format!("[luaplug] {}\n", record.args());
        if record.level() <= log::Level::Warn {
            self.sink.warn(&text);
        } else {
            self.sink.print(&text);
        }
    }

    fn flush(&self) {}
}

fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Warn)
}

static HOST_SINK: OnceLock<Option<Arc<dyn LogSink>>> = OnceLock::new();

/// The process-wide console, bound on first use.
///
/// Resolution happens once; a failed bind stays failed for the lifetime of
/// the process.
pub fn host_sink() -> Option<Arc<dyn LogSink>> {
    HOST_SINK
        .get_or_init(|| {
            let sink: Arc<dyn LogSink> = match platform::overrides().log_sink.clone() {
                Some(sink) => sink,
                None => match EngineSink::connect() {
                    Some(sink) => Arc::new(sink),
                    None => {
                        warn!("tier0 Msg/Warning could not be resolved");
                        return None;
                    }
                },
            };
            EngineLogger::install(sink.clone());
            info!("luaplug bridge bound to host console (built {})", crate::BUILD_DATE);
            Some(sink)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_log_prefixes_every_line() {
        let sink = MemorySink::new();
        let log = PluginLog::new("hello", sink.clone());
        log.print("one\ntwo");
        log.warn("bad");
        assert_eq!(sink.printed(), vec!["[hello] one\n[hello] two\n".to_string()]);
        assert_eq!(sink.warnings(), vec!["[hello] bad\n".to_string()]);
    }

    #[test]
    fn test_plugin_log_empty_message_still_emits_a_line() {
        let sink = MemorySink::new();
        PluginLog::new("p", sink.clone()).print("");
        assert_eq!(sink.printed(), vec!["[p] \n".to_string()]);
    }

    #[test]
    fn test_memory_sink_clear() {
        let sink = MemorySink::new();
        sink.print("a");
        sink.warn("b");
        assert_eq!(sink.lines().len(), 2);
        sink.clear();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_level_from_env_value() {
        assert_eq!(level_from(None), LevelFilter::Warn);
        assert_eq!(level_from(Some("debug")), LevelFilter::Debug);
        assert_eq!(level_from(Some(" TRACE ")), LevelFilter::Trace);
        assert_eq!(level_from(Some("loud")), LevelFilter::Warn);
    }

    #[test]
    fn test_engine_logger_routes_by_level() {
        let sink = MemorySink::new();
        let logger = EngineLogger::new(sink.clone(), LevelFilter::Info);
        logger.log(&Record::builder().level(log::Level::Warn).args(format_args!("careful")).build());
        logger.log(&Record::builder().level(log::Level::Info).args(format_args!("hi")).build());
        logger.log(&Record::builder().level(log::Level::Debug).args(format_args!("hidden")).build());
        assert_eq!(sink.warnings(), vec!["[luaplug] careful\n".to_string()]);
        assert_eq!(sink.printed(), vec!["[luaplug] hi\n".to_string()]);
    }

    #[test]
    fn test_c_text_drops_interior_nul() {
        assert_eq!(c_text("a\0b").as_bytes(), b"ab");
    }
}
