//! Subscriber setup for the container's diagnostics
//!
//! Every event the container emits uses the `contextual_di` target:
//!
//! | level   | events                                                      |
//! |---------|-------------------------------------------------------------|
//! | `trace` | each resolution step, injector delegation, proxy reuse      |
//! | `debug` | container creation, bindings, scope enter/leave, singletons |
//! | `warn`  | suspicious bindings (alias loops, singleton injectors)      |
//! | `error` | out-of-order `leave()`                                      |
//!
//! Installing a subscriber needs `logging-json` or `logging-pretty`; with
//! only `logging` the `init*` functions do nothing and events go to whatever
//! subscriber the application installed.
//!
//! ```rust,ignore
//! use contextual_di::logging;
//!
//! logging::builder()
//!     .trace()
//!     .di_only()
//!     .pretty()
//!     .init();
//! ```

use tracing::Level;

/// Target of every event emitted by this crate.
pub const TARGET: &str = "contextual_di";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single line per event
    Compact,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::default(),
            target: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Every resolution step.
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Warnings and errors only.
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Keep only events of `target`.
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Keep only this crate's events.
    pub fn di_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Useful with forked handles on worker threads.
    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    fn directive(&self) -> String {
        match self.target {
            Some(target) => format!("{target}={}", self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber globally.
    ///
    /// Fails if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

        let base = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_target(true);

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => base.json().boxed(),
            // Without `logging-json` JSON falls back to the default text format.
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => base.boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(EnvFilter::new(self.directive()))
            .try_init()
    }

    /// Install the subscriber globally, ignoring an already installed one.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// No subscriber backend is compiled in.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON with `logging-json`, otherwise pretty with `logging-pretty`.
pub fn init() {
    if cfg!(feature = "logging-json") {
        init_json();
    } else {
        init_pretty();
    }
}

/// JSON events at debug level, for log aggregation.
///
/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"DEBUG","fields":{"message":"Entering scope","scope":"request#3","depth":1},"target":"contextual_di"}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// Human-readable events at debug level.
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Debug events from this crate only.
pub fn init_di_only() {
    builder().di_only().debug().init();
}
