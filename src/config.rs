//! Reporter configuration and host environment flags.

use crate::{ProxyMarker, Severity, SeverityMask, default_proxy_markers};
use crate::backtrace::DEFAULT_MAX_FRAMES;
use std::env;
use std::path::PathBuf;

/// Default verbosity: Error and above are echoed with backtraces.
pub const DEFAULT_VERBOSITY: u8 = 1;

/// Default cap on outbound notifications per reporter.
pub const DEFAULT_REPORT_LIMIT: u32 = 10;

// ============================================================================
// Host Environment
// ============================================================================

/// How the process is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Interactive or command-line process; output goes to the terminal.
    #[default]
    Console,
    /// Embedded in a request-serving host; output may reach a browser.
    Embedded,
}

impl ExecutionMode {
    /// Tag used in notification bodies.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Console => "CLI",
            Self::Embedded => "SAPI",
        }
    }
}

/// Flags describing the surrounding host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostEnvironment {
    /// Console or embedded.
    pub mode: ExecutionMode,
    /// Background (AJAX-style) request: no inline backtraces.
    pub ajax: bool,
    /// Prefix stripped from file paths in backtraces.
    pub install_root: Option<String>,
    /// Display name of the host in notifications.
    pub server_name: String,
}

impl HostEnvironment {
    /// Console environment with no install root.
    pub fn console() -> Self {
        Self::default()
    }

    /// Embedded environment.
    pub fn embedded() -> Self {
        Self {
            mode: ExecutionMode::Embedded,
            ..Self::default()
        }
    }

    /// Compute defaults from the process environment.
    ///
    /// A CGI-style `REQUEST_METHOD` variable selects embedded mode;
    /// `HTTP_X_REQUESTED_WITH: XMLHttpRequest` marks a background request.
    /// The server name comes from `SERVER_NAME`, falling back to the system
    /// host name. The install root is the current directory.
    pub fn detect() -> Self {
        let mode = if env::var_os("REQUEST_METHOD").is_some() {
            ExecutionMode::Embedded
        } else {
            ExecutionMode::Console
        };
        let ajax = env::var("HTTP_X_REQUESTED_WITH")
            .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
            .unwrap_or(false);
        let server_name = env::var("SERVER_NAME").ok().unwrap_or_else(|| {
            hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let install_root = env::current_dir()
            .ok()
            .map(|dir| dir.to_string_lossy().into_owned());
        Self {
            mode,
            ajax,
            install_root,
            server_name,
        }
    }

    /// Whether inline HTML wrapping applies.
    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.mode == ExecutionMode::Embedded
    }

    /// Set the AJAX flag.
    pub fn with_ajax(mut self, ajax: bool) -> Self {
        self.ajax = ajax;
        self
    }

    /// Set the install root.
    pub fn with_install_root(mut self, root: impl Into<String>) -> Self {
        self.install_root = Some(root.into());
        self
    }

    /// Set the server name.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }
}

// ============================================================================
// Reporter Configuration
// ============================================================================

/// Construction-time settings for a [`Reporter`](crate::Reporter).
///
/// Verbosity, emit ceiling and reporting mask remain adjustable at runtime.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Verbosity level (0 silences the console).
    pub verbosity: u8,
    /// Severities above this are swallowed by the ring.
    pub emit_ceiling: Severity,
    /// Host reporting mask; excluded faults are declined outright.
    pub reporting_mask: SeverityMask,
    /// Cut long string arguments in backtraces.
    pub detailed_debug: bool,
    /// Notification recipient; `None` disables notifications.
    pub notify_address: Option<String>,
    /// Notifications sent before the reporter stops sending.
    pub report_limit: u32,
    /// Persistent log file.
    pub log_path: Option<PathBuf>,
    /// Dispatch frames consumed during caller resolution.
    pub proxy_markers: Vec<ProxyMarker>,
    /// Require identical messages for repeat collapsing.
    pub match_repeat_message: bool,
    /// Frames rendered per backtrace.
    pub max_frames: usize,
    /// Host flags.
    pub host: HostEnvironment,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            verbosity: DEFAULT_VERBOSITY,
            emit_ceiling: Severity::Report,
            reporting_mask: SeverityMask::ALL,
            detailed_debug: cfg!(feature = "trusted_debug"),
            notify_address: None,
            report_limit: DEFAULT_REPORT_LIMIT,
            log_path: None,
            proxy_markers: default_proxy_markers(),
            match_repeat_message: false,
            max_frames: DEFAULT_MAX_FRAMES,
            host: HostEnvironment::default(),
        }
    }
}

impl ReporterConfig {
    /// Defaults with the detected host environment.
    pub fn from_env() -> Self {
        Self {
            host: HostEnvironment::detect(),
            ..Self::default()
        }
    }

    /// Set the verbosity.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set the emit ceiling.
    pub fn with_emit_ceiling(mut self, ceiling: Severity) -> Self {
        self.emit_ceiling = ceiling;
        self
    }

    /// Set the reporting mask.
    pub fn with_reporting_mask(mut self, mask: SeverityMask) -> Self {
        self.reporting_mask = mask;
        self
    }

    /// Toggle detailed-debug rendering.
    pub fn with_detailed_debug(mut self, enabled: bool) -> Self {
        self.detailed_debug = enabled;
        self
    }

    /// Enable notifications to `address`.
    pub fn with_notify_address(mut self, address: impl Into<String>) -> Self {
        self.notify_address = Some(address.into());
        self
    }

    /// Set the notification cap.
    pub fn with_report_limit(mut self, limit: u32) -> Self {
        self.report_limit = limit;
        self
    }

    /// Append log lines to `path`.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Replace the proxy markers.
    pub fn with_proxy_markers(mut self, markers: Vec<ProxyMarker>) -> Self {
        self.proxy_markers = markers;
        self
    }

    /// Require identical messages for repeat collapsing.
    pub fn with_match_repeat_message(mut self, enabled: bool) -> Self {
        self.match_repeat_message = enabled;
        self
    }

    /// Set the backtrace frame cap.
    pub fn with_max_frames(mut self, max: usize) -> Self {
        self.max_frames = max;
        self
    }

    /// Set the host flags.
    pub fn with_host(mut self, host: HostEnvironment) -> Self {
        self.host = host;
        self
    }
}
