//! Environment Detection - 실행 환경 자동 감지
//!
//! 프로세스 시작 시 한 번 읽어서 풀 크기와 파서 타임아웃을 결정한다.
//! Worker 프로세스는 부모가 넘겨준 환경 변수로 같은 값을 다시 읽는다.

use std::env;

/// Enable CPU profiling (per-task timing inside workers)
pub const ENV_CPU_PROFILING: &str = "DOCPOOL_CPU_PROFILING";
/// Enable memory profiling (peak RSS after each task)
pub const ENV_MEMORY_PROFILING: &str = "DOCPOOL_MEMORY_PROFILING";
/// Enable trace profiling (one span per task)
pub const ENV_TRACE_PROFILING: &str = "DOCPOOL_TRACE_PROFILING";
/// Enable core debug output (worker PID start/finish lines)
pub const ENV_CORE_PROFILING: &str = "DOCPOOL_CORE_PROFILING";
/// Worker address-space limit in bytes
pub const ENV_PARSER_MEMORY_LIMIT: &str = "DOCPOOL_PARSER_MEMORY_LIMIT";

/// Variables set by common CI providers
const CI_VARS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "GITHUB_ACTIONS",
    "CIRCLECI",
    "GITLAB_CI",
    "TRAVIS",
    "BUILDKITE",
    "JENKINS_URL",
];

/// 운영체제 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    MacOS,
    Linux,
    Unknown,
}

impl OsType {
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOS
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOS => "macOS",
            Self::Linux => "Linux",
            Self::Unknown => "Unknown",
        }
    }

    /// `RLIMIT_AS` based worker memory limits are only wired up for Linux.
    pub fn supports_memory_limit(&self) -> bool {
        matches!(self, Self::Linux)
    }
}

/// Profiling instrumentation switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilingFlags {
    pub cpu: bool,
    pub memory: bool,
    pub trace: bool,
    pub core: bool,
}

impl ProfilingFlags {
    /// Read the flags from the process environment.
    pub fn detect() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the flags through an arbitrary lookup (tests, worker bootstrap).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| is_truthy(&v)).unwrap_or(false);
        Self {
            cpu: flag(ENV_CPU_PROFILING),
            memory: flag(ENV_MEMORY_PROFILING),
            trace: flag(ENV_TRACE_PROFILING),
            core: flag(ENV_CORE_PROFILING),
        }
    }

    /// Instrumentation that materially slows parsing is active.
    ///
    /// `core` only adds a couple of debug lines and does not count.
    pub fn slows_parsing(&self) -> bool {
        self.cpu || self.memory || self.trace
    }

    /// Environment pairs that re-enable the same flags in a child process.
    pub fn to_env(&self) -> Vec<(&'static str, &'static str)> {
        let as_str = |b: bool| if b { "1" } else { "0" };
        vec![
            (ENV_CPU_PROFILING, as_str(self.cpu)),
            (ENV_MEMORY_PROFILING, as_str(self.memory)),
            (ENV_TRACE_PROFILING, as_str(self.trace)),
            (ENV_CORE_PROFILING, as_str(self.core)),
        ]
    }
}

/// 전체 환경 정보
#[derive(Debug, Clone)]
pub struct Environment {
    pub os: OsType,
    pub ci: bool,
    pub cpu_count: usize,
    pub profiling: ProfilingFlags,
    /// Memory limit override from `DOCPOOL_PARSER_MEMORY_LIMIT`
    pub parser_memory_limit: Option<u64>,
}

impl Environment {
    pub fn detect() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::from_lookup(cpu_count, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(cpu_count: usize, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let ci = CI_VARS
            .iter()
            .any(|key| lookup(key).map(|v| is_truthy(&v) || *key == "JENKINS_URL").unwrap_or(false));

        let parser_memory_limit = lookup(ENV_PARSER_MEMORY_LIMIT)
            .and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            os: OsType::detect(),
            ci,
            cpu_count: cpu_count.max(1),
            profiling: ProfilingFlags::from_lookup(&lookup),
            parser_memory_limit,
        }
    }

    /// Default worker count: half the cores (min 1), fixed small value on CI.
    pub fn default_worker_count(&self) -> usize {
        if self.ci {
            crate::config::CI_MAX_WORKERS
        } else {
            (self.cpu_count / 2).max(1)
        }
    }

    pub fn to_system_info(&self) -> String {
        format!(
            "OS: {}\nCPUs: {}\nCI: {}\nProfiling: cpu={} memory={} trace={} core={}",
            self.os.name(),
            self.cpu_count,
            self.ci,
            self.profiling.cpu,
            self.profiling.memory,
            self.profiling.trace,
            self.profiling.core,
        )
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::detect()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
