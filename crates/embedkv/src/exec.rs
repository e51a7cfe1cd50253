//! Platform-specific executable resolution.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming an extra directory searched for executables.
pub const BIN_DIR_ENV: &str = "EMBEDKV_BIN_DIR";

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Unix,
    MacOsX,
    Windows,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::X86, Arch::X86_64, Arch::Arm64];
}

/// An (OS, architecture) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "windows" => Os::Windows,
            "macos" => Os::MacOsX,
            _ => Os::Unix,
        };
        let arch = match std::env::consts::ARCH {
            "x86" => Arch::X86,
            "aarch64" => Arch::Arm64,
            _ => Arch::X86_64,
        };
        Self { os, arch }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.os, self.arch)
    }
}

/// Maps platforms to store executables.
#[derive(Debug, Clone)]
pub struct ExecProvider {
    executables: HashMap<Platform, PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl Default for ExecProvider {
    fn default() -> Self {
        let table = [
            (Os::Unix, Arch::X86, "redis-server-7.0.8-linux-386"),
            (Os::Unix, Arch::X86_64, "redis-server-7.0.8-linux-amd64"),
            (Os::Unix, Arch::Arm64, "redis-server-7.0.8-linux-arm64"),
            (Os::MacOsX, Arch::X86, "redis-server-7.0.8-darwin-amd64"),
            (Os::MacOsX, Arch::X86_64, "redis-server-7.0.8-darwin-amd64"),
            (Os::MacOsX, Arch::Arm64, "redis-server-7.0.8-darwin-arm64"),
            (Os::Windows, Arch::X86, "redis-server-6.2.6-win-amd64.exe"),
            (Os::Windows, Arch::X86_64, "redis-server-6.2.6-win-amd64.exe"),
        ];

        Self {
            executables: table
                .into_iter()
                .map(|(os, arch, name)| (Platform::new(os, arch), PathBuf::from(name)))
                .collect(),
            search_dirs: Vec::new(),
        }
    }
}

impl ExecProvider {
    /// Uses `executable` for every architecture of `os`.
    pub fn override_os(mut self, os: Os, executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        for arch in Arch::ALL {
            self.executables.insert(Platform::new(os, arch), executable.clone());
        }
        self
    }

    /// Uses `executable` for one platform.
    pub fn override_platform(
        mut self,
        os: Os,
        arch: Arch,
        executable: impl Into<PathBuf>,
    ) -> Self {
        self.executables.insert(Platform::new(os, arch), executable.into());
        self
    }

    /// Uses `executable` on every platform.
    pub fn always(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        [Os::Unix, Os::MacOsX, Os::Windows]
            .into_iter()
            .fold(Self::default(), |provider, os| {
                provider.override_os(os, executable.clone())
            })
    }

    /// Adds a directory searched when the table entry isn't an existing path.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Table entry for `platform`, unresolved.
    pub fn entry(&self, platform: Platform) -> Option<&Path> {
        self.executables.get(&platform).map(PathBuf::as_path)
    }

    /// Resolves the executable for the current platform.
    pub fn resolve(&self) -> Result<PathBuf> {
        self.resolve_for(Platform::current())
    }

    /// Resolves the executable for `platform` to an absolute path.
    pub fn resolve_for(&self, platform: Platform) -> Result<PathBuf> {
        let entry = self.entry(platform).ok_or_else(|| Error::ExecutableNotFound {
            platform: platform.to_string(),
            path: PathBuf::new(),
        })?;

        if entry.is_file() {
            return Ok(absolute(entry)?);
        }

        let file_name = entry.file_name().unwrap_or(entry.as_os_str());
        let env_dir = std::env::var_os(BIN_DIR_ENV).map(PathBuf::from);
        let found = self
            .search_dirs
            .iter()
            .chain(env_dir.as_ref())
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file());

        match found {
            Some(path) => {
                tracing::debug!(%platform, path = %path.display(), "resolved executable");
                Ok(absolute(&path)?)
            }
            None => Err(Error::ExecutableNotFound {
                platform: platform.to_string(),
                path: entry.to_path_buf(),
            }),
        }
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    std::path::absolute(path)
}
