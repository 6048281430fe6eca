//! Session bootstrapper
//!
//! The parent compositor registers its scripting interface on a private
//! session bus. The bus descriptor printed by the bus launcher is persisted
//! to the scratch directory so later runs reattach to the same daemon
//! instead of starting a new one each time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use zbus::Connection;

use crate::config::Config;
use crate::error::{FleetError, Result};
use crate::process::{SpawnEnv, is_alive, spawn_error};

const ADDRESS_KEY: &str = "DBUS_SESSION_BUS_ADDRESS";
const PID_KEY: &str = "DBUS_SESSION_BUS_PID";

/// Parsed `key=value` lines describing a running bus daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    vars: BTreeMap<String, String>,
}

impl SessionDescriptor {
    /// Parse descriptor text. Blank lines are skipped; any other line
    /// without a `=` or with an empty key is an error.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let mut vars = BTreeMap::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    vars.insert(key.to_string(), value.to_string());
                }
                _ => {
                    return Err(FleetError::SessionDescriptor {
                        path: origin.to_path_buf(),
                        line: i + 1,
                        content: line.to_string(),
                    });
                }
            }
        }
        Ok(Self { vars })
    }

    /// Read a persisted descriptor; `None` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text: String = self
            .vars
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect();
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn address(&self) -> Option<&str> {
        self.vars.get(ADDRESS_KEY).map(String::as_str)
    }

    pub fn daemon_pid(&self) -> Option<u32> {
        self.vars.get(PID_KEY).and_then(|pid| pid.trim().parse().ok())
    }

    pub fn vars(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    /// A descriptor without a pid cannot be checked and is assumed live
    fn is_live(&self) -> bool {
        self.daemon_pid().is_none_or(is_alive)
    }
}

/// A connected bus session and the environment that reaches it
pub struct BusSession {
    pub descriptor: SessionDescriptor,
    /// Inherited environment plus the bus variables, for child processes
    pub env: SpawnEnv,
    pub connection: Connection,
}

/// Reuse the persisted bus session or start one, then connect to it
pub async fn ensure_session(config: &Config) -> Result<BusSession> {
    let descriptor = ensure_descriptor(config).await?;
    let address = descriptor.address().ok_or_else(|| {
        FleetError::SessionUnavailable(format!("descriptor has no {}", ADDRESS_KEY))
    })?;

    tracing::info!("Connecting to session bus at {}", address);
    let connection = zbus::connection::Builder::address(address)
        .map_err(|e| FleetError::bus(format!("bad bus address {}: {}", address, e)))?
        .build()
        .await
        .map_err(|e| FleetError::bus(format!("connect to {}: {}", address, e)))?;

    let env = SpawnEnv::inherit().merged(descriptor.vars());
    Ok(BusSession {
        descriptor,
        env,
        connection,
    })
}

/// Load a live descriptor, launching a bus daemon at most once when none
/// is usable.
pub async fn ensure_descriptor(config: &Config) -> Result<SessionDescriptor> {
    let path = config.session_path();
    let mut launched = false;

    loop {
        match SessionDescriptor::load(&path)? {
            Some(descriptor) if descriptor.is_live() => {
                tracing::debug!("Reusing bus session from {}", path.display());
                return Ok(descriptor);
            }
            Some(descriptor) => {
                tracing::warn!(
                    "Bus daemon {:?} from {} is gone, discarding descriptor",
                    descriptor.daemon_pid(),
                    path.display()
                );
                std::fs::remove_file(&path)?;
            }
            None => {}
        }

        if launched {
            return Err(FleetError::SessionUnavailable(format!(
                "no live bus session in {} after launching `{}`",
                path.display(),
                config.bus_launcher
            )));
        }

        launch_daemon(config, &path).await?;
        launched = true;
    }
}

async fn launch_daemon(config: &Config, path: &Path) -> Result<()> {
    tracing::info!("Starting bus daemon with {}", config.bus_launcher);
    let output = tokio::process::Command::new(&config.bus_launcher)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(&config.bus_launcher, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::bus(format!(
            "{} failed ({}): {}",
            config.bus_launcher,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let descriptor = SessionDescriptor::parse(&stdout, &PathBuf::from(&config.bus_launcher))?;
    descriptor.persist(path)?;
    tracing::info!(
        "Bus daemon {:?} started, descriptor saved to {}",
        descriptor.daemon_pid(),
        path.display()
    );
    Ok(())
}
