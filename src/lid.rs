//! Lid-switch guard
//!
//! Playback dies if the machine suspends when the lid closes. Plasma records
//! its own "block sleep" inhibitions with the PowerManagement policy agent
//! but logind still handles the lid switch. While plasmashell holds any
//! inhibition, this guard takes a logind `handle-lid-switch` block lock and
//! releases it when plasmashell lets go.

use futures_util::StreamExt;
use zbus::Connection;
use zbus::zvariant::OwnedFd;

use crate::error::Result;

const PLASMA_SHELL: &str = "org.kde.plasmashell";

#[zbus::proxy(
    interface = "org.kde.Solid.PowerManagement.PolicyAgent",
    default_service = "org.kde.Solid.PowerManagement.PolicyAgent",
    default_path = "/org/kde/Solid/PowerManagement/PolicyAgent"
)]
pub trait PolicyAgent {
    /// `(application, reason)` of every active inhibition
    fn list_inhibitions(&self) -> zbus::Result<Vec<(String, String)>>;

    #[zbus(signal)]
    fn inhibitions_changed(
        &self,
        added: Vec<(String, String)>,
        removed: Vec<String>,
    ) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
pub trait Login1Manager {
    fn inhibit(&self, what: &str, who: &str, why: &str, mode: &str) -> zbus::Result<OwnedFd>;
}

/// Whether plasmashell holds any of `inhibitions`
pub fn plasma_inhibits(inhibitions: &[(String, String)]) -> bool {
    inhibitions.iter().any(|(app, _)| app == PLASMA_SHELL)
}

/// Holds the logind lock while plasma inhibits sleep
pub struct LidGuard<'a> {
    manager: Login1ManagerProxy<'a>,
    who: String,
    lock: Option<OwnedFd>,
}

impl<'a> LidGuard<'a> {
    pub fn new(manager: Login1ManagerProxy<'a>, who: impl Into<String>) -> Self {
        Self {
            manager,
            who: who.into(),
            lock: None,
        }
    }

    /// Take or release the lock to match `inhibited`
    pub async fn sync(&mut self, inhibited: bool) -> Result<()> {
        match (inhibited, self.lock.is_some()) {
            (true, false) => {
                let fd = self
                    .manager
                    .inhibit(
                        "handle-lid-switch:sleep",
                        &self.who,
                        "Block lid switch when a sleep inhibit is active",
                        "block",
                    )
                    .await?;
                tracing::info!("Lid switch inhibited");
                self.lock = Some(fd);
            }
            (false, true) => {
                // Closing the descriptor releases the logind lock.
                self.lock = None;
                tracing::info!("Lid switch inhibit released");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Run until the bus connection goes away
pub async fn run() -> Result<()> {
    let session = Connection::session().await?;
    let system = Connection::system().await?;

    let agent = PolicyAgentProxy::new(&session).await?;
    let manager = Login1ManagerProxy::new(&system).await?;
    let who = std::env::var("USER").unwrap_or_else(|_| "pixel-fleet".to_string());
    let mut guard = LidGuard::new(manager, who);

    let mut changes = agent.receive_inhibitions_changed().await?;
    guard.sync(plasma_inhibits(&agent.list_inhibitions().await?)).await?;
    tracing::info!("Watching PowerManagement inhibitions");

    while changes.next().await.is_some() {
        match agent.list_inhibitions().await {
            Ok(inhibitions) => guard.sync(plasma_inhibits(&inhibitions)).await?,
            Err(e) => tracing::warn!("Listing inhibitions failed: {}", e),
        }
    }

    tracing::info!("Inhibition signal stream ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plasmashell_counts() {
        let none: Vec<(String, String)> = Vec::new();
        assert!(!plasma_inhibits(&none));

        let other = vec![("org.mozilla.firefox".to_string(), "video".to_string())];
        assert!(!plasma_inhibits(&other));

        let plasma = vec![
            ("org.mozilla.firefox".to_string(), "video".to_string()),
            (PLASMA_SHELL.to_string(), "sleep blocked by user".to_string()),
        ];
        assert!(plasma_inhibits(&plasma));
    }
}
