use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::api::server;
use crate::commands::validate::{display_name, print_diagnostics};
use crate::config;
use crate::config::model::BridgeConfig;
use crate::config::resolve::resolve_config;
use crate::config::validate::validate;
use crate::controller::state::{ExitReason, ProcessState};
use crate::controller::Controller;

/// Run the bridge and return the process exit code.
///
/// Signal handlers are registered before anything is installed, so a signal
/// during startup still ends in a full reclaim. Resources are installed in
/// the order they are later reclaimed in reverse: control port rule, https
/// certificate, then environments. A failure to install one is logged and
/// the rest still start; whatever did install is reclaimed on exit.
pub async fn run(config_file: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<i32> {
    let mut config = load_validated(config_file)?;
    if let Some(host) = host {
        config.bridge.host = host;
    }
    if let Some(port) = port {
        config.bridge.port = port;
    }
    if config.bridge.port == 0 {
        bail!("control port must be nonzero");
    }

    let signals = Signals::listen()?;
    let (controller, mut exit) = Controller::new(&config);
    tokio::spawn(stop_on_signal(Arc::clone(&controller), signals));

    install_resources(&controller).await;

    if controller.state() == ProcessState::Stopping {
        let request = exit.wait().await;
        info!(code = request.code, reason = %request.reason, "stopped during startup");
        controller.shutdown().await;
        return Ok(request.code);
    }

    let listener = match server::bind(&config.bridge.host, config.bridge.port).await {
        Ok(listener) => listener,
        Err(e) => {
            controller.force_stop(1, ExitReason::ServerStopped);
            controller.shutdown().await;
            return Err(e);
        }
    };

    let request = server::serve_until_exit(listener, controller, exit).await;
    info!(code = request.code, "bridge stopped");
    Ok(request.code)
}

/// Load the resolved config file and reject it with diagnostics if it does
/// not validate. Without a file the built-in defaults are used.
fn load_validated(config_file: Option<&Path>) -> Result<BridgeConfig> {
    let Some(config_path) = resolve_config(config_file)? else {
        return config::load_or_default(None);
    };

    let (config, source) = config::load_config(&config_path)?;
    let filename = display_name(&config_path);
    if let Err(errors) = validate(&config, &source, &filename) {
        let count = errors.len();
        print_diagnostics(errors);
        bail!("{} has {} configuration error(s)", filename, count);
    }
    Ok(config)
}

/// Install startup resources, skipping the rest once a stop was requested.
async fn install_resources(controller: &Controller) {
    if let Err(e) = controller.open_control_port().await {
        warn!(error = %format!("{:#}", e), "control port rule not installed");
    }
    if controller.state() == ProcessState::Stopping {
        return;
    }
    if let Err(e) = controller.install_tls_binding().await {
        warn!(error = %format!("{:#}", e), "certificate not installed");
    }
    if controller.state() == ProcessState::Stopping {
        return;
    }
    controller.start_environments().await;
}

/// Route SIGINT/SIGTERM through the same stop path as `DELETE /bridge`.
async fn stop_on_signal(controller: Arc<Controller>, mut signals: Signals) {
    let (code, name) = signals.recv().await;
    eprintln!("\nShutting down...");
    controller.force_stop(code, ExitReason::Signal(name));
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    /// Registers the handlers immediately, replacing the default dispositions.
    fn listen() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("listening for SIGINT")?,
            terminate: signal(SignalKind::terminate()).context("listening for SIGTERM")?,
        })
    }

    async fn recv(&mut self) -> (i32, &'static str) {
        tokio::select! {
            _ = self.interrupt.recv() => (130, "SIGINT"),
            _ = self.terminate.recv() => (143, "SIGTERM"),
        }
    }
}

#[cfg(windows)]
struct Signals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl Signals {
    fn listen() -> Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c().context("listening for Ctrl-C")?,
        })
    }

    async fn recv(&mut self) -> (i32, &'static str) {
        self.ctrl_c.recv().await;
        (130, "Ctrl-C")
    }
}
