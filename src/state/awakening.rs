use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::Input;
use crate::ai::{CapabilityProbe, RemoteModel};
use crate::config::SettingsStore;

/// How long the probe verdict stays on screen before the machine settles
/// into Normal or Standby.
pub const PROBE_DISPLAY_DELAY: Duration = Duration::from_millis(1_500);

/// Run the capability probe off the actor loop. The epoch travels with the
/// result so the machine can discard answers from a superseded probe.
pub fn spawn_probe(
    model: Arc<dyn RemoteModel>,
    settings: Arc<SettingsStore>,
    inputs: mpsc::Sender<Input>,
    epoch: u64,
) {
    tokio::spawn(async move {
        let report = CapabilityProbe::new(model, settings).validate().await;
        let _ = inputs.send(Input::ProbeFinished { epoch, report }).await;
    });
}

pub fn spawn_settle_delay(inputs: mpsc::Sender<Input>, epoch: u64, available: bool) {
    tokio::spawn(async move {
        tokio::time::sleep(PROBE_DISPLAY_DELAY).await;
        let _ = inputs.send(Input::ProbeSettled { epoch, available }).await;
    });
}
