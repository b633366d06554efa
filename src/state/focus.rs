use std::time::Duration;

use tokio::sync::mpsc;

use super::Input;
use crate::models::FocusSession;

/// Celebration window after a completed session before the machine returns
/// to Normal.
pub const COMPLETION_GRACE: Duration = Duration::from_secs(6);

pub fn spawn_completion_grace(inputs: mpsc::Sender<Input>) {
    tokio::spawn(async move {
        tokio::time::sleep(COMPLETION_GRACE).await;
        let _ = inputs.send(Input::GraceElapsed).await;
    });
}

pub fn completion_message(session: &FocusSession) -> String {
    let planned_min = session.planned_ms / 60_000;
    let focused_min = session.total_focused_ms / 60_000;
    if focused_min > 0 {
        format!(
            "Great work! {planned_min} minutes on '{}', about {focused_min} of them focused.",
            session.goal
        )
    } else {
        format!("Great work! '{}' is in the books.", session.goal)
    }
}
