use tokio::sync::mpsc;

use super::reading::Reading;

/// Engine commands define all the different ways to interact with a running
/// [super::Engine] over a channel. Every request carries the sender its
/// reply is delivered on.
#[derive(Debug)]
pub enum Command {
    /// The latest instantaneous reading. Answered after the first tick if no
    /// tick has happened yet.
    GetCurrent(mpsc::Sender<Reading>),
    /// The average since the last drain. Resets the averaging window.
    GetAverage(mpsc::Sender<Reading>),
    /// The oldest buffered reading. Answered once one is available.
    GetBuffered(mpsc::Sender<Reading>),
    /// Every buffered reading, oldest first
    DrainHistory(mpsc::Sender<Vec<Reading>>),
    Stop,
}
