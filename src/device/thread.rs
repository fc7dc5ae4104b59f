//! The real-time loop driving a [`DeviceCore`].

use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use super::message::DeviceMessage;
use super::mixer::DeviceCore;
use super::output::DeviceOutput;
use crate::adapter::StreamId;

/// Runs until a [`DeviceMessage::Shutdown`] arrives or every sender is gone.
///
/// The only blocking call is the wait for the next message or the period
/// deadline. Messages are applied as they arrive; the mixing pass runs once
/// per period.
pub(crate) fn run(
    mut core: DeviceCore,
    mut output: Box<dyn DeviceOutput>,
    messages: Receiver<DeviceMessage>,
    killed: Sender<StreamId>,
    period: Duration,
) {
    tracing::info!(device = %core.name(), output = output.name(), ?period, "Device thread started");

    let mut deadline = Instant::now();
    loop {
        match messages.recv_deadline(deadline) {
            Ok(msg) => {
                if !core.process_message(msg) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!(device = %core.name(), "Control side gone");
                break;
            }
        }

        core.iterate(output.as_mut());
        for id in core.take_killed() {
            if killed.send(id).is_err() {
                tracing::trace!(device = %core.name(), stream = %id, "Handle gone, killed stream not reported");
            }
        }

        deadline += period;
        let now = Instant::now();
        if deadline + period < now {
            tracing::debug!(device = %core.name(), behind = ?(now - deadline), "Device thread fell behind");
            deadline = now;
        }
    }

    core.shutdown();
    tracing::info!(device = %core.name(), "Device thread stopped");
}
