//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use sdnrace_trace::events::TraceEvent;
use sdnrace_utils::Receiver;

use crate::controller::{self, ControllerLine};
use crate::events;
use crate::logger::HappensBeforeLogger;

// Logger event loop.
//
// Aggregates the simulator event channel and the controller line channel
// onto a single task, so the logger state never needs synchronisation. The
// loop runs until both input channels close, then flushes and closes the
// trace.
pub async fn run(
    mut logger: HappensBeforeLogger,
    mut trace_rx: Receiver<TraceEvent>,
    mut lines_rx: Receiver<ControllerLine>,
) -> HappensBeforeLogger {
    let mut trace_open = true;
    let mut lines_open = true;

    while trace_open || lines_open {
        tokio::select! {
            msg = trace_rx.recv(), if trace_open => {
                match msg {
                    Some(event) => {
                        if let Err(error) =
                            events::process_trace_event(&mut logger, event)
                        {
                            error.log();
                        }
                    }
                    None => trace_open = false,
                }
            }
            msg = lines_rx.recv(), if lines_open => {
                match msg {
                    Some(line) => {
                        if let Err(error) =
                            controller::process_controller_line(
                                &mut logger,
                                line,
                            )
                        {
                            error.log();
                        }
                    }
                    None => lines_open = false,
                }
            }
        }
    }

    logger.shutdown();
    logger
}
