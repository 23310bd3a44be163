//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use sdnrace_utils::Sender;
use sdnrace_utils::task::Task;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::Instrument;

use crate::controller::ControllerLine;
use crate::error::IoError;

//
// Logger tasks diagram:
//                               +--------------+
//       simulator events (1x) ->|              |
//                               |    logger    | -> trace file + HB graph
//     controller_reader (1x) -> |              |
//                               +--------------+
//
// The logger's state is only ever mutated on the logger task; the reader
// task forwards parsed controller lines through an mpsc channel.
//

// ===== logger tasks =====

// Controller stdout reader task. Filters the instrumentation lines out of
// the subprocess pipe handed in by the process spawner.
pub fn controller_reader<R>(
    pipe: R,
    lines_tx: &Sender<ControllerLine>,
) -> Task<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let lines_tx = lines_tx.clone();
    Task::spawn(
        async move {
            let mut lines = BufReader::new(pipe).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(line) = ControllerLine::parse(&line) {
                            let _ = lines_tx.send(line).await;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        IoError::ControllerPipeRead(error).log();
                        break;
                    }
                }
            }
        }
        .in_current_span(),
    )
}
