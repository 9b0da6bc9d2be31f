//! Streaming writer: emit byte sources in fixed-size blocks while executing
//! scheduled actions at exact byte offsets.
//!
//! Chunks are split wherever an action's offset falls strictly inside one, so
//! an action never fires early or late regardless of block size. Injected
//! bytes are supplemental: they go to the sink but do not advance progress
//! through the value sequence and never trigger further actions.

use crate::ast::{PauseDuration, ResolvedAction, ResolvedActionKind};
use crate::message::Message;
use crate::settings::Settings;
use crate::value::{ByteSource, RenderError};
use std::io::Write;
use std::time::Duration;

/// Default chunk size for [`serve`].
pub const BLOCKSIZE: u64 = 1024;

/// Outcome of one render: how many bytes reached the sink, and whether a
/// disconnect action truncated the message. Truncation is a normal outcome,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub bytes_sent: u64,
    pub disconnected: bool,
}

/// Stream `values` to `fp` in chunks of at most `block_size` bytes, executing
/// `actions` (sorted ascending by offset, stable) at their exact offsets.
///
/// Actions at the same offset all execute, in order, before the next byte is
/// written. Actions with offsets past the end of the value sequence never
/// fire, except at exactly the total length ("after"), which fires once all
/// value bytes are out.
pub fn write_values<W: Write>(
    fp: &mut W,
    values: &[Box<dyn ByteSource>],
    actions: Vec<ResolvedAction>,
    block_size: u64,
) -> std::io::Result<WriteSummary> {
    debug_assert!(block_size > 0);
    let mut sofar: u64 = 0; // value bytes written; injected bytes excluded
    let mut sent: u64 = 0; // all bytes that reached the sink
    let mut next = 0; // index of the next unexecuted action

    for value in values {
        let vlen = value.len();
        let mut pos: u64 = 0;
        while pos < vlen {
            while next < actions.len() && actions[next].offset == sofar {
                if execute(fp, &actions[next], block_size, &mut sent)? {
                    return Ok(WriteSummary {
                        bytes_sent: sent,
                        disconnected: true,
                    });
                }
                next += 1;
            }
            let mut end = (pos + block_size).min(vlen);
            if next < actions.len() {
                let upcoming = actions[next].offset;
                if upcoming > sofar {
                    end = end.min(pos + (upcoming - sofar));
                }
            }
            let chunk = value.slice(pos, end);
            fp.write_all(&chunk)?;
            sent += chunk.len() as u64;
            sofar += end - pos;
            pos = end;
        }
    }

    // Actions scheduled at exactly the total length fire after the last byte.
    while next < actions.len() && actions[next].offset <= sofar {
        if execute(fp, &actions[next], block_size, &mut sent)? {
            return Ok(WriteSummary {
                bytes_sent: sent,
                disconnected: true,
            });
        }
        next += 1;
    }

    fp.flush()?;
    Ok(WriteSummary {
        bytes_sent: sent,
        disconnected: false,
    })
}

/// Run one action. Returns true if the connection should disconnect.
fn execute<W: Write>(
    fp: &mut W,
    action: &ResolvedAction,
    block_size: u64,
    sent: &mut u64,
) -> std::io::Result<bool> {
    match &action.kind {
        ResolvedActionKind::Disconnect => {
            fp.flush()?;
            Ok(true)
        }
        ResolvedActionKind::Pause(PauseDuration::Seconds(secs)) => {
            std::thread::sleep(Duration::from_secs(*secs));
            Ok(false)
        }
        ResolvedActionKind::Pause(PauseDuration::Forever) => {
            fp.flush()?;
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
        ResolvedActionKind::Inject(source) => {
            let total = source.len();
            let mut pos = 0;
            while pos < total {
                let end = (pos + block_size).min(total);
                let chunk = source.slice(pos, end);
                fp.write_all(&chunk)?;
                *sent += chunk.len() as u64;
                pos = end;
            }
            Ok(false)
        }
    }
}

/// Render a message to a sink: resolve it, bind symbolic action offsets
/// against the rendered length, and stream the bytes.
///
/// Value content is resolved before symbolic offsets are drawn, so random
/// and after offsets always see the final length.
pub fn serve<M: Message, W: Write>(
    msg: &M,
    fp: &mut W,
    settings: &Settings,
) -> Result<WriteSummary, RenderError> {
    let resolved = msg.resolve(settings)?;
    let values = resolved.values(settings)?;
    let total: u64 = values.iter().map(|v| v.len()).sum();

    let mut rng = settings.rng();
    let mut actions = Vec::new();
    for action in resolved.actions() {
        actions.push(action.resolve(settings, total, &mut rng)?);
    }
    actions.sort_by_key(|a| a.offset);

    Ok(write_values(fp, &values, actions, BLOCKSIZE)?)
}
