#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Queue-backed host transport and console line assembly.
//!
//! The USB task owns the wire; the logger task sees it as a
//! [`HostTransport`]: received bytes are assembled into bounded lines and
//! published on [`LineQueue`], outgoing payloads are queued on [`TxQueue`]
//! and drained into USB packets. Acceptance of a write is bounded by the
//! non-blocking enqueue; a saturated queue surfaces as a dropped payload
//! rather than a stalled loop iteration.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use heapless::Vec;

use logger_core::devices::{CommandLine, HostTransport, MAX_LINE_LEN, MAX_REPLY_LEN, TransportError};

use crate::status;

/// Pending command lines awaiting the logger task.
pub const LINE_QUEUE_DEPTH: usize = 4;

/// Outgoing payloads awaiting the USB task.
pub const TX_QUEUE_DEPTH: usize = 8;

/// One outgoing payload (reply or sample line).
pub type TxFrame = Vec<u8, MAX_REPLY_LEN>;

/// Queue of assembled command lines.
pub type LineQueue = Channel<CriticalSectionRawMutex, CommandLine, LINE_QUEUE_DEPTH>;

/// Queue of outgoing payloads.
pub type TxQueue = Channel<CriticalSectionRawMutex, TxFrame, TX_QUEUE_DEPTH>;

/// Receiver half of [`LineQueue`].
pub type LineReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, CommandLine, LINE_QUEUE_DEPTH>;

/// Sender half of [`LineQueue`].
pub type LineSender<'a> = Sender<'a, CriticalSectionRawMutex, CommandLine, LINE_QUEUE_DEPTH>;

/// Receiver half of [`TxQueue`].
pub type TxReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, TxFrame, TX_QUEUE_DEPTH>;

/// Sender half of [`TxQueue`].
pub type TxSender<'a> = Sender<'a, CriticalSectionRawMutex, TxFrame, TX_QUEUE_DEPTH>;

/// Assembles console bytes into bounded command lines.
///
/// CR or LF terminates a line, backspace and delete edit it, and anything
/// overflowing [`MAX_LINE_LEN`] discards the line up to its terminator.
#[derive(Default)]
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl LineAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feeds one byte; returns a complete line when a terminator arrives.
    pub fn push(&mut self, byte: u8) -> Option<CommandLine> {
        match byte {
            b'\r' | b'\n' => {
                let overflowed = self.overflowed;
                self.overflowed = false;

                let mut line = CommandLine::new();
                for &byte in self.buffer.iter() {
                    let _ = line.push(byte as char);
                }
                self.buffer.clear();

                if overflowed || line.is_empty() {
                    None
                } else {
                    Some(line)
                }
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                None
            }
            value if value.is_ascii() && !value.is_ascii_control() => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                None
            }
            _ => None,
        }
    }
}

/// [`HostTransport`] seen by the attached-mode loop.
pub struct UsbTransport<'a> {
    lines: LineReceiver<'a>,
    tx: TxSender<'a>,
}

impl<'a> UsbTransport<'a> {
    /// Wires the transport to the shared queues.
    #[must_use]
    pub fn new(lines: LineReceiver<'a>, tx: TxSender<'a>) -> Self {
        Self { lines, tx }
    }
}

impl HostTransport for UsbTransport<'_> {
    fn service(&mut self) {
        // The USB device is serviced by its own task.
    }

    fn bus_present(&self) -> bool {
        status::bus_present()
    }

    fn is_configured(&self) -> bool {
        status::port_configured()
    }

    fn is_suspended(&self) -> bool {
        status::port_suspended()
    }

    fn poll_line(&mut self) -> Option<CommandLine> {
        self.lines.try_receive().ok()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !status::port_configured() {
            return Err(TransportError::Disconnected);
        }

        for chunk in bytes.chunks(MAX_REPLY_LEN) {
            let mut frame = TxFrame::new();
            // Chunking guarantees the frame capacity holds the slice.
            let _ = frame.extend_from_slice(chunk);
            match self.tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => return Err(TransportError::Busy),
            }
        }
        Ok(())
    }

    fn detach(&mut self) {
        status::request_detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut LineAssembler, input: &[u8]) -> Option<CommandLine> {
        let mut line = None;
        for &byte in input {
            if let Some(complete) = assembler.push(byte) {
                line = Some(complete);
            }
        }
        line
    }

    #[test]
    fn assembles_cr_and_lf_terminated_lines() {
        let mut assembler = LineAssembler::new();
        let line = feed(&mut assembler, b"stream on\r").expect("line expected");
        assert_eq!(line.as_str(), "stream on");

        let line = feed(&mut assembler, b"rate 200\n").expect("line expected");
        assert_eq!(line.as_str(), "rate 200");
    }

    #[test]
    fn backspace_edits_the_pending_line() {
        let mut assembler = LineAssembler::new();
        let line = feed(&mut assembler, b"ratf\x08e 50\r").expect("line expected");
        assert_eq!(line.as_str(), "rate 50");
    }

    #[test]
    fn blank_lines_are_swallowed() {
        let mut assembler = LineAssembler::new();
        assert!(feed(&mut assembler, b"\r\n\r\n").is_none());
    }

    #[test]
    fn overflowing_input_discards_the_whole_line() {
        let mut assembler = LineAssembler::new();
        for _ in 0..(MAX_LINE_LEN + 16) {
            assert!(assembler.push(b'a').is_none());
        }
        assert!(assembler.push(b'\r').is_none());

        // The next line assembles cleanly.
        let line = feed(&mut assembler, b"status\r").expect("line expected");
        assert_eq!(line.as_str(), "status");
    }
}
