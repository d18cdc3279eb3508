//! Turning raw terminal transcripts into readable install logs.
//!
//! A transcript captured by `script(1)` contains every byte the terminal
//! received: colour codes, `\r` line rewrites from progress bars, and
//! backspaces from line editors. [`normalize`] reconstructs what a person
//! watching the terminal would have seen, one line at a time.
//!
//! The rules, applied to each `\n`-terminated line:
//!
//! 1. Carriage returns immediately before the newline are line endings, not
//!    rewrites (`"a\r\r\n"` is just `"a\n"`).
//! 2. Any other carriage return discards everything before it on that line.
//!    A trailing `\r` on the final, unterminated line empties it.
//! 3. CSI escape sequences (`ESC [ params intermediates final`) are dropped.
//! 4. A backspace erases the character before it, or nothing at the start of
//!    the line.
//!
//! CSI detection happens before backspaces are resolved, so a backspace can
//! never assemble a new escape sequence out of surrounding text.

pub mod recording;

pub use recording::{clean_log_file, record_self, RECORDING_ENV};

const ESC: char = '\x1b';
const BACKSPACE: char = '\x08';

/// Produce the visible text of a raw terminal transcript.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut segment: Vec<char> = Vec::new();
    let mut pending_cr = false;

    for ch in raw.chars() {
        match ch {
            '\n' => {
                render_segment(&segment, &mut out);
                out.push('\n');
                segment.clear();
                pending_cr = false;
            }
            '\r' => pending_cr = true,
            _ => {
                if pending_cr {
                    segment.clear();
                    pending_cr = false;
                }
                segment.push(ch);
            }
        }
    }

    if pending_cr {
        segment.clear();
    }
    render_segment(&segment, &mut out);
    out
}

/// Visible contents of a single line, editable at its end.
#[derive(Default)]
struct LineBuffer {
    chars: Vec<char>,
}

impl LineBuffer {
    fn put(&mut self, ch: char) {
        self.chars.push(ch);
    }

    fn erase(&mut self) {
        self.chars.pop();
    }
}

fn render_segment(segment: &[char], out: &mut String) {
    let mut line = LineBuffer::default();
    let mut i = 0;

    while i < segment.len() {
        let ch = segment[i];
        if ch == ESC {
            if let Some(len) = csi_len(&segment[i..]) {
                i += len;
                continue;
            }
        }
        if ch == BACKSPACE {
            line.erase();
        } else {
            line.put(ch);
        }
        i += 1;
    }

    out.extend(line.chars);
}

/// Length of the CSI sequence starting at `seq[0]`, if one is there.
///
/// Parameter bytes (0x30-0x3F), then intermediate bytes (0x20-0x2F), then a
/// single final byte (0x40-0x7E). The classes are disjoint, so a greedy scan
/// is exact.
fn csi_len(seq: &[char]) -> Option<usize> {
    if seq.len() < 3 || seq[0] != ESC || seq[1] != '[' {
        return None;
    }
    let mut i = 2;
    while i < seq.len() && ('\x30'..='\x3f').contains(&seq[i]) {
        i += 1;
    }
    while i < seq.len() && ('\x20'..='\x2f').contains(&seq[i]) {
        i += 1;
    }
    match seq.get(i) {
        Some(c) if ('\x40'..='\x7e').contains(c) => Some(i + 1),
        _ => None,
    }
}
