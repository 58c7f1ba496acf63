//! Frame codec for the telnet line protocol.
//!
//! Inbound bytes are scanned for the first `~` or `#` marker followed by
//! `OUTPUT` or `DEVICE`, fields, and CRLF, anywhere in the buffer. Bytes
//! before a match are discarded, which recovers from garbled or partial
//! leading data. Unmatched bytes are capped at `max_backlog` so a noisy
//! line cannot grow the buffer without bound.

use std::sync::LazyLock;

use bytes::{Buf, BytesMut};
use regex::bytes::Regex;
use tokio_util::codec::Decoder;

use homewire_domain::command::Command;
use homewire_domain::error::HubError;

use crate::error::TelnetError;

static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[~#](?:OUTPUT|DEVICE),[^\r\n]*\r\n").expect("frame pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Output,
    Device,
}

/// One complete inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `'~'` for device reports, `'#'` for echoed commands.
    pub marker: char,
    pub verb: Verb,
    /// Comma-separated fields after the verb.
    pub fields: Vec<String>,
    /// The frame as received, CRLF stripped.
    pub raw: String,
}

impl Frame {
    fn from_match(bytes: &[u8]) -> Option<Self> {
        let raw = String::from_utf8_lossy(bytes)
            .trim_end_matches("\r\n")
            .to_string();
        let marker = raw.chars().next()?;
        let mut parts = raw[1..].split(',');
        let verb = match parts.next()? {
            "OUTPUT" => Verb::Output,
            "DEVICE" => Verb::Device,
            _ => return None,
        };
        let fields = parts.map(str::to_string).collect();
        Some(Self {
            marker,
            verb,
            fields,
            raw,
        })
    }
}

/// Smallest backlog the codec accepts; anything less could cut a frame
/// that arrives split across reads.
pub const MIN_BACKLOG_BYTES: usize = 64;

/// [`Decoder`] yielding [`Frame`]s from an unbounded byte stream.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_backlog: usize,
}

impl FrameCodec {
    /// `max_backlog` is raised to [`MIN_BACKLOG_BYTES`] when lower.
    #[must_use]
    pub fn new(max_backlog: usize) -> Self {
        Self {
            max_backlog: max_backlog.max(MIN_BACKLOG_BYTES),
        }
    }

    fn trim_backlog(&self, src: &mut BytesMut) {
        if src.len() <= self.max_backlog {
            return;
        }
        // keep a possibly incomplete frame starting at the last marker
        let keep_from = src
            .iter()
            .rposition(|byte| matches!(byte, b'~' | b'#'))
            .filter(|pos| src.len() - pos <= self.max_backlog)
            .unwrap_or(src.len());
        tracing::trace!(discarded = keep_from, "trimming frame backlog");
        src.advance(keep_from);
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TelnetError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, TelnetError> {
        loop {
            let Some(found) = FRAME.find(src) else {
                self.trim_backlog(src);
                return Ok(None);
            };
            let (start, end) = (found.start(), found.end());
            if start > 0 {
                tracing::trace!(discarded = start, "skipping bytes before frame");
            }
            let chunk = src.split_to(end);
            if let Some(frame) = Frame::from_match(&chunk[start..]) {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, TelnetError> {
        let frame = self.decode(src)?;
        if frame.is_none() {
            src.clear();
        }
        Ok(frame)
    }
}

/// Wire frame for an outbound command.
///
/// # Errors
///
/// Returns [`HubError::UnsupportedCommand`] for commands with no telnet
/// form (scenes are expanded before they reach an adapter).
pub fn encode(command: &Command) -> Result<String, HubError> {
    match command {
        Command::ZoneSetLevel {
            zone_local_id,
            level,
            ..
        } => Ok(format!("#OUTPUT,{zone_local_id},1,{level:.2}\r\n")),
        Command::ButtonPress {
            button_local_id,
            device_local_id,
            ..
        } => Ok(format!("#DEVICE,{device_local_id},{button_local_id},3\r\n")),
        Command::ButtonRelease {
            button_local_id,
            device_local_id,
            ..
        } => Ok(format!("#DEVICE,{device_local_id},{button_local_id},4\r\n")),
        Command::SceneSet { .. } => Err(HubError::UnsupportedCommand {
            family: "telnet",
            command: command.kind(),
        }),
    }
}

/// Query asking the device to report a zone level.
#[must_use]
pub fn encode_level_query(zone_local_id: &str) -> String {
    format!("?OUTPUT,{zone_local_id},1\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame.raw);
        }
        frames
    }

    #[test]
    fn should_decode_frame_split_across_reads() {
        let mut codec = FrameCodec::new(4096);
        let mut buf = BytesMut::from(&b"~OUTPUT,12,1,"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"75.00\r\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(frame.marker, '~');
        assert_eq!(frame.verb, Verb::Output);
        assert_eq!(frame.fields, vec!["12", "1", "75.00"]);
        assert_eq!(frame.raw, "~OUTPUT,12,1,75.00");
        assert!(buf.is_empty());
    }

    #[test]
    fn should_skip_garbage_before_frame() {
        let mut codec = FrameCodec::new(4096);
        let mut buf = BytesMut::from(&b"GNET> \x00~DEV~DEVICE,1,2,3\r\nQNET> #OUTPUT,5,1,0.00\r\n"[..]);

        let frames = decode_all(&mut codec, &mut buf);

        assert_eq!(frames, vec!["~DEVICE,1,2,3", "#OUTPUT,5,1,0.00"]);
    }

    #[test]
    fn should_keep_split_frame_with_zero_backlog() {
        let mut codec = FrameCodec::new(0);
        let mut buf = BytesMut::from(&b"~OUTPUT,12,1,"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"75.00\r\n");

        assert_eq!(decode_all(&mut codec, &mut buf), vec!["~OUTPUT,12,1,75.00"]);
    }

    #[test]
    fn should_ignore_other_verbs() {
        let mut codec = FrameCodec::new(4096);
        let mut buf = BytesMut::from(&b"~ERROR,6\r\n~SYSTEM,1,2\r\n~DEVICE,1,2,4\r\n"[..]);

        assert_eq!(decode_all(&mut codec, &mut buf), vec!["~DEVICE,1,2,4"]);
    }

    #[test]
    fn should_bound_backlog_when_no_frame_matches() {
        let mut codec = FrameCodec::new(MIN_BACKLOG_BYTES);
        let mut buf = BytesMut::from(&[b'x'; 100][..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn should_keep_partial_frame_when_trimming_backlog() {
        let mut codec = FrameCodec::new(MIN_BACKLOG_BYTES);
        let mut buf = BytesMut::from(&[b'x'; 80][..]);
        buf.extend_from_slice(b"~OUTPUT,1");

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"~OUTPUT,1");

        buf.extend_from_slice(b",1,50.00\r\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["~OUTPUT,1,1,50.00"]);
    }

    #[test]
    fn should_encode_level_with_two_decimals() {
        let cmd = Command::ZoneSetLevel {
            zone_id: "hall".into(),
            zone_local_id: "12".to_string(),
            level: 0.75,
        };
        assert_eq!(encode(&cmd).unwrap(), "#OUTPUT,12,1,0.75\r\n");
    }

    #[test]
    fn should_encode_press_and_release() {
        let press = Command::ButtonPress {
            button_id: "b".into(),
            button_local_id: "2".to_string(),
            device_local_id: "1".to_string(),
        };
        assert_eq!(encode(&press).unwrap(), "#DEVICE,1,2,3\r\n");

        let release = Command::ButtonRelease {
            button_id: "b".into(),
            button_local_id: "2".to_string(),
            device_local_id: "1".to_string(),
        };
        assert_eq!(encode(&release).unwrap(), "#DEVICE,1,2,4\r\n");
    }

    #[test]
    fn should_reject_scene_command() {
        let err = encode(&Command::scene_set("night")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported command type");
    }

    #[test]
    fn should_encode_level_query() {
        assert_eq!(encode_level_query("7"), "?OUTPUT,7,1\r\n");
    }
}
