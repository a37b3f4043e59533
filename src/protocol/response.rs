//! Response lines
//!
//! Client-side view of the command line that starts every outbound frame.

use crate::error::{Result, VizError};
use super::FrameKind;

/// A parsed `nv>...` line sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub kind: FrameKind,
    /// Everything before the trailing byte count (or the whole line)
    pub tag: String,
    /// Number of raw bytes that follow the line, if any
    pub byte_len: Option<usize>,
}

impl ResponseLine {
    /// Parse one line (with or without its trailing newline)
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let keyword = line.split_whitespace().next().unwrap_or("");

        let kind = match keyword {
            "nv>image" => FrameKind::Image,
            "nv>legend" => FrameKind::Legend,
            "nv>viserror" => FrameKind::Error,
            "nv>ok" => FrameKind::Ok,
            k if k.starts_with("nv>") => FrameKind::Data,
            _ => {
                return Err(VizError::Protocol(format!(
                    "unexpected response line \"{}\"",
                    line
                )))
            }
        };

        if !matches!(kind, FrameKind::Image | FrameKind::Legend | FrameKind::Error) {
            return Ok(Self {
                kind,
                tag: line.to_string(),
                byte_len: None,
            });
        }

        let (tag, count) = line
            .rsplit_once(' ')
            .ok_or_else(|| VizError::Protocol(format!("missing byte count in \"{}\"", line)))?;
        let byte_len = count
            .parse::<usize>()
            .map_err(|_| VizError::MalformedLength(count.to_string()))?;

        Ok(Self {
            kind,
            tag: tag.to_string(),
            byte_len: Some(byte_len),
        })
    }
}
