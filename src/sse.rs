//! Frame decoder for the chat backend's event stream.
//!
//! The wire format is UTF-8 text shaped like Server-Sent Events:
//! - frames are separated by a blank line (`\n\n`)
//! - lines with the literal prefix `data: ` carry payload
//! - multiple `data: ` lines in one frame are concatenated into one payload
//! - payload `[DONE]` signals normal completion
//! - payload `[ERROR]...` signals a backend failure, the rest is the detail
//! - frames with no `data: ` line (comments, keep-alives) are ignored
//!
//! The transport may split frames, lines, or even multi-byte characters
//! across chunk boundaries, so the decoder buffers raw bytes and only
//! converts a frame to text once its terminating blank line has arrived.

/// One decoded frame of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Assistant-generated text for one frame.
    Fragment(String),
    /// The `[DONE]` sentinel: the stream is complete.
    Done,
    /// The `[ERROR]` sentinel, carrying the server-supplied detail.
    Error(String),
}

impl Frame {
    /// Terminal frames end the stream; nothing after them is decoded.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Fragment(_))
    }
}

/// Stateful decoder that accumulates chunks and emits complete frames.
///
/// Feeding the same stream as one chunk or byte-by-byte yields the same
/// frame sequence.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a terminal frame has been decoded; further input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a chunk of raw bytes, returning the frames it completed.
    ///
    /// Stops at the first terminal frame: anything still buffered behind a
    /// `[DONE]` or `[ERROR]` is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.finished {
            return frames;
        }
        self.buf.extend_from_slice(chunk);

        while let Some(pos) = find_frame_boundary(&self.buf) {
            let block: Vec<u8> = self.buf.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&block[..pos]);
            if let Some(frame) = parse_frame(&text) {
                let terminal = frame.is_terminal();
                frames.push(frame);
                if terminal {
                    self.finished = true;
                    self.buf.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Flush a trailing frame left in the buffer when the transport closes
    /// without a final blank line.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        self.finished = true;
        if self.buf.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buf);
        parse_frame(&String::from_utf8_lossy(&tail))
    }
}

fn find_frame_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Parse one blank-line-delimited block into a frame.
///
/// Returns `None` for blocks without any `data: ` line.
pub fn parse_frame(block: &str) -> Option<Frame> {
    let mut payload = String::new();
    let mut has_data = false;

    for line in block.split('\n') {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data: ") {
            has_data = true;
            payload.push_str(rest);
        }
    }

    if !has_data {
        return None;
    }
    if payload == "[DONE]" {
        return Some(Frame::Done);
    }
    if let Some(rest) = payload.strip_prefix("[ERROR]") {
        // Marker followed by its separator: either ": " or a single space.
        let detail = rest.strip_prefix(':').unwrap_or(rest).trim_start();
        return Some(Frame::Error(detail.to_string()));
    }
    Some(Frame::Fragment(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments_of(frames: &[Frame]) -> Vec<&str> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Fragment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: hello\n\n");
        assert_eq!(frames, vec![Frame::Fragment("hello".to_string())]);
    }

    #[test]
    fn test_multiple_data_lines_concatenate() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: Hel\ndata: lo\n\n");
        assert_eq!(frames, vec![Frame::Fragment("Hello".to_string())]);
    }

    #[test]
    fn test_done_emits_no_fragment() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: hi\n\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![Frame::Fragment("hi".to_string()), Frame::Done]
        );
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_error_detail_with_colon_separator() {
        assert_eq!(
            parse_frame("data: [ERROR]: overloaded"),
            Some(Frame::Error("overloaded".to_string()))
        );
    }

    #[test]
    fn test_error_detail_with_space_separator() {
        assert_eq!(
            parse_frame("data: [ERROR] upstream timed out"),
            Some(Frame::Error("upstream timed out".to_string()))
        );
    }

    #[test]
    fn test_bare_error_marker() {
        assert_eq!(
            parse_frame("data: [ERROR]"),
            Some(Frame::Error(String::new()))
        );
    }

    #[test]
    fn test_frame_without_data_line_is_ignored() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b": keep-alive\n\nevent: ping\n\ndata: ok\n\n");
        assert_eq!(frames, vec![Frame::Fragment("ok".to_string())]);
    }

    #[test]
    fn test_crlf_line_endings_in_data_lines() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: one\r\ndata: two\n\n");
        assert_eq!(frames, vec![Frame::Fragment("onetwo".to_string())]);
    }

    #[test]
    fn test_frames_after_done_are_discarded() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: [DONE]\n\ndata: late\n\n");
        assert_eq!(frames, vec![Frame::Done]);
        assert!(decoder.feed(b"data: later\n\n").is_empty());
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_frames_after_error_are_discarded() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: [ERROR] boom\n\ndata: late\n\n");
        assert_eq!(frames, vec![Frame::Error("boom".to_string())]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let raw = b"data: Hel\ndata: lo\n\ndata: world\n\n: ping\n\ndata: [DONE]\n\n";

        let mut whole = FrameDecoder::new();
        let whole_frames = whole.feed(raw);

        let mut split = FrameDecoder::new();
        let mut split_frames = Vec::new();
        for byte in raw.iter() {
            split_frames.extend(split.feed(std::slice::from_ref(byte)));
        }

        assert_eq!(whole_frames, split_frames);
        assert_eq!(fragments_of(&whole_frames), vec!["Hello", "world"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let raw = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let split_at = raw.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.feed(&raw[..split_at]);
        assert!(frames.is_empty());
        frames.extend(decoder.feed(&raw[split_at..]));
        assert_eq!(frames, vec![Frame::Fragment("héllo".to_string())]);
    }

    #[test]
    fn test_finish_flushes_trailing_frame() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: tail\n").is_empty());
        assert_eq!(decoder.finish(), Some(Frame::Fragment("tail".to_string())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_finish_on_empty_buffer() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.finish(), None);
    }
}
