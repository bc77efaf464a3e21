//! Incremental `text/event-stream` parser.

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the stream did not name it.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Accumulates raw chunks and yields complete events.
///
/// Chunks may split lines, and lines may split multi-byte characters; bytes
/// are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: put\ndata: {\"path\":\"/\",\"data\":null}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "put".to_string(),
                data: "{\"path\":\"/\",\"data\":null}".to_string(),
            }]
        );
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: pa").is_empty());
        assert!(parser.feed(b"tch\r\ndata: {}\r\n").is_empty());
        let events = parser.feed(b"\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "patch");
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn test_multibyte_split() {
        let mut parser = SseParser::new();
        let payload = "event: put\ndata: \"Café\"\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xC3).unwrap_or(0) + 1;
        assert!(parser.feed(&payload[..split]).is_empty());
        let events = parser.feed(&payload[split..]);
        assert_eq!(events[0].data, "\"Café\"");
    }

    #[test]
    fn test_keep_alive_and_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": ping\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "keep-alive");
        assert_eq!(events[0].data, "null");
    }

    #[test]
    fn test_multiple_data_lines() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: a\ndata: b\n\n");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "a\nb");
    }
}
