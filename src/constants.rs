// MIT License - Copyright (c) 2021 TJForc

/// Line terminator appended to every outbound command.
pub const DELIMITER: &str = "\r\n";

/// Default AMCP TCP port of a CasparCG server.
pub const DEFAULT_PORT: u16 = 5250;

/// Host used when an empty hostname is configured.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;

/// Capacity of the broadcast channels carrying events to subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Maximum number of payloads waiting in a connection's write queue.
pub const WRITE_QUEUE_CAPACITY: usize = 256;

/// Size of the socket read buffer.
pub const READ_BUFFER_SIZE: usize = 4096;

/// `yyyyMMddHHmmss`, used by CLS and TLS for the last-modified column.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Timecode reported for clips with no frame count or frame rate.
pub const ZERO_TIMECODE: &str = "00:00:00:00";

/// Version string held before the server has answered `VERSION`.
pub const UNKNOWN_VERSION: &str = "unknown";

/// AMCP status codes that change how a frame is read.
pub mod status {
    /// Success, payload is a block terminated by an empty line.
    pub const OK_MULTILINE: u16 = 200;
    /// Success, payload is exactly one line.
    pub const OK_SINGLE_LINE: u16 = 201;
    /// Command not understood; the server echoes the offending line.
    pub const UNDEFINED_ERROR: u16 = 400;
    /// Referenced media, template or data entry does not exist.
    pub const FILE_NOT_FOUND: u16 = 404;
}

/// Words that close an AMCP status line (`200 CLS OK`, `404 LOAD FILE NOT FOUND`).
pub const STATUS_PHRASE_WORDS: [&str; 3] = ["OK", "ERROR", "FAILED"];
