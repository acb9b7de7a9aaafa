/// Wire protocol constants for the streaming endpoint
pub mod protocol {
    /// Prefix every frame line starts with
    pub const FRAME_MARKER: &str = "data:";
    /// Payload of the terminal sentinel line (`data: [DONE]`)
    pub const DONE_SENTINEL: &str = "[DONE]";

    // JSON keys understood inside a frame payload
    pub const KEY_DELTA: &str = "delta";
    pub const KEY_SESSION_ID: &str = "session_id";
    pub const KEY_ERROR: &str = "error";
    pub const KEY_DONE: &str = "done";
    /// Older servers close the stream with `{"end": true}`
    pub const KEY_END: &str = "end";
}

/// REST paths on the assistant service
pub mod urls {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    pub const STREAM_PATH: &str = "/api/chat/stream";
    pub const CHAT_PATH: &str = "/api/chat";
    pub const VALIDATE_URL_PATH: &str = "/api/validate-url";
    pub const SESSIONS_PATH: &str = "/api/sessions";
    pub const NEW_SESSION_PATH: &str = "/api/session/new";
    pub const SESSION_PATH: &str = "/api/session";
    pub const HISTORY_PATH: &str = "/api/history";
}

/// Default values used when `streamchat.toml` leaves a field out
pub mod defaults {
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
    pub const FIRST_CHUNK_TIMEOUT_MS: u64 = 60_000;
    pub const CHUNK_TIMEOUT_MS: u64 = 30_000;
    pub const VERIFY_TIMEOUT_MS: u64 = 5_000;
    /// Extra time granted on top of the verification timeout before giving up
    pub const VERIFY_GRACE_MS: u64 = 1_000;
    pub const LOG_FILTER: &str = "info";
    pub const NEW_SESSION_TITLE: &str = "New Chat";
}

/// User-facing messages
pub mod messages {
    pub const TRANSPORT_FAILURE: &str = "Sorry, I encountered an error. Please try again.";
    pub const VERIFY_TIMEOUT: &str = "timeout";
    pub const VERIFY_INVALID_FORMAT: &str = "invalid format";
}

/// Configuration file locations
pub mod paths {
    pub const CONFIG_FILE_NAME: &str = "streamchat.toml";
    pub const CONFIG_DIR_NAME: &str = ".streamchat";
    pub const BASE_URL_ENV: &str = "STREAMCHAT_BASE_URL";
}
