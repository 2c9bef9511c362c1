//! Server configuration
//!
//! Admission and buffering limits shared by every connection.

/// Default maximum number of concurrently admitted sessions
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Default capacity of each session's outbound queue, in chunks
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default longest accepted inbound line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Admission ceiling; connections beyond it are refused after naming
    pub max_clients: usize,
    /// Chunks a slow peer may lag behind before fan-out drops lines for it
    pub outbound_buffer: usize,
    /// Lines longer than this end the connection
    pub max_line_length: usize,
    /// Send `[timestamp][name]:` to a session while it is idle
    pub message_prompt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            message_prompt: true,
        }
    }
}

impl Config {
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        // mpsc::channel panics on zero capacity
        self.outbound_buffer = outbound_buffer.max(1);
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        // a zero limit would reject every line, including the name
        self.max_line_length = max_line_length.max(1);
        self
    }

    pub fn with_message_prompt(mut self, message_prompt: bool) -> Self {
        self.message_prompt = message_prompt;
        self
    }
}
