//! Wire text of the line protocol
//!
//! Everything the server writes is plain text; prompts carry no trailing
//! newline so the peer types on the same line.

use crate::error::{AdmissionError, LineError};
use crate::types::DisplayName;

/// Sent once on connect, before the first name prompt
pub const WELCOME_BANNER: &str = r#"Welcome to TCP-Chat!
         _nnnn_
        dGGGGMMb
       @p~qp~~qMb
       M|@||@) M|
       @,----.JM|
      JS^\__/  qKL
     dZP        qKRb
    dZP          qKKb
   fZP            SMMb
   HZM            MMMM
   FqM            MMMM
 __| ".        |\dS"qML
 |    '.       | '' \Zq
_)      \.___.,|     .'
\____   )MMMMMP|   .'
     '-'       '--'
"#;

/// Name prompt, repeated after every rejected name
pub const NAME_PROMPT: &str = "[ENTER YOUR NAME]: ";

/// Rejection notice for a name with bad bytes
pub const INVALID_NAME_NOTICE: &str = "[NAME MUST CONTAIN ONLY PRINTABLE ASCII CHARACTERS]\n";

/// Rejection notice for a name held by a live session
pub const NAME_TAKEN_NOTICE: &str = "[NAME ALREADY TAKEN]\n";

/// Final notice before closing a connection over capacity
pub const SERVER_FULL_NOTICE: &str = "Server full. Try again later.\n";

/// Rejection notice for a chat line with bad bytes, sent to the author only
pub const INVALID_MESSAGE_NOTICE: &str =
    "[MESSAGE MUST CONTAIN ONLY PRINTABLE ASCII CHARACTERS]\n";

/// System announcement for a newly admitted session
pub fn join_announcement(name: &DisplayName) -> String {
    format!("{} has joined the chat...", name)
}

/// System announcement for a departed session
pub fn leave_announcement(name: &DisplayName) -> String {
    format!("{} has left the chat...", name)
}

/// `[timestamp][name]: text`, the form stored in history
pub fn format_chat(timestamp: &str, name: &DisplayName, text: &str) -> String {
    format!("[{}][{}]: {}", timestamp, name, text)
}

/// Input prompt shown to a session between messages
pub fn input_prompt(timestamp: &str, name: &DisplayName) -> String {
    format!("[{}][{}]:", timestamp, name)
}

/// Text a refused admission produces
///
/// A taken name gets the notice plus a fresh prompt; capacity is final.
pub fn admission_reply(err: &AdmissionError) -> String {
    match err {
        AdmissionError::NameTaken(_) => format!("{}{}", NAME_TAKEN_NOTICE, NAME_PROMPT),
        AdmissionError::CapacityExceeded { .. } => SERVER_FULL_NOTICE.to_string(),
    }
}

/// Text sent back for an invalid line, depending on the phase
pub fn invalid_line_reply(err: &LineError, naming: bool) -> String {
    match (err, naming) {
        (LineError::InvalidCharacters, true) => {
            format!("{}{}", INVALID_NAME_NOTICE, NAME_PROMPT)
        }
        (LineError::InvalidCharacters, false) => INVALID_MESSAGE_NOTICE.to_string(),
    }
}
