// MIT License

//! LIP wire format.
//!
//! The Smart Bridge speaks a line-oriented telnet protocol. Every line is
//! CRLF-terminated and the first byte selects the direction:
//!
//! - `#MODE,INTEGRATION,ACTION,VALUE[,EXTRA]*`: execute a command
//! - `?MODE,INTEGRATION,ACTION`: query current state
//! - `~MODE,INTEGRATION,ACTION,VALUE`: unsolicited event from the bridge
//!
//! The handshake prompts (`login: `, `password: `, `GNET> `) are raw
//! literals with no line terminator of their own.

/// Output-level events and commands (dimmers, switches).
pub const OUTPUT: &str = "OUTPUT";

/// Device events (remote/keypad button presses).
pub const DEVICE: &str = "DEVICE";

/// System-level queries.
pub const SYSTEM: &str = "SYSTEM";

/// Handshake prompts, scanned as raw literals within the read buffer.
pub const LOGIN_PROMPT: &[u8] = b"login: ";
pub const PASSWORD_PROMPT: &[u8] = b"password: ";
pub const READY_PROMPT: &[u8] = b"GNET> ";

/// Fixed keepalive line; the bridge answers with its ~SYSTEM date/time line.
pub const KEEPALIVE_QUERY: &str = "?SYSTEM,10\r\n";

/// Named action codes for `OUTPUT` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Set (command) or report (event/query) the output level.
    Set = 1,
}

impl From<Action> for u32 {
    fn from(action: Action) -> u32 {
        action as u32
    }
}

/// Button transition codes carried in the value field of `DEVICE` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Down = 3,
    Up = 4,
}

impl From<Button> for u32 {
    fn from(button: Button) -> u32 {
        button as u32
    }
}

impl Button {
    /// Interpret a `DEVICE` event's value field as a button transition.
    pub fn from_value(value: f64) -> Option<Self> {
        match value as u32 {
            3 => Some(Self::Down),
            4 => Some(Self::Up),
            _ => None,
        }
    }
}

/// Format an outbound command line.
///
/// `None` extras are skipped entirely; `Some` extras are appended in call
/// order, each as `,{extra}`. The value keeps its decimal point on the wire
/// (`75.0`, never `75`), matching what the bridge itself emits.
pub fn format_command(
    mode: &str,
    integration_id: u32,
    action: u32,
    value: f64,
    extras: &[Option<String>],
) -> String {
    let mut line = format!("#{},{},{},{:?}", mode, integration_id, action, value);
    for extra in extras.iter().flatten() {
        line.push(',');
        line.push_str(extra);
    }
    line.push_str("\r\n");
    line
}

/// Format an outbound query line.
pub fn format_query(mode: &str, integration_id: u32, action: u32) -> String {
    format!("?{},{},{}\r\n", mode, integration_id, action)
}
