// MIT License

/// A single decoded line from the bridge's event stream.
///
/// The bridge reports every state change as
/// `~MODE,INTEGRATION,ACTION,VALUE\r\n`: an output level change, a remote
/// button transition, or a system message. The meaning of `action` and
/// `value` depends on `mode`: for `OUTPUT` the action is
/// [`Action::Set`](crate::protocol::Action) and the value a level percentage,
/// for `DEVICE` the action is a button number and the value a
/// [`Button`](crate::protocol::Button) transition code.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    /// Protocol category (`OUTPUT`, `DEVICE`, ...). Free-form uppercase.
    pub mode: String,
    /// The bridge's identifier for the logical device.
    pub integration_id: u32,
    /// Mode-specific action code.
    pub action: u32,
    /// Payload: level percentage, button transition state, etc.
    pub value: f64,
}
