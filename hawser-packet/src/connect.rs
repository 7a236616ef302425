//! Messages involved in the SSH's **connect** (`SSH-CONNECT`) part of the protocol,
//! as defined in the [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254).

use binrw::binrw;

use crate::arch;

/// The extended-data stream code for `stderr`,
/// `SSH_EXTENDED_DATA_STDERR`.
pub const EXTENDED_DATA_STDERR: u32 = 1;

/// The `SSH_MSG_GLOBAL_REQUEST` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 80_u8)]
pub struct GlobalRequest {
    #[bw(calc = arch::Ascii::new(context.as_str()))]
    kind: arch::Ascii,

    /// Whether the sender wants a reply.
    pub want_reply: arch::Bool,

    /// The context of the global request.
    #[br(args(&kind))]
    pub context: GlobalRequestContext,
}

/// The `context` in the `SSH_MSG_GLOBAL_REQUEST` message.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big)]
#[br(import(kind: &arch::Ascii))]
pub enum GlobalRequestContext {
    /// A request of type `tcpip-forward`,
    /// as defined in [RFC4254 section 7.1](https://datatracker.ietf.org/doc/html/rfc4254#section-7.1).
    #[br(pre_assert(kind.as_str() == GlobalRequestContext::TCPIP_FORWARD))]
    TcpipForward {
        /// Address to bind the listener on.
        bind_address: arch::Utf8,

        /// Port to bind the listener on, `0` lets the server choose.
        bind_port: u32,
    },

    /// A request of type `cancel-tcpip-forward`,
    /// as defined in [RFC4254 section 7.1](https://datatracker.ietf.org/doc/html/rfc4254#section-7.1).
    #[br(pre_assert(kind.as_str() == GlobalRequestContext::CANCEL_TCPIP_FORWARD))]
    CancelTcpipForward {
        /// Address of the listener to cancel.
        bind_address: arch::Utf8,

        /// Port of the listener to cancel.
        bind_port: u32,
    },
}

impl GlobalRequestContext {
    const TCPIP_FORWARD: &'static str = "tcpip-forward";
    const CANCEL_TCPIP_FORWARD: &'static str = "cancel-tcpip-forward";

    /// Get the [`GlobalRequestContext`]'s SSH identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TcpipForward { .. } => Self::TCPIP_FORWARD,
            Self::CancelTcpipForward { .. } => Self::CANCEL_TCPIP_FORWARD,
        }
    }
}

/// The `SSH_MSG_REQUEST_SUCCESS` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 81_u8)]
pub struct RequestSuccess;

/// The `SSH_MSG_REQUEST_SUCCESS` answer to a `tcpip-forward` request
/// that let the server choose the port.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-7.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 81_u8)]
pub struct ForwardingSuccess {
    /// The port the server bound the listener on.
    pub bound_port: u32,
}

/// The `SSH_MSG_REQUEST_FAILURE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 82_u8)]
pub struct RequestFailure;

/// The `SSH_MSG_CHANNEL_OPEN` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 90_u8)]
pub struct ChannelOpen {
    #[bw(calc = arch::Ascii::new(context.as_str()))]
    kind: arch::Ascii,

    /// Sender's channel id.
    pub sender_channel: u32,

    /// Initial window size, in bytes.
    pub initial_window_size: u32,

    /// Maximum packet size, in bytes.
    pub maximum_packet_size: u32,

    /// The context of the open request.
    #[br(args(&kind))]
    pub context: ChannelOpenContext,
}

/// The `context` in the `SSH_MSG_CHANNEL_OPEN` message.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big)]
#[br(import(kind: &arch::Ascii))]
pub enum ChannelOpenContext {
    /// A channel of type `session`,
    /// as defined in [RFC4254 section 6.1](https://datatracker.ietf.org/doc/html/rfc4254#section-6.1).
    #[br(pre_assert(kind.as_str() == ChannelOpenContext::SESSION))]
    Session,

    /// A channel of type `direct-tcpip`,
    /// as defined in [RFC4254 section 7.2](https://datatracker.ietf.org/doc/html/rfc4254#section-7.2).
    #[br(pre_assert(kind.as_str() == ChannelOpenContext::DIRECT_TCPIP))]
    DirectTcpip {
        /// Host the recipient should connect to.
        address: arch::Utf8,

        /// Port the recipient should connect to.
        port: u32,

        /// Address of the machine that originated the connection.
        originator_address: arch::Utf8,

        /// Port of the machine that originated the connection.
        originator_port: u32,
    },

    /// A channel of type `forwarded-tcpip`,
    /// as defined in [RFC4254 section 7.2](https://datatracker.ietf.org/doc/html/rfc4254#section-7.2).
    #[br(pre_assert(kind.as_str() == ChannelOpenContext::FORWARDED_TCPIP))]
    ForwardedTcpip {
        /// Address the connection was accepted on.
        address: arch::Utf8,

        /// Port the connection was accepted on.
        port: u32,

        /// Address of the machine that originated the connection.
        originator_address: arch::Utf8,

        /// Port of the machine that originated the connection.
        originator_port: u32,
    },

    /// A channel of type `x11`,
    /// as defined in [RFC4254 section 6.3.2](https://datatracker.ietf.org/doc/html/rfc4254#section-6.3.2).
    #[br(pre_assert(kind.as_str() == ChannelOpenContext::X11))]
    X11 {
        /// Address of the machine that originated the connection.
        originator_address: arch::Utf8,

        /// Port of the machine that originated the connection.
        originator_port: u32,
    },
}

impl ChannelOpenContext {
    const SESSION: &'static str = "session";
    const DIRECT_TCPIP: &'static str = "direct-tcpip";
    const FORWARDED_TCPIP: &'static str = "forwarded-tcpip";
    const X11: &'static str = "x11";

    /// Get the [`ChannelOpenContext`]'s SSH identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => Self::SESSION,
            Self::DirectTcpip { .. } => Self::DIRECT_TCPIP,
            Self::ForwardedTcpip { .. } => Self::FORWARDED_TCPIP,
            Self::X11 { .. } => Self::X11,
        }
    }
}

/// The `SSH_MSG_CHANNEL_OPEN_CONFIRMATION` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 91_u8)]
pub struct ChannelOpenConfirmation {
    /// Recipient's channel id.
    pub recipient_channel: u32,

    /// Sender's channel id.
    pub sender_channel: u32,

    /// Initial window size, in bytes.
    pub initial_window_size: u32,

    /// Maximum packet size, in bytes.
    pub maximum_packet_size: u32,
}

/// The `SSH_MSG_CHANNEL_OPEN_FAILURE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 92_u8)]
pub struct ChannelOpenFailure {
    /// Recipient's channel id.
    pub recipient_channel: u32,

    /// Reason for the open failure.
    pub reason: ChannelOpenFailureReason,

    /// Human-readable description of the reason.
    pub description: arch::Utf8,

    /// Language tag.
    pub language: arch::Ascii,
}

/// The `reason` in the `SSH_MSG_CHANNEL_OPEN_FAILURE` message.
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
pub enum ChannelOpenFailureReason {
    /// `SSH_OPEN_ADMINISTRATIVELY_PROHIBITED`.
    #[brw(magic = 1_u32)]
    AdministrativelyProhibited,

    /// `SSH_OPEN_CONNECT_FAILED`.
    #[brw(magic = 2_u32)]
    ConnectFailed,

    /// `SSH_OPEN_UNKNOWN_CHANNEL_TYPE`.
    #[brw(magic = 3_u32)]
    UnknownChannelType,

    /// `SSH_OPEN_RESOURCE_SHORTAGE`.
    #[brw(magic = 4_u32)]
    ResourceShortage,

    /// Any other failure reason, may be non-standard.
    Other(u32),
}

/// The `SSH_MSG_CHANNEL_WINDOW_ADJUST` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.2>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 93_u8)]
pub struct ChannelWindowAdjust {
    /// Recipient's channel id.
    pub recipient_channel: u32,

    /// Bytes to add to the window.
    pub bytes_to_add: u32,
}

/// The `SSH_MSG_CHANNEL_DATA` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.2>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 94_u8)]
pub struct ChannelData {
    /// Recipient's channel id.
    pub recipient_channel: u32,

    /// Data bytes to transport.
    pub data: arch::Bytes,
}

/// The `SSH_MSG_CHANNEL_EXTENDED_DATA` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.2>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 95_u8)]
pub struct ChannelExtendedData {
    /// Recipient's channel id.
    pub recipient_channel: u32,

    /// The extended stream's code, [`EXTENDED_DATA_STDERR`] for `stderr`.
    pub data_type: u32,

    /// Data bytes to transport.
    pub data: arch::Bytes,
}

/// The `SSH_MSG_CHANNEL_EOF` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.3>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 96_u8)]
pub struct ChannelEof {
    /// Recipient's channel id.
    pub recipient_channel: u32,
}

/// The `SSH_MSG_CHANNEL_CLOSE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.3>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 97_u8)]
pub struct ChannelClose {
    /// Recipient's channel id.
    pub recipient_channel: u32,
}

/// The `SSH_MSG_CHANNEL_REQUEST` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 98_u8)]
pub struct ChannelRequest {
    /// Recipient's channel id.
    pub recipient_channel: u32,

    #[bw(calc = arch::Ascii::new(context.as_str()))]
    kind: arch::Ascii,

    /// Whether the sender wants a reply.
    pub want_reply: arch::Bool,

    /// The context of the channel request.
    #[br(args(&kind))]
    pub context: ChannelRequestContext,
}

/// The `context` in the `SSH_MSG_CHANNEL_REQUEST` message.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big)]
#[br(import(kind: &arch::Ascii))]
pub enum ChannelRequestContext {
    /// A request of type `pty-req`,
    /// as defined in [RFC4254 section 6.2](https://datatracker.ietf.org/doc/html/rfc4254#section-6.2).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::PTY))]
    Pty {
        /// The `TERM` environment variable value.
        term: arch::Utf8,

        /// Terminal width, in characters.
        width_chars: u32,

        /// Terminal height, in rows.
        height_chars: u32,

        /// Terminal width, in pixels.
        width_pixels: u32,

        /// Terminal height, in pixels.
        height_pixels: u32,

        /// Encoded terminal modes.
        modes: arch::Bytes,
    },

    /// A request of type `env`,
    /// as defined in [RFC4254 section 6.4](https://datatracker.ietf.org/doc/html/rfc4254#section-6.4).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::ENV))]
    Env {
        /// Name of the variable.
        name: arch::Utf8,

        /// Value of the variable.
        value: arch::Utf8,
    },

    /// A request of type `shell`,
    /// as defined in [RFC4254 section 6.5](https://datatracker.ietf.org/doc/html/rfc4254#section-6.5).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::SHELL))]
    Shell,

    /// A request of type `exec`,
    /// as defined in [RFC4254 section 6.5](https://datatracker.ietf.org/doc/html/rfc4254#section-6.5).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::EXEC))]
    Exec {
        /// The command line to execute.
        command: arch::Utf8,
    },

    /// A request of type `subsystem`,
    /// as defined in [RFC4254 section 6.5](https://datatracker.ietf.org/doc/html/rfc4254#section-6.5).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::SUBSYSTEM))]
    Subsystem {
        /// Name of the subsystem.
        name: arch::Utf8,
    },

    /// A request of type `window-change`,
    /// as defined in [RFC4254 section 6.7](https://datatracker.ietf.org/doc/html/rfc4254#section-6.7).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::WINDOW_CHANGE))]
    WindowChange {
        /// Terminal width, in characters.
        width_chars: u32,

        /// Terminal height, in rows.
        height_chars: u32,

        /// Terminal width, in pixels.
        width_pixels: u32,

        /// Terminal height, in pixels.
        height_pixels: u32,
    },

    /// A request of type `xon-xoff`,
    /// as defined in [RFC4254 section 6.8](https://datatracker.ietf.org/doc/html/rfc4254#section-6.8).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::XON_XOFF))]
    XonXoff {
        /// Whether the client is allowed to do flow control.
        client_can_do: arch::Bool,
    },

    /// A request of type `signal`,
    /// as defined in [RFC4254 section 6.9](https://datatracker.ietf.org/doc/html/rfc4254#section-6.9).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::SIGNAL))]
    Signal {
        /// Name of the signal, without the `SIG` prefix.
        name: arch::Ascii,
    },

    /// A request of type `exit-status`,
    /// as defined in [RFC4254 section 6.10](https://datatracker.ietf.org/doc/html/rfc4254#section-6.10).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::EXIT_STATUS))]
    ExitStatus {
        /// The command's exit code.
        code: u32,
    },

    /// A request of type `exit-signal`,
    /// as defined in [RFC4254 section 6.10](https://datatracker.ietf.org/doc/html/rfc4254#section-6.10).
    #[br(pre_assert(kind.as_str() == ChannelRequestContext::EXIT_SIGNAL))]
    ExitSignal {
        /// Name of the signal, without the `SIG` prefix.
        name: arch::Ascii,

        /// Whether the command produced a core dump.
        core_dumped: arch::Bool,

        /// Human-readable error message.
        error_message: arch::Utf8,

        /// Language tag.
        language: arch::Ascii,
    },
}

impl ChannelRequestContext {
    const PTY: &'static str = "pty-req";
    const ENV: &'static str = "env";
    const SHELL: &'static str = "shell";
    const EXEC: &'static str = "exec";
    const SUBSYSTEM: &'static str = "subsystem";
    const WINDOW_CHANGE: &'static str = "window-change";
    const XON_XOFF: &'static str = "xon-xoff";
    const SIGNAL: &'static str = "signal";
    const EXIT_STATUS: &'static str = "exit-status";
    const EXIT_SIGNAL: &'static str = "exit-signal";

    /// Get the [`ChannelRequestContext`]'s SSH identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pty { .. } => Self::PTY,
            Self::Env { .. } => Self::ENV,
            Self::Shell => Self::SHELL,
            Self::Exec { .. } => Self::EXEC,
            Self::Subsystem { .. } => Self::SUBSYSTEM,
            Self::WindowChange { .. } => Self::WINDOW_CHANGE,
            Self::XonXoff { .. } => Self::XON_XOFF,
            Self::Signal { .. } => Self::SIGNAL,
            Self::ExitStatus { .. } => Self::EXIT_STATUS,
            Self::ExitSignal { .. } => Self::EXIT_SIGNAL,
        }
    }
}

/// The `SSH_MSG_CHANNEL_SUCCESS` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 99_u8)]
pub struct ChannelSuccess {
    /// Recipient's channel id.
    pub recipient_channel: u32,
}

/// The `SSH_MSG_CHANNEL_FAILURE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4254#section-5.4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 100_u8)]
pub struct ChannelFailure {
    /// Recipient's channel id.
    pub recipient_channel: u32,
}
