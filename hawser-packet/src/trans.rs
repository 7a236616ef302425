//! Messages involved in the SSH's **transport** part of the protocol,
//! as defined in the [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253)
//! and the [RFC 5656](https://datatracker.ietf.org/doc/html/rfc5656).

use binrw::binrw;

use crate::arch;

/// The `SSH_MSG_DISCONNECT` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-11.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 1_u8)]
pub struct Disconnect {
    /// Reason for disconnection.
    pub reason: DisconnectReason,

    /// Human-readable description of the reason.
    pub description: arch::Utf8,

    /// Language tag.
    pub language: arch::Ascii,
}

/// The `reason` in the `SSH_MSG_DISCONNECT` message.
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
pub enum DisconnectReason {
    /// `SSH_DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT`.
    #[brw(magic = 1_u32)]
    HostNotAllowedToConnect,

    /// `SSH_DISCONNECT_PROTOCOL_ERROR`.
    #[brw(magic = 2_u32)]
    ProtocolError,

    /// `SSH_DISCONNECT_KEY_EXCHANGE_FAILED`.
    #[brw(magic = 3_u32)]
    KeyExchangeFailed,

    /// `SSH_DISCONNECT_RESERVED`.
    #[brw(magic = 4_u32)]
    Reserved,

    /// `SSH_DISCONNECT_MAC_ERROR`.
    #[brw(magic = 5_u32)]
    MacError,

    /// `SSH_DISCONNECT_COMPRESSION_ERROR`.
    #[brw(magic = 6_u32)]
    CompressionError,

    /// `SSH_DISCONNECT_SERVICE_NOT_AVAILABLE`.
    #[brw(magic = 7_u32)]
    ServiceNotAvailable,

    /// `SSH_DISCONNECT_PROTOCOL_VERSION_NOT_SUPPORTED`.
    #[brw(magic = 8_u32)]
    ProtocolVersionNotSupported,

    /// `SSH_DISCONNECT_HOST_KEY_NOT_VERIFIABLE`.
    #[brw(magic = 9_u32)]
    HostKeyNotVerifiable,

    /// `SSH_DISCONNECT_CONNECTION_LOST`.
    #[brw(magic = 10_u32)]
    ConnectionLost,

    /// `SSH_DISCONNECT_BY_APPLICATION`.
    #[brw(magic = 11_u32)]
    ByApplication,

    /// `SSH_DISCONNECT_TOO_MANY_CONNECTIONS`.
    #[brw(magic = 12_u32)]
    TooManyConnections,

    /// `SSH_DISCONNECT_AUTH_CANCELLED_BY_USER`.
    #[brw(magic = 13_u32)]
    AuthCancelledByUser,

    /// `SSH_DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE`.
    #[brw(magic = 14_u32)]
    NoMoreAuthMethodsAvailable,

    /// `SSH_DISCONNECT_ILLEGAL_USER_NAME`.
    #[brw(magic = 15_u32)]
    IllegalUserName,

    /// Any other disconnect reason, may be non-standard.
    Other(u32),
}

/// The `SSH_MSG_IGNORE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-11.2>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 2_u8)]
pub struct Ignore {
    /// Data to be ignored.
    pub data: arch::Bytes,
}

/// The `SSH_MSG_UNIMPLEMENTED` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-11.4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 3_u8)]
pub struct Unimplemented {
    /// Sequence number of the rejected packet.
    pub seq: u32,
}

/// The `SSH_MSG_DEBUG` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-11.3>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 4_u8)]
pub struct Debug {
    /// Whether the message should always be displayed.
    pub always_display: arch::Bool,

    /// The debug message.
    pub message: arch::Utf8,

    /// Language tag.
    pub language: arch::Ascii,
}

/// The `SSH_MSG_SERVICE_REQUEST` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-10>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 5_u8)]
pub struct ServiceRequest {
    /// Name of the requested service.
    pub service_name: arch::Ascii,
}

/// The `SSH_MSG_SERVICE_ACCEPT` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-10>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 6_u8)]
pub struct ServiceAccept {
    /// Name of the accepted service.
    pub service_name: arch::Ascii,
}

/// The `SSH_MSG_KEXINIT` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-7.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 20_u8)]
pub struct KexInit {
    /// Random bytes to individualize the exchange.
    pub cookie: [u8; 16],

    /// Supported key-exchange algorithms, in preference order.
    pub kex_algorithms: arch::NameList,

    /// Supported host-key algorithms, in preference order.
    pub server_host_key_algorithms: arch::NameList,

    /// Supported client-to-server encryption algorithms.
    pub encryption_algorithms_client_to_server: arch::NameList,

    /// Supported server-to-client encryption algorithms.
    pub encryption_algorithms_server_to_client: arch::NameList,

    /// Supported client-to-server MAC algorithms.
    pub mac_algorithms_client_to_server: arch::NameList,

    /// Supported server-to-client MAC algorithms.
    pub mac_algorithms_server_to_client: arch::NameList,

    /// Supported client-to-server compression algorithms.
    pub compression_algorithms_client_to_server: arch::NameList,

    /// Supported server-to-client compression algorithms.
    pub compression_algorithms_server_to_client: arch::NameList,

    /// Preferred client-to-server languages.
    pub languages_client_to_server: arch::NameList,

    /// Preferred server-to-client languages.
    pub languages_server_to_client: arch::NameList,

    /// Whether a guessed kex packet follows this message.
    pub first_kex_packet_follows: arch::Bool,

    #[bw(calc = 0)]
    #[br(temp)]
    reserved: u32,
}

/// The `SSH_MSG_NEWKEYS` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-7.3>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 21_u8)]
pub struct NewKeys;

/// The `SSH_MSG_KEX_ECDH_INIT` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc5656#section-4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 30_u8)]
pub struct KexEcdhInit {
    /// Client's ephemeral public key octet string.
    pub q_c: arch::Bytes,
}

/// The `SSH_MSG_KEX_ECDH_REPLY` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc5656#section-4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 31_u8)]
pub struct KexEcdhReply {
    /// Server's public host key.
    pub k_s: arch::Bytes,

    /// Server's ephemeral public key octet string.
    pub q_s: arch::Bytes,

    /// Signature of the exchange hash with the host key.
    pub signature: arch::Bytes,
}
