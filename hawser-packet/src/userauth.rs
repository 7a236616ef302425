//! Messages involved in the SSH's **authentication** (`SSH-USERAUTH`) part of the protocol,
//! as defined in the [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252)
//! and the [RFC 4256](https://datatracker.ietf.org/doc/html/rfc4256).

use binrw::binrw;

use crate::arch;

/// The `SSH_MSG_USERAUTH_REQUEST` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-5>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 50_u8)]
pub struct Request {
    /// Username for the authentication request.
    pub username: arch::Utf8,

    /// Service to start after authentication.
    pub service_name: arch::Ascii,

    #[bw(calc = arch::Ascii::new(method.as_str()))]
    method_name: arch::Ascii,

    /// The attempted authentication method.
    #[br(args(&method_name))]
    pub method: Method,
}

/// The authentication method in the `SSH_MSG_USERAUTH_REQUEST` message.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big)]
#[br(import(method_name: &arch::Ascii))]
pub enum Method {
    /// The `none` method,
    /// as defined in [RFC4252 section 5.2](https://datatracker.ietf.org/doc/html/rfc4252#section-5.2).
    #[br(pre_assert(method_name.as_str() == Method::NONE))]
    None,

    /// The `publickey` method,
    /// as defined in [RFC4252 section 7](https://datatracker.ietf.org/doc/html/rfc4252#section-7).
    #[br(pre_assert(method_name.as_str() == Method::PUBLICKEY))]
    Publickey {
        #[bw(calc = arch::Bool(signature.is_some()))]
        signed: arch::Bool,

        /// Public key algorithm's name.
        algorithm: arch::Bytes,

        /// Public key blob.
        blob: arch::Bytes,

        /// Signature of the authentication blob with the private key,
        /// absent when the request merely probes for key acceptance.
        #[br(if(*signed))]
        signature: Option<arch::Bytes>,
    },

    /// The `password` method,
    /// as defined in [RFC4252 section 8](https://datatracker.ietf.org/doc/html/rfc4252#section-8).
    #[br(pre_assert(method_name.as_str() == Method::PASSWORD))]
    Password {
        #[bw(calc = arch::Bool(new.is_some()))]
        change: arch::Bool,

        /// Plaintext password.
        password: arch::Utf8,

        /// The replacement password when answering a
        /// [`PasswdChangereq`].
        #[br(if(*change))]
        new: Option<arch::Utf8>,
    },

    /// The `hostbased` method,
    /// as defined in [RFC4252 section 9](https://datatracker.ietf.org/doc/html/rfc4252#section-9).
    #[br(pre_assert(method_name.as_str() == Method::HOSTBASED))]
    Hostbased {
        /// Public key algorithm for the host key.
        algorithm: arch::Bytes,

        /// Public host key and certificates for the client host.
        host_key: arch::Bytes,

        /// Client host name expressed as the FQDN.
        client_fqdn: arch::Ascii,

        /// User name on the client host.
        username: arch::Utf8,

        /// Signature of the authentication blob.
        signature: arch::Bytes,
    },

    /// The `keyboard-interactive` method,
    /// as defined in [RFC4256 section 3.1](https://datatracker.ietf.org/doc/html/rfc4256#section-3.1).
    #[br(pre_assert(method_name.as_str() == Method::KEYBOARD_INTERACTIVE))]
    KeyboardInteractive {
        /// Language tag.
        language: arch::Ascii,

        /// A hint for the preferred interactive submethod.
        submethods: arch::Utf8,
    },
}

impl Method {
    /// The SSH identifier of the `none` method.
    pub const NONE: &'static str = "none";

    /// The SSH identifier of the `publickey` method.
    pub const PUBLICKEY: &'static str = "publickey";

    /// The SSH identifier of the `password` method.
    pub const PASSWORD: &'static str = "password";

    /// The SSH identifier of the `hostbased` method.
    pub const HOSTBASED: &'static str = "hostbased";

    /// The SSH identifier of the `keyboard-interactive` method.
    pub const KEYBOARD_INTERACTIVE: &'static str = "keyboard-interactive";

    /// Get the [`Method`]'s SSH identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => Self::NONE,
            Self::Publickey { .. } => Self::PUBLICKEY,
            Self::Password { .. } => Self::PASSWORD,
            Self::Hostbased { .. } => Self::HOSTBASED,
            Self::KeyboardInteractive { .. } => Self::KEYBOARD_INTERACTIVE,
        }
    }
}

/// The `SSH_MSG_USERAUTH_FAILURE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-5.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 51_u8)]
pub struct Failure {
    /// Methods that may productively continue the authentication.
    pub continue_with: arch::NameList,

    /// Whether the attempt was a partial success.
    pub partial_success: arch::Bool,
}

/// The `SSH_MSG_USERAUTH_SUCCESS` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-5.1>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 52_u8)]
pub struct Success;

/// The `SSH_MSG_USERAUTH_BANNER` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-5.4>.
#[binrw]
#[derive(Debug, Clone, Default)]
#[brw(big, magic = 53_u8)]
pub struct Banner {
    /// The banner message.
    pub message: arch::Utf8,

    /// Language tag.
    pub language: arch::Ascii,
}

/// The `SSH_MSG_USERAUTH_PK_OK` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-7>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 60_u8)]
pub struct PkOk {
    /// Echo of the public key algorithm name from the request.
    pub algorithm: arch::Bytes,

    /// Echo of the public key blob from the request.
    pub blob: arch::Bytes,
}

/// The `SSH_MSG_USERAUTH_PASSWD_CHANGEREQ` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4252#section-8>.
#[binrw]
#[derive(Debug, Clone, Default)]
#[brw(big, magic = 60_u8)]
pub struct PasswdChangereq {
    /// Password change prompt.
    pub prompt: arch::Utf8,

    /// Language tag (deprecated).
    pub language: arch::Ascii,
}

/// The `SSH_MSG_USERAUTH_INFO_REQUEST` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4256#section-3.2>.
#[binrw]
#[derive(Debug, Clone, Default)]
#[brw(big, magic = 60_u8)]
pub struct InfoRequest {
    /// Name of the challenge.
    pub name: arch::Utf8,

    /// Instructions for the challenge.
    pub instruction: arch::Utf8,

    /// Language tag (deprecated).
    pub language: arch::Ascii,

    #[bw(calc = prompts.len() as u32)]
    num_prompts: u32,

    /// The challenge's prompts.
    #[br(count = num_prompts)]
    pub prompts: Vec<InfoRequestPrompt>,
}

/// A prompt in the `SSH_MSG_USERAUTH_INFO_REQUEST` message.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big)]
pub struct InfoRequestPrompt {
    /// Challenge prompt text.
    pub prompt: arch::Utf8,

    /// Whether the client should echo back typed characters.
    pub echo: arch::Bool,
}

/// The `SSH_MSG_USERAUTH_INFO_RESPONSE` message.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4256#section-3.4>.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 61_u8)]
pub struct InfoResponse {
    #[bw(calc = responses.len() as u32)]
    num_responses: u32,

    /// Responses to the provided challenge, one per prompt, in order.
    #[br(count = num_responses)]
    pub responses: Vec<arch::Utf8>,
}
