use enumset::EnumSetType;
use hawser_packet::userauth;

/// The authentication methods the handler can serve.
#[derive(Debug, EnumSetType)]
pub enum Method {
    /// The SSH `none` authentication method.
    None,

    /// The SSH `publickey` authentication method.
    Publickey,

    /// The SSH `password` authentication method.
    Password,

    /// The SSH `keyboard-interactive` authentication method.
    KeyboardInteractive,
}

impl Method {
    /// The method's SSH identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => userauth::Method::NONE,
            Self::Publickey => userauth::Method::PUBLICKEY,
            Self::Password => userauth::Method::PASSWORD,
            Self::KeyboardInteractive => userauth::Method::KEYBOARD_INTERACTIVE,
        }
    }

    /// Index into the per-method attempt counters.
    pub(super) fn index(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Publickey => 1,
            Self::Password => 2,
            Self::KeyboardInteractive => 3,
        }
    }

    /// The [`Method`] matching a wire-level request method, `None`
    /// (the Rust one) for methods we do not serve at all.
    pub(super) fn of(method: &userauth::Method) -> Option<Self> {
        match method {
            userauth::Method::None => Some(Self::None),
            userauth::Method::Publickey { .. } => Some(Self::Publickey),
            userauth::Method::Password { .. } => Some(Self::Password),
            userauth::Method::KeyboardInteractive { .. } => Some(Self::KeyboardInteractive),
            userauth::Method::Hostbased { .. } => None,
        }
    }
}
