//! Types defined in the SSH's **architecture** part of the protocol,
//! as defined in the [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251).

use binrw::binrw;

/// A `string` as defined in the SSH protocol,
/// prefixed with it's `size` as a [`u32`].
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[binrw]
#[derive(Default, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct Bytes {
    #[bw(calc = payload.len() as u32)]
    size: u32,

    #[br(count = size)]
    payload: Vec<u8>,
}

impl Bytes {
    /// Create new [`Bytes`] from anything that can become a [`Vec`].
    pub fn new(s: impl Into<Vec<u8>>) -> Self {
        Self { payload: s.into() }
    }

    /// Extract the [`Bytes`] into a [`Vec`].
    pub fn into_vec(self) -> Vec<u8> {
        self.payload
    }
}

impl std::fmt::Debug for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Bytes").field(&self.payload).finish()
    }
}

impl std::ops::Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.payload.as_ref()
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self { payload: value }
    }
}

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        Self {
            payload: value.to_vec(),
        }
    }
}

/// A `string` as defined in the SSH protocol,
/// prefixed with it's `size` as a [`u32`],
/// restricted to valid **UTF-8**.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[binrw]
#[derive(Default, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct Utf8 {
    #[bw(calc = payload.len() as u32)]
    size: u32,

    #[br(try_map = String::from_utf8, count = size)]
    #[bw(map = String::as_bytes)]
    payload: String,
}

impl Utf8 {
    /// Create new [`Utf8`] from anything that can become a [`String`].
    pub fn new(s: impl Into<String>) -> Self {
        Self { payload: s.into() }
    }

    /// Extract the [`Utf8`] into a [`String`].
    pub fn into_string(self) -> String {
        self.payload
    }
}

impl std::fmt::Debug for Utf8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Utf8").field(&self.payload).finish()
    }
}

impl std::fmt::Display for Utf8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.payload)
    }
}

impl std::ops::Deref for Utf8 {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.payload
    }
}

impl From<String> for Utf8 {
    fn from(value: String) -> Self {
        Self { payload: value }
    }
}

impl From<&str> for Utf8 {
    fn from(value: &str) -> Self {
        Self {
            payload: value.into(),
        }
    }
}

/// A `string` as defined in the SSH protocol,
/// prefixed with it's `size` as a [`u32`],
/// restricted to valid **ASCII**.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[binrw]
#[derive(Default, Clone, PartialEq, Eq)]
#[brw(big, assert(self_0.is_ascii()))]
pub struct Ascii(Utf8);

impl Ascii {
    /// Create new [`Ascii`] from anything that can become a [`String`].
    pub fn new(s: impl Into<String>) -> Self {
        Self(Utf8::new(s))
    }

    /// Access the [`Ascii`] as a [`str`].
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Ascii {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ascii").field(&self.0.payload).finish()
    }
}

impl std::fmt::Display for Ascii {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for Ascii {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Ascii {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Ascii {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A `name-list` as defined in the SSH protocol,
/// a `,`-separated list of **ASCII** identifiers,
/// prefixed with it's `size` as a [`u32`].
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[binrw]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct NameList(Ascii);

impl NameList {
    /// Create a new [`NameList`] from a `,`-separated string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(Ascii::new(s))
    }

    /// Iterate over the names in the list, in order of preference.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').filter(|name| !name.is_empty())
    }

    /// Whether the list contains the provided `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|item| item == name)
    }

    /// Select the first name in _our_ preference order that also
    /// appears in `other`, the negotiation rule of RFC 4253 section 7.1.
    pub fn preferred_in<'s>(&'s self, other: &NameList) -> Option<&'s str> {
        self.iter().find(|name| other.contains(name))
    }
}

impl<T: AsRef<str>> FromIterator<T> for NameList {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|name| name.as_ref().to_owned())
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// A `boolean` as defined in the SSH protocol.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[binrw]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
pub struct Bool(
    #[br(map = |n: u8| n > 0)]
    #[bw(map = |b| u8::from(*b))]
    pub bool,
);

impl std::ops::Deref for Bool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<bool> for Bool {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

/// A `mpint` as defined in the SSH protocol, a multiple precision
/// integer in two's complement, stored as a string with the minimal
/// number of octets.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[binrw]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct MpInt(Bytes);

impl MpInt {
    /// Create a [`MpInt`] from the unsigned big-endian `bytes`,
    /// stripping leading zeroes and prepending a sign octet where the
    /// most-significant bit would otherwise flag the value negative.
    pub fn positive(bytes: &[u8]) -> Self {
        let stripped: &[u8] = {
            let mut slice = bytes;
            while let [0, rest @ ..] = slice {
                slice = rest;
            }
            slice
        };

        match stripped.first() {
            Some(first) if first & 0x80 != 0 => {
                let mut payload = Vec::with_capacity(stripped.len() + 1);
                payload.push(0);
                payload.extend_from_slice(stripped);

                Self(payload.into())
            }
            _ => Self(stripped.to_vec().into()),
        }
    }
}

impl std::ops::Deref for MpInt {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for MpInt {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for MpInt {
    fn from(value: Vec<u8>) -> Self {
        Self::positive(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use binrw::{BinRead, BinWrite};
    use rstest::rstest;

    macro_rules! encode {
        ($value:expr) => {{
            let mut cursor = std::io::Cursor::new(Vec::new());
            $value.write(&mut cursor).expect("serialization failed");

            cursor.into_inner()
        }};
    }

    #[test]
    fn bytes_roundtrips_with_length_prefix() {
        let bytes = Bytes::new(&b"hawser"[..]);
        let wire = encode!(&bytes);

        assert_eq!(wire, [&[0, 0, 0, 6][..], b"hawser"].concat());
        assert_eq!(
            Bytes::read(&mut std::io::Cursor::new(wire)).expect("deserialization failed"),
            bytes
        );
    }

    #[rstest]
    #[case(&[0x00], &[])]
    #[case(&[0x09, 0xa3, 0x78, 0xf9, 0xb2, 0xe3, 0x32, 0xa7], &[0x09, 0xa3, 0x78, 0xf9, 0xb2, 0xe3, 0x32, 0xa7])]
    #[case(&[0x80], &[0x00, 0x80])]
    #[case(&[0x00, 0x00, 0xed, 0xcc], &[0x00, 0xed, 0xcc])]
    fn mpint_encodes_minimally(#[case] raw: &[u8], #[case] expected: &[u8]) {
        assert_eq!(&*MpInt::positive(raw), expected);
    }

    #[test]
    fn namelist_negotiates_by_our_preference() {
        let ours = NameList::new("curve25519-sha256,ecdh-sha2-nistp256");
        let theirs = NameList::new("ecdh-sha2-nistp256,aes128-ctr,curve25519-sha256");

        assert_eq!(ours.preferred_in(&theirs), Some("curve25519-sha256"));
        assert_eq!(theirs.preferred_in(&ours), Some("ecdh-sha2-nistp256"));
        assert_eq!(NameList::default().preferred_in(&ours), None);
    }

    #[test]
    fn namelist_collects_from_iterator() {
        let list = NameList::from_iter(["none", "zlib"]);

        assert_eq!(encode!(&list), [&[0, 0, 0, 9][..], b"none,zlib"].concat());
    }
}
