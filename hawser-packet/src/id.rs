use futures::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Error;

const VERSION: &str = "2.0";

/// Maximum byte length of an identification line, as defined in
/// RFC 4253 section 4.2, CR and LF included.
const MAX_LINE_LENGTH: usize = 255;

/// Maximum count of preamble lines tolerated before the
/// identification string.
const MAX_PREAMBLE_LINES: usize = 32;

/// The SSH identification string as defined in the SSH protocol.
///
/// The format matches the following pattern:
/// `SSH-<protoversion>-<softwareversion>[ <comments>]`,
/// terminated on the wire by a CR LF sequence.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4253#section-4.2>.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    /// The SSH's protocol version, should be `2.0` in our case.
    pub protoversion: String,

    /// A string identifying the software currently used, in example `billsSSH_3.6.3q3`.
    pub softwareversion: String,

    /// Optional comments with additional informations about the software.
    pub comments: Option<String>,
}

impl Id {
    /// Convenience method to create an `SSH-2.0` identifier string.
    pub fn v2(softwareversion: impl Into<String>, comments: Option<impl Into<String>>) -> Self {
        Self {
            protoversion: VERSION.into(),
            softwareversion: softwareversion.into(),
            comments: comments.map(Into::into),
        }
    }

    /// Read an [`Id`] from the provided asynchronous `reader`,
    /// discarding the preamble lines servers are allowed to send
    /// before their identification string.
    pub async fn from_async_reader(
        reader: &mut (impl AsyncBufRead + Unpin),
    ) -> Result<Self, Error> {
        let mut line = Vec::with_capacity(MAX_LINE_LENGTH);

        for _ in 0..MAX_PREAMBLE_LINES {
            line.clear();

            (&mut *reader)
                .take(MAX_LINE_LENGTH as u64)
                .read_until(b'\n', &mut line)
                .await?;

            if !line.ends_with(b"\n") {
                return Err(Error::BadIdentifer);
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);

            if text.starts_with("SSH-") {
                return text.parse();
            }

            tracing::debug!("Discarded identification preamble line: `{text}`");
        }

        Err(Error::BadIdentifer)
    }

    /// Write the [`Id`] to the provided asynchronous `writer`,
    /// with the terminating CR LF sequence.
    pub async fn to_async_writer(
        &self,
        writer: &mut (impl AsyncWrite + Unpin),
    ) -> Result<(), Error> {
        writer
            .write_all(format!("{self}\r\n").as_bytes())
            .await
            .map_err(Into::into)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.protoversion, self.softwareversion)?;

        if let Some(comments) = &self.comments {
            write!(f, " {comments}")?;
        }

        Ok(())
    }
}

impl std::str::FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, comments) = s
            .split_once(' ')
            .map_or_else(|| (s, None), |(id, comments)| (id, Some(comments)));

        match id.splitn(3, '-').collect::<Vec<_>>()[..] {
            ["SSH", protoversion, softwareversion] => Ok(Self {
                protoversion: protoversion.to_string(),
                softwareversion: softwareversion.to_string(),
                comments: comments.map(str::to_string),
            }),
            _ => Err(Error::BadIdentifer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_an_identifier_with_comments() {
        let id: Id = "SSH-2.0-billsSSH_3.6.3q3 comment".parse().expect("parse failed");

        assert_eq!(id.protoversion, "2.0");
        assert_eq!(id.softwareversion, "billsSSH_3.6.3q3");
        assert_eq!(id.comments.as_deref(), Some("comment"));
        assert_eq!(id.to_string(), "SSH-2.0-billsSSH_3.6.3q3 comment");
    }

    #[async_std::test]
    async fn it_skips_the_preamble_lines() {
        let mut wire = &b"here cometh the daemon\r\nSSH-2.0-hawser\r\n"[..];

        let id = Id::from_async_reader(&mut wire).await.expect("read failed");
        assert_eq!(id, Id::v2("hawser", None::<&str>));
    }

    #[async_std::test]
    async fn it_rejects_garbage() {
        let mut wire = &b"no identification in sight"[..];

        assert!(Id::from_async_reader(&mut wire).await.is_err());
    }
}
