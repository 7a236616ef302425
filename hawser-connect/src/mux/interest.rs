use std::num::NonZeroU32;

use hawser_packet::{binrw::meta::ReadMagic, connect, Packet};

/// The message kinds a task can await on the multiplexer, channel
/// messages keyed by the *local* channel identifier.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum Interest {
    GlobalRequest,
    GlobalResponse,

    ChannelOpenRequest,
    ChannelOpenResponse(u32),

    ChannelWindowAdjust(u32),
    ChannelData(u32, Option<NonZeroU32>),
    ChannelEof(u32),
    ChannelClose(u32),

    ChannelRequest(u32),
    ChannelResponse(u32),
}

impl Interest {
    fn u32_at(packet: &Packet, offset: usize) -> Option<u32> {
        let bytes = packet.get(offset..offset + 4)?;

        Some(u32::from_be_bytes(
            bytes.try_into().expect("The slice of size 4 is not of size 4"),
        ))
    }

    fn recipient_channel_of(packet: &Packet) -> Option<u32> {
        Self::u32_at(packet, 1)
    }

    /// Classify a received packet, `None` for messages that do not
    /// belong to the connect protocol or are too short to carry their
    /// channel identifier.
    pub fn parse(packet: &Packet) -> Option<Self> {
        if packet.is_empty() {
            return None;
        }

        if packet[0] == connect::GlobalRequest::MAGIC {
            Some(Self::GlobalRequest)
        } else if packet[0] == connect::RequestSuccess::MAGIC
            || packet[0] == connect::RequestFailure::MAGIC
        {
            Some(Self::GlobalResponse)
        } else if packet[0] == connect::ChannelOpen::MAGIC {
            Some(Self::ChannelOpenRequest)
        } else if packet[0] == connect::ChannelOpenConfirmation::MAGIC
            || packet[0] == connect::ChannelOpenFailure::MAGIC
        {
            Some(Self::ChannelOpenResponse(Self::recipient_channel_of(
                packet,
            )?))
        } else if packet[0] == connect::ChannelWindowAdjust::MAGIC {
            Some(Self::ChannelWindowAdjust(Self::recipient_channel_of(
                packet,
            )?))
        } else if packet[0] == connect::ChannelData::MAGIC {
            Some(Self::ChannelData(Self::recipient_channel_of(packet)?, None))
        } else if packet[0] == connect::ChannelExtendedData::MAGIC {
            Some(Self::ChannelData(
                Self::recipient_channel_of(packet)?,
                NonZeroU32::new(Self::u32_at(packet, 5)?),
            ))
        } else if packet[0] == connect::ChannelEof::MAGIC {
            Some(Self::ChannelEof(Self::recipient_channel_of(packet)?))
        } else if packet[0] == connect::ChannelClose::MAGIC {
            Some(Self::ChannelClose(Self::recipient_channel_of(packet)?))
        } else if packet[0] == connect::ChannelRequest::MAGIC {
            Some(Self::ChannelRequest(Self::recipient_channel_of(packet)?))
        } else if packet[0] == connect::ChannelSuccess::MAGIC
            || packet[0] == connect::ChannelFailure::MAGIC
        {
            Some(Self::ChannelResponse(Self::recipient_channel_of(packet)?))
        } else {
            None
        }
    }
}
