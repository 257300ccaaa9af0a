use super::bitstream::{BitReader, BitWriter, StreamError};
use super::encoding::ObjectUpdate;
use crate::constants::{MAX_CLIENTS, MAX_PACKET_SIZE, NUM_CUBES};
use crate::state::QuantizedAvatarState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    StateUpdate = 0,
    ServerInfo = 1,
    ConnectionRequest = 2,
    Disconnect = 3,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::StateUpdate),
            1 => Ok(Self::ServerInfo),
            2 => Ok(Self::ConnectionRequest),
            3 => Ok(Self::Disconnect),
            other => Err(PacketError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Stream(#[from] StreamError),
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("baseline {baseline} for object {id} is not available")]
    MissingBaseline { id: u16, baseline: u16 },
    #[error("baseline for object {id} is {frames} frames old")]
    BaselineOutOfWindow { id: u16, frames: u32 },
    #[error("reset sequence {received} does not match {expected}")]
    ResetMismatch { expected: u16, received: u16 },
    #[error("duplicate packet {0}")]
    Duplicate(u16),
    #[error("packet {0} is too old")]
    Stale(u16),
    #[error("unexpected packet type {0:?}")]
    UnexpectedPacket(PacketType),
    #[error("no connection for slot {0}")]
    UnknownPeer(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacketHeader {
    pub sequence: u16,
    pub ack: u16,
    pub ack_bitfield: u32,
    pub frame_number: u32,
    pub reset_sequence: u16,
    pub avatar_sample_time_offset: f32,
}

impl PacketHeader {
    fn write(&self, writer: &mut BitWriter) -> Result<(), StreamError> {
        writer.write_u16(self.sequence)?;
        writer.write_u16(self.ack)?;
        writer.write_u32(self.ack_bitfield)?;
        writer.write_u32(self.frame_number)?;
        writer.write_u16(self.reset_sequence)?;
        writer.write_f32(self.avatar_sample_time_offset)
    }

    fn read(reader: &mut BitReader) -> Result<Self, StreamError> {
        Ok(Self {
            sequence: reader.read_u16()?,
            ack: reader.read_u16()?,
            ack_bitfield: reader.read_u32()?,
            frame_number: reader.read_u32()?,
            reset_sequence: reader.read_u16()?,
            avatar_sample_time_offset: reader.read_f32()?,
        })
    }

    /// Sequences acknowledged by this header: `ack` itself plus every
    /// `ack - (i + 1)` whose bit `i` is set.
    pub fn acked_sequences(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::once(self.ack).chain(
            (0..32u16)
                .filter(|&i| self.ack_bitfield & (1 << i) != 0)
                .map(|i| self.ack.wrapping_sub(i + 1)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerInfoPacket {
    pub slots: [Option<PeerInfo>; MAX_CLIENTS],
}

impl ServerInfoPacket {
    pub fn slot_of(&self, id: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|peer| peer.id == id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequestPacket {
    pub client_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateUpdatePacket {
    pub header: PacketHeader,
    pub avatars: Vec<QuantizedAvatarState>,
    pub objects: Vec<ObjectUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    StateUpdate(StateUpdatePacket),
    ServerInfo(ServerInfoPacket),
    ConnectionRequest(ConnectionRequestPacket),
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::StateUpdate(_) => PacketType::StateUpdate,
            Packet::ServerInfo(_) => PacketType::ServerInfo,
            Packet::ConnectionRequest(_) => PacketType::ConnectionRequest,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let mut writer = BitWriter::new(MAX_PACKET_SIZE);
        writer.write_u8(self.packet_type() as u8)?;

        match self {
            Packet::StateUpdate(packet) => {
                let sequence = packet.header.sequence;
                packet.header.write(&mut writer)?;
                writer.write_unsigned(packet.avatars.len() as u32, 0, MAX_CLIENTS as u32)?;
                for avatar in &packet.avatars {
                    avatar.write(&mut writer)?;
                }
                writer.write_unsigned(packet.objects.len() as u32, 0, NUM_CUBES as u32)?;
                for object in &packet.objects {
                    object.write(&mut writer, sequence)?;
                }
            }
            Packet::ServerInfo(packet) => {
                for slot in &packet.slots {
                    writer.write_bool(slot.is_some())?;
                    if let Some(peer) = slot {
                        writer.write_u64(peer.id)?;
                        writer.write_string(&peer.name)?;
                    }
                    writer.write_align()?;
                }
            }
            Packet::ConnectionRequest(packet) => {
                writer.write_u64(packet.client_id)?;
                writer.write_string(&packet.name)?;
            }
            Packet::Disconnect => {}
        }

        Ok(writer.finish())
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let mut reader = BitReader::new(data);
        let packet_type = PacketType::try_from(reader.read_u8()?)?;

        let packet = match packet_type {
            PacketType::StateUpdate => {
                let header = PacketHeader::read(&mut reader)?;
                let avatar_count = reader.read_unsigned(0, MAX_CLIENTS as u32)? as usize;
                let mut avatars = Vec::with_capacity(avatar_count);
                for _ in 0..avatar_count {
                    avatars.push(QuantizedAvatarState::read(&mut reader)?);
                }
                let object_count = reader.read_unsigned(0, NUM_CUBES as u32)? as usize;
                let mut objects = Vec::with_capacity(object_count);
                for _ in 0..object_count {
                    objects.push(ObjectUpdate::read(&mut reader, header.sequence)?);
                }
                Packet::StateUpdate(StateUpdatePacket {
                    header,
                    avatars,
                    objects,
                })
            }
            PacketType::ServerInfo => {
                let mut info = ServerInfoPacket::default();
                for slot in &mut info.slots {
                    if reader.read_bool()? {
                        let id = reader.read_u64()?;
                        let name = reader.read_string()?;
                        *slot = Some(PeerInfo { id, name });
                    }
                    reader.read_align()?;
                }
                Packet::ServerInfo(info)
            }
            PacketType::ConnectionRequest => {
                let client_id = reader.read_u64()?;
                let name = reader.read_string()?;
                Packet::ConnectionRequest(ConnectionRequestPacket { client_id, name })
            }
            PacketType::Disconnect => Packet::Disconnect,
        };

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::encoding::ObjectEncoding;
    use crate::state::{AvatarState, ObjectState, QuantizedRotation};

    fn header() -> PacketHeader {
        PacketHeader {
            sequence: 300,
            ack: 299,
            ack_bitfield: 0b1011,
            frame_number: 123_456,
            reset_sequence: 7,
            avatar_sample_time_offset: -0.004,
        }
    }

    #[test]
    fn test_state_update_roundtrip() {
        let packet = Packet::StateUpdate(StateUpdatePacket {
            header: header(),
            avatars: vec![QuantizedAvatarState::from_avatar(&AvatarState::new(1))],
            objects: vec![
                ObjectUpdate {
                    id: 0,
                    authority_index: 0,
                    ownership_sequence: 0,
                    authority_sequence: 0,
                    encoding: ObjectEncoding::NotChanged { baseline: 290 },
                },
                ObjectUpdate {
                    id: 63,
                    authority_index: 4,
                    ownership_sequence: 9,
                    authority_sequence: 65535,
                    encoding: ObjectEncoding::Absolute(ObjectState {
                        active: true,
                        position: [1, 2, 3],
                        rotation: QuantizedRotation::default(),
                        linear_velocity: [-1, 0, 1],
                        ..Default::default()
                    }),
                },
            ],
        });

        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes[0], PacketType::StateUpdate as u8);
        assert_eq!(Packet::deserialize(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_server_info_roundtrip() {
        let mut info = ServerInfoPacket::default();
        info.slots[0] = Some(PeerInfo {
            id: 1,
            name: "host".into(),
        });
        info.slots[2] = Some(PeerInfo {
            id: u64::MAX,
            name: "ゲスト".into(),
        });
        assert_eq!(info.slot_of(u64::MAX), Some(2));
        assert_eq!(info.slot_of(5), None);

        let packet = Packet::ServerInfo(info);
        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes[0], PacketType::ServerInfo as u8);
        assert_eq!(Packet::deserialize(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_connection_packets_roundtrip() {
        let request = Packet::ConnectionRequest(ConnectionRequestPacket {
            client_id: 42,
            name: "alice".into(),
        });
        let bytes = request.serialize().unwrap();
        assert_eq!(Packet::deserialize(&bytes).unwrap(), request);

        let bytes = Packet::Disconnect.serialize().unwrap();
        assert_eq!(bytes, vec![3]);
        assert_eq!(Packet::deserialize(&bytes).unwrap(), Packet::Disconnect);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            Packet::deserialize(&[9]),
            Err(PacketError::UnknownPacketType(9))
        ));
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let packet = Packet::StateUpdate(StateUpdatePacket {
            header: header(),
            ..Default::default()
        });
        let bytes = packet.serialize().unwrap();
        for len in 0..bytes.len() - 1 {
            assert!(
                matches!(Packet::deserialize(&bytes[..len]), Err(PacketError::Stream(_))),
                "len {len}"
            );
        }
    }

    #[test]
    fn test_acked_sequences() {
        let header = PacketHeader {
            ack: 1,
            ack_bitfield: 0b101,
            ..Default::default()
        };
        let acked: Vec<u16> = header.acked_sequences().collect();
        assert_eq!(acked, vec![1, 0, 65534]);
    }
}
