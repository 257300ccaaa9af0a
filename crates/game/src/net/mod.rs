pub mod bitstream;
pub mod buffer;
pub mod connection;
pub mod delta;
pub mod encoding;
pub mod jitter;
pub mod protocol;
pub mod sequence;
pub mod simulator;
pub mod stats;
pub mod transport;

pub use bitstream::{BitReader, BitWriter, StreamError};
pub use buffer::SequenceBuffer;
pub use connection::ConnectionData;
pub use delta::{Baseline, DeltaBuffer};
pub use encoding::{EncodingTier, ObjectEncoding, ObjectUpdate};
pub use jitter::{JitterBuffer, JitterEntry};
pub use protocol::{
    ConnectionRequestPacket, Packet, PacketError, PacketHeader, PacketType, PeerInfo,
    ServerInfoPacket, StateUpdatePacket,
};
pub use sequence::{Sequence, frame_greater_than, sequence_greater_than, sequence_less_than};
pub use simulator::{NetworkSimulator, SimulatedTransport};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{Transport, UdpTransport};
