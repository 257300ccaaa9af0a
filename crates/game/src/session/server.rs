use std::collections::VecDeque;
use std::net::SocketAddr;

use log::{info, warn};

use super::events::{DisconnectReason, SessionEvent};
use crate::config::ReplicationConfig;
use crate::constants::{MAX_CLIENTS, SERVER_SLOT};
use crate::net::protocol::{
    ConnectionRequestPacket, Packet, PeerInfo, ServerInfoPacket, StateUpdatePacket,
};
use crate::net::transport::Transport;
use crate::simulation::{AvatarPoseSource, ObjectSimulation, Role, SimulationContext};

#[derive(Debug, Clone)]
struct PeerSlot {
    addr: SocketAddr,
    id: u64,
    name: String,
}

/// Authoritative host. Slot 0 is the server's own player; remote clients are
/// given the remaining slots in connection order.
pub struct ServerSession<T: Transport> {
    transport: T,
    context: SimulationContext,
    server_id: u64,
    server_name: String,
    peers: [Option<PeerSlot>; MAX_CLIENTS],
    frames_since_info: u32,
    pending_events: VecDeque<SessionEvent>,
}

impl<T: Transport> ServerSession<T> {
    pub fn new(transport: T, config: ReplicationConfig, server_id: u64, name: &str) -> Self {
        Self {
            transport,
            context: SimulationContext::new(Role::Server, config),
            server_id,
            server_name: name.to_string(),
            peers: Default::default(),
            frames_since_info: 0,
            pending_events: VecDeque::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.context
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn connected_count(&self) -> usize {
        self.peers.iter().flatten().count()
    }

    fn slot_by_addr(&self, addr: &SocketAddr) -> Option<usize> {
        self.peers
            .iter()
            .position(|peer| peer.as_ref().is_some_and(|p| p.addr == *addr))
    }

    pub fn server_info(&self) -> ServerInfoPacket {
        let mut info = ServerInfoPacket::default();
        info.slots[SERVER_SLOT] = Some(PeerInfo {
            id: self.server_id,
            name: self.server_name.clone(),
        });
        for (slot, peer) in self.peers.iter().enumerate() {
            if let Some(peer) = peer {
                info.slots[slot] = Some(PeerInfo {
                    id: peer.id,
                    name: peer.name.clone(),
                });
            }
        }
        info
    }

    /// One simulation frame: drain the socket, play out buffered frames,
    /// capture `sim` and send a state update to every client.
    pub fn update(
        &mut self,
        now: f64,
        sim: &mut impl ObjectSimulation,
        poses: &mut impl AvatarPoseSource,
    ) {
        self.receive_packets(now, sim);

        let timed_out = self.context.check_timeouts(now);
        for &slot in &timed_out {
            self.peers[slot] = None;
            self.pending_events.push_back(SessionEvent::PeerDisconnected {
                slot,
                reason: DisconnectReason::Timeout,
            });
        }
        if !timed_out.is_empty() {
            self.broadcast_server_info();
        }

        self.context.advance_jitter(sim, poses);
        if let Some(avatar) = poses.get_avatar_pose() {
            self.context.set_local_avatar(avatar);
        }
        self.context
            .set_avatar_sample_time_offset(poses.avatar_sample_time_offset());
        self.context.capture(sim);

        self.send_state_updates(now);

        self.frames_since_info += 1;
        if self.frames_since_info >= self.context.config().server_info_interval_frames {
            self.broadcast_server_info();
        }
        self.context.advance_frame();
    }

    fn receive_packets(&mut self, now: f64, sim: &mut impl ObjectSimulation) {
        loop {
            let (addr, data) = match self.transport.poll_datagram() {
                Ok(Some(datagram)) => datagram,
                Ok(None) => break,
                Err(e) => {
                    self.pending_events.push_back(SessionEvent::Error {
                        message: format!("Network error: {}", e),
                    });
                    break;
                }
            };

            match Packet::deserialize(&data) {
                Ok(Packet::ConnectionRequest(request)) => {
                    self.handle_connection_request(addr, request, now)
                }
                Ok(Packet::StateUpdate(packet)) => {
                    self.handle_state_update(addr, &packet, data.len(), now, sim)
                }
                Ok(Packet::Disconnect) => {
                    if let Some(slot) = self.slot_by_addr(&addr) {
                        self.remove_peer(slot, DisconnectReason::Graceful);
                    }
                }
                Ok(Packet::ServerInfo(_)) => {
                    warn!("ignoring server info from {addr}");
                }
                Err(e) => {
                    warn!("dropping malformed packet from {addr}: {e}");
                }
            }
        }
    }

    fn handle_connection_request(
        &mut self,
        addr: SocketAddr,
        request: ConnectionRequestPacket,
        now: f64,
    ) {
        if self.slot_by_addr(&addr).is_some() {
            // already admitted; the client has not seen server info yet
            self.send_server_info(addr);
            return;
        }

        let free = (0..MAX_CLIENTS).find(|&slot| slot != SERVER_SLOT && self.peers[slot].is_none());
        let Some(slot) = free else {
            info!("denying {addr}: server full");
            self.pending_events.push_back(SessionEvent::ConnectionDenied {
                addr,
                reason: "server full".to_string(),
            });
            self.send_packet(addr, &Packet::Disconnect);
            return;
        };

        info!("{} ({addr}) joined in slot {slot}", request.name);
        self.peers[slot] = Some(PeerSlot {
            addr,
            id: request.client_id,
            name: request.name.clone(),
        });
        self.context.connect_peer(slot, now);
        self.pending_events.push_back(SessionEvent::PeerConnected {
            slot,
            addr,
            name: request.name,
        });
        self.broadcast_server_info();
    }

    fn handle_state_update(
        &mut self,
        addr: SocketAddr,
        packet: &StateUpdatePacket,
        bytes: usize,
        now: f64,
        sim: &mut impl ObjectSimulation,
    ) {
        let Some(slot) = self.slot_by_addr(&addr) else {
            warn!("state update from unknown address {addr}");
            return;
        };
        if let Err(e) = self
            .context
            .process_state_update(slot, packet, bytes, now, sim)
        {
            warn!("dropping state update from slot {slot}: {e}");
        }
    }

    fn send_state_updates(&mut self, now: f64) {
        for slot in 0..MAX_CLIENTS {
            let Some(addr) = self.peers[slot].as_ref().map(|p| p.addr) else {
                continue;
            };
            match self.context.write_state_update(slot, now) {
                Ok(bytes) => {
                    if let Err(e) = self.transport.send_datagram(addr, &bytes) {
                        warn!("send to slot {slot} failed: {e}");
                    }
                }
                Err(e) => warn!("could not build state update for slot {slot}: {e}"),
            }
        }
    }

    fn broadcast_server_info(&mut self) {
        self.frames_since_info = 0;
        let addrs: Vec<SocketAddr> = self.peers.iter().flatten().map(|p| p.addr).collect();
        for addr in addrs {
            self.send_server_info(addr);
        }
    }

    fn send_server_info(&mut self, addr: SocketAddr) {
        let packet = Packet::ServerInfo(self.server_info());
        self.send_packet(addr, &packet);
    }

    fn send_packet(&mut self, addr: SocketAddr, packet: &Packet) {
        let result = packet
            .serialize()
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.transport
                    .send_datagram(addr, &bytes)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!("send to {addr} failed: {e}");
        }
    }

    fn remove_peer(&mut self, slot: usize, reason: DisconnectReason) {
        if let Some(peer) = self.peers[slot].take() {
            info!("{} left slot {slot} ({})", peer.name, reason.as_str());
            self.context.disconnect_peer(slot);
            self.pending_events
                .push_back(SessionEvent::PeerDisconnected { slot, reason });
            self.broadcast_server_info();
        }
    }

    pub fn kick(&mut self, slot: usize) {
        if let Some(addr) = self.peers.get(slot).and_then(|p| p.as_ref()).map(|p| p.addr) {
            self.send_packet(addr, &Packet::Disconnect);
            self.remove_peer(slot, DisconnectReason::Dropped);
        }
    }

    pub fn shutdown(&mut self) {
        for slot in 0..MAX_CLIENTS {
            self.kick(slot);
        }
    }
}
