use std::collections::VecDeque;
use std::net::SocketAddr;

use log::{info, warn};

use super::events::{DisconnectReason, SessionEvent};
use crate::config::ReplicationConfig;
use crate::constants::SERVER_SLOT;
use crate::net::protocol::{ConnectionRequestPacket, Packet, ServerInfoPacket};
use crate::net::transport::Transport;
use crate::simulation::{AvatarPoseSource, ObjectSimulation, Role, SimulationContext};

const CONNECTION_REQUEST_INTERVAL: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientState {
    Connecting { last_request: Option<f64> },
    Connected { slot: usize },
}

pub struct ClientSession<T: Transport> {
    transport: T,
    server_addr: SocketAddr,
    client_id: u64,
    name: String,
    config: ReplicationConfig,
    state: ClientState,
    context: Option<SimulationContext>,
    server_info: Option<ServerInfoPacket>,
    pending_events: VecDeque<SessionEvent>,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(
        transport: T,
        server_addr: SocketAddr,
        config: ReplicationConfig,
        client_id: u64,
        name: &str,
    ) -> Self {
        Self {
            transport,
            server_addr,
            client_id,
            name: name.to_string(),
            config,
            state: ClientState::Connecting { last_request: None },
            context: None,
            server_info: None,
            pending_events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected { .. })
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Present once the server has assigned a slot.
    pub fn context(&self) -> Option<&SimulationContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut SimulationContext> {
        self.context.as_mut()
    }

    pub fn server_info(&self) -> Option<&ServerInfoPacket> {
        self.server_info.as_ref()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn update(
        &mut self,
        now: f64,
        sim: &mut impl ObjectSimulation,
        poses: &mut impl AvatarPoseSource,
    ) {
        self.receive_packets(now, sim);

        match self.state {
            ClientState::Connecting { last_request } => {
                let due = last_request.is_none_or(|t| now - t >= CONNECTION_REQUEST_INTERVAL);
                if due {
                    self.send_connection_request();
                    self.state = ClientState::Connecting {
                        last_request: Some(now),
                    };
                }
            }
            ClientState::Connected { .. } => self.simulate(now, sim, poses),
        }
    }

    fn simulate(
        &mut self,
        now: f64,
        sim: &mut impl ObjectSimulation,
        poses: &mut impl AvatarPoseSource,
    ) {
        let Some(context) = self.context.as_mut() else {
            return;
        };
        if !context.check_timeouts(now).is_empty() {
            self.leave(DisconnectReason::Timeout);
            return;
        }

        context.advance_jitter(sim, poses);
        if let Some(avatar) = poses.get_avatar_pose() {
            context.set_local_avatar(avatar);
        }
        context.set_avatar_sample_time_offset(poses.avatar_sample_time_offset());
        context.capture(sim);

        match context.write_state_update(SERVER_SLOT, now) {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_datagram(self.server_addr, &bytes) {
                    warn!("send to server failed: {e}");
                }
            }
            Err(e) => warn!("could not build state update: {e}"),
        }
        context.advance_frame();
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
            if addr != self.server_addr {
                continue;
            }

            match Packet::deserialize(&data) {
                Ok(Packet::ServerInfo(info)) => self.handle_server_info(info, now),
                Ok(Packet::StateUpdate(packet)) => {
                    let Some(context) = self.context.as_mut() else {
                        continue;
                    };
                    if let Err(e) =
                        context.process_state_update(SERVER_SLOT, &packet, data.len(), now, sim)
                    {
                        warn!("dropping state update: {e}");
                    }
                }
                Ok(Packet::Disconnect) => self.leave(DisconnectReason::Dropped),
                Ok(Packet::ConnectionRequest(_)) => {
                    warn!("ignoring connection request from server");
                }
                Err(e) => warn!("dropping malformed packet: {e}"),
            }
        }
    }

    fn handle_server_info(&mut self, info: ServerInfoPacket, now: f64) {
        let assigned = info.slot_of(self.client_id);
        self.server_info = Some(info);

        match (self.state, assigned) {
            (ClientState::Connecting { .. }, Some(slot)) if slot != SERVER_SLOT => {
                info!("joined server {} in slot {slot}", self.server_addr);
                let mut context = SimulationContext::new(Role::Client { slot }, self.config.clone());
                context.connect_peer(SERVER_SLOT, now);
                self.context = Some(context);
                self.state = ClientState::Connected { slot };
                self.pending_events.push_back(SessionEvent::Joined { slot });
            }
            (ClientState::Connected { slot }, assigned) if assigned != Some(slot) => {
                self.leave(DisconnectReason::Dropped);
            }
            _ => {}
        }
    }

    fn leave(&mut self, reason: DisconnectReason) {
        if !self.is_connected() {
            return;
        }
        info!("left server {} ({})", self.server_addr, reason.as_str());
        self.context = None;
        self.state = ClientState::Connecting { last_request: None };
        self.pending_events.push_back(SessionEvent::Left { reason });
    }

    fn send_connection_request(&mut self) {
        let packet = Packet::ConnectionRequest(ConnectionRequestPacket {
            client_id: self.client_id,
            name: self.name.clone(),
        });
        self.send_packet(&packet);
    }

    fn send_packet(&mut self, packet: &Packet) {
        match packet.serialize() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_datagram(self.server_addr, &bytes) {
                    warn!("send to server failed: {e}");
                }
            }
            Err(e) => warn!("could not serialize {:?}: {e}", packet.packet_type()),
        }
    }

    /// Tells the server this client is leaving.
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            self.send_packet(&Packet::Disconnect);
            self.leave(DisconnectReason::Graceful);
        }
    }
}
