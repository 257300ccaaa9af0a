use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::stats::PacketLossSimulation;
use super::transport::Transport;

#[derive(Debug)]
struct DelayedPacket {
    deliver_time: f64,
    order: u64,
    from: SocketAddr,
    to: SocketAddr,
    data: Vec<u8>,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .deliver_time
            .total_cmp(&self.deliver_time)
            .then(other.order.cmp(&self.order))
    }
}

/// In-process network shared by any number of [`SimulatedTransport`]s.
///
/// Datagrams are delayed, dropped and duplicated according to the
/// destination's [`PacketLossSimulation`], driven by a seeded RNG so runs are
/// reproducible. Time only moves when [`NetworkSimulator::update`] is called.
#[derive(Debug)]
pub struct NetworkSimulator {
    default_config: PacketLossSimulation,
    configs: HashMap<SocketAddr, PacketLossSimulation>,
    queue: BinaryHeap<DelayedPacket>,
    mailboxes: HashMap<SocketAddr, VecDeque<(SocketAddr, Vec<u8>)>>,
    rng: StdRng,
    time: f64,
    next_order: u64,
    dropped: u64,
}

impl NetworkSimulator {
    pub fn new(config: PacketLossSimulation, seed: u64) -> Self {
        Self {
            default_config: config,
            configs: HashMap::new(),
            queue: BinaryHeap::new(),
            mailboxes: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            time: 0.0,
            next_order: 0,
            dropped: 0,
        }
    }

    pub fn shared(config: PacketLossSimulation, seed: u64) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(config, seed)))
    }

    /// Overrides the conditions for traffic sent to `addr`.
    pub fn set_config(&mut self, addr: SocketAddr, config: PacketLossSimulation) {
        self.configs.insert(addr, config);
    }

    pub fn config_for(&self, addr: &SocketAddr) -> &PacketLossSimulation {
        self.configs.get(addr).unwrap_or(&self.default_config)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Advances the clock and moves every datagram that is due into its
    /// destination's mailbox.
    pub fn update(&mut self, now: f64) {
        self.time = self.time.max(now);
        while self
            .queue
            .peek()
            .is_some_and(|packet| packet.deliver_time <= self.time)
        {
            let Some(packet) = self.queue.pop() else {
                break;
            };
            self.mailboxes
                .entry(packet.to)
                .or_default()
                .push_back((packet.from, packet.data));
        }
    }

    pub fn send(&mut self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let config = self.config_for(&to).clone();
        if config.should_drop(&mut self.rng) {
            self.dropped += 1;
            return;
        }

        let copies = if config.should_duplicate(&mut self.rng) { 2 } else { 1 };
        for _ in 0..copies {
            let delay = config.delay_ms(&mut self.rng) as f64 / 1000.0;
            self.queue.push(DelayedPacket {
                deliver_time: self.time + delay,
                order: self.next_order,
                from,
                to,
                data: data.to_vec(),
            });
            self.next_order += 1;
        }
        self.update(self.time);
    }

    pub fn receive(&mut self, addr: SocketAddr) -> Option<(SocketAddr, Vec<u8>)> {
        self.mailboxes.get_mut(&addr)?.pop_front()
    }
}

pub struct SimulatedTransport {
    network: Rc<RefCell<NetworkSimulator>>,
    local_addr: SocketAddr,
}

impl SimulatedTransport {
    pub fn new(network: Rc<RefCell<NetworkSimulator>>, local_addr: SocketAddr) -> Self {
        Self {
            network,
            local_addr,
        }
    }
}

impl Transport for SimulatedTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_datagram(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        self.network.borrow_mut().send(self.local_addr, addr, bytes);
        Ok(())
    }

    fn poll_datagram(&mut self) -> io::Result<Option<(SocketAddr, Vec<u8>)>> {
        Ok(self.network.borrow_mut().receive(self.local_addr))
    }
}
