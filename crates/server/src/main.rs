mod config;

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use log::info;

use config::ServerConfig;
use cubesync::{
    ClientSession, CubeSimulation, FixedTimestep, Hand, MAX_CLIENTS, NUM_CUBES,
    NetworkSimulator, PacketLossSimulation, ReplicationConfig, ScriptedAvatar, ServerSession,
    SessionEvent, SimulatedTransport, TICK_RATE, Transport, UdpTransport,
};

#[derive(Parser)]
#[command(name = "cubesync-server")]
#[command(about = "Cube replication server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = cubesync::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "server")]
    name: String,

    #[arg(long, default_value_t = 0, help = "In-process clients over a simulated network")]
    loopback_clients: usize,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<f64>,

    #[arg(long, default_value_t = 6, help = "Jitter buffer delay in frames")]
    jitter_delay: u32,

    #[arg(long, default_value_t = 0, help = "Seed for the simulated network")]
    seed: u64,

    #[arg(long, help = "Enable packet loss simulation on the loopback network")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0.0, help = "Duplicate percentage (0-100)")]
    duplicate_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

/// A local physics world plus the scripted player driving it.
struct Player {
    sim: CubeSimulation,
    avatar: ScriptedAvatar,
}

impl Player {
    fn new(slot: usize) -> Self {
        Self {
            sim: CubeSimulation::new(NUM_CUBES),
            avatar: ScriptedAvatar::new(slot),
        }
    }
}

struct LoopbackClient {
    session: ClientSession<SimulatedTransport>,
    player: Player,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.bind, args.port),
        name: args.name,
        loopback_clients: args.loopback_clients.min(MAX_CLIENTS - 1),
        duration_secs: args.duration,
        seed: args.seed,
        replication: ReplicationConfig {
            jitter_delay_frames: args.jitter_delay,
            ..Default::default()
        },
        packet_loss: PacketLossSimulation {
            enabled: args.simulate_packet_loss,
            loss_percent: args.loss_percent,
            min_latency_ms: args.min_latency,
            max_latency_ms: args.max_latency,
            jitter_ms: args.jitter,
            duplicate_percent: args.duplicate_percent,
        },
        ..Default::default()
    };

    if config.loopback_clients > 0 {
        run_loopback(&config);
    } else {
        let transport = UdpTransport::bind(&config.bind_addr)
            .with_context(|| format!("binding {}", config.bind_addr))?;
        let mut server = ServerSession::new(transport, config.replication.clone(), 0, &config.name);
        info!("Server started on {}", server.local_addr());
        run(&config, &mut server, &mut [], None);
    }

    info!("Server shutting down");
    Ok(())
}

fn run_loopback(config: &ServerConfig) {
    let network = NetworkSimulator::shared(config.packet_loss.clone(), config.seed);
    let server_addr = SocketAddr::from(([127, 0, 0, 1], cubesync::DEFAULT_PORT));
    let mut server = ServerSession::new(
        SimulatedTransport::new(network.clone(), server_addr),
        config.replication.clone(),
        0,
        &config.name,
    );

    let mut clients: Vec<LoopbackClient> = (1..=config.loopback_clients)
        .map(|i| {
            let addr = SocketAddr::from(([127, 0, 0, 1], cubesync::DEFAULT_PORT + i as u16));
            LoopbackClient {
                session: ClientSession::new(
                    SimulatedTransport::new(network.clone(), addr),
                    server_addr,
                    config.replication.clone(),
                    i as u64,
                    &format!("loopback-{i}"),
                ),
                player: Player::new(i),
            }
        })
        .collect();

    info!(
        "Server started with {} loopback clients on a simulated network",
        clients.len()
    );
    run(config, &mut server, &mut clients, Some(&network));
}

fn run<T: Transport>(
    config: &ServerConfig,
    server: &mut ServerSession<T>,
    clients: &mut [LoopbackClient],
    network: Option<&Rc<RefCell<NetworkSimulator>>>,
) {
    let mut host = Player::new(0);
    let mut timestep = FixedTimestep::new(TICK_RATE);
    let start = Instant::now();
    let mut last_time = start;
    let mut last_stats = 0.0;
    let mut frame: u64 = 0;

    loop {
        let wall = Instant::now();
        timestep.accumulate((wall - last_time).as_secs_f64());
        last_time = wall;

        while timestep.consume_tick() {
            let now = frame as f64 * timestep.dt();
            frame += 1;

            if let Some(network) = network {
                network.borrow_mut().update(now);
            }

            host.sim.step();
            server.update(now, &mut host.sim, &mut host.avatar);
            host.avatar.advance();
            if frame % (TICK_RATE as u64 * 2) == 0 {
                push_random_cube(server, &mut host.sim, frame);
            }

            for client in clients.iter_mut() {
                client.player.sim.step();
                client
                    .session
                    .update(now, &mut client.player.sim, &mut client.player.avatar);
                client.player.avatar.advance();
                if frame % (TICK_RATE as u64 * 3) == 0 {
                    toggle_grab(&mut client.session, frame);
                }
                for event in client.session.drain_events() {
                    log_event(&event);
                }
            }

            for event in server.drain_events() {
                log_event(&event);
            }

            if now - last_stats >= config.stats_interval_secs {
                last_stats = now;
                log_stats(server);
            }
        }

        if config
            .duration_secs
            .is_some_and(|limit| start.elapsed().as_secs_f64() >= limit)
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    for client in clients.iter_mut() {
        client.session.disconnect();
    }
    server.shutdown();
}

fn push_random_cube<T: Transport>(
    server: &mut ServerSession<T>,
    sim: &mut CubeSimulation,
    frame: u64,
) {
    let id = (frame / TICK_RATE as u64) as usize % NUM_CUBES;
    if server.context_mut().claim_authority(id) {
        sim.push(id, Vec3::new(0.0, 2.0, 0.5));
    }
}

fn toggle_grab(session: &mut ClientSession<SimulatedTransport>, frame: u64) {
    let Some(context) = session.context_mut() else {
        return;
    };
    let slot = context.local_slot();
    match context.holds().find(slot, Hand::Right) {
        Some(id) => {
            context.release(id);
        }
        None => {
            let id = (slot * 7 + (frame / TICK_RATE as u64) as usize) % NUM_CUBES;
            context.grab(id, Hand::Right);
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::PeerConnected { slot, addr, name } => {
            info!("{name} connected from {addr} (slot {slot})");
        }
        SessionEvent::PeerDisconnected { slot, reason } => {
            info!("slot {slot} {}", reason.as_str());
        }
        SessionEvent::ConnectionDenied { addr, reason } => {
            info!("denied {addr}: {reason}");
        }
        SessionEvent::Joined { slot } => info!("loopback client joined as slot {slot}"),
        SessionEvent::Left { reason } => info!("loopback client {}", reason.as_str()),
        SessionEvent::Error { message } => log::error!("{message}"),
    }
}

fn log_stats<T: Transport>(server: &ServerSession<T>) {
    let context = server.context();
    for slot in context.connected_slots() {
        if let Some(connection) = context.connection(slot) {
            let stats = &connection.stats;
            info!(
                "slot {slot}: rtt {:.1}ms, loss {:.1}%, sent {} ({} bytes), received {}",
                stats.rtt_ms,
                stats.packet_loss_percent(),
                stats.packets_sent,
                stats.bytes_sent,
                stats.packets_received,
            );
        }
    }
}
