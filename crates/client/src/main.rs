mod config;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use config::ClientConfig;
use cubesync::{
    ClientSession, CubeSimulation, FixedTimestep, Hand, NUM_CUBES, ReplicationConfig,
    ScriptedAvatar, SessionEvent, TICK_RATE, UdpTransport,
};

#[derive(Parser)]
#[command(name = "cubesync-client")]
#[command(about = "Headless cube replication client")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27016",
        help = "Server address to connect to"
    )]
    server: String,

    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(long, help = "Client id; random when omitted")]
    id: Option<u64>,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<f64>,

    #[arg(long, default_value_t = 6, help = "Jitter buffer delay in frames")]
    jitter_delay: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr: SocketAddr = args
        .server
        .parse()
        .with_context(|| format!("invalid server address {}", args.server))?;

    let config = ClientConfig {
        server_addr,
        name: args.name,
        client_id: args.id.unwrap_or_else(rand::random),
        duration_secs: args.duration,
        replication: ReplicationConfig {
            jitter_delay_frames: args.jitter_delay,
            ..Default::default()
        },
        ..Default::default()
    };

    let transport = UdpTransport::bind(&config.bind_addr)
        .with_context(|| format!("binding {}", config.bind_addr))?;
    let mut session = ClientSession::new(
        transport,
        config.server_addr,
        config.replication.clone(),
        config.client_id,
        &config.name,
    );
    info!(
        "Connecting to {} from {} as {} ({:016x})",
        config.server_addr,
        session.local_addr(),
        config.name,
        config.client_id
    );

    run(&config, &mut session);
    session.disconnect();
    info!("Client shutting down");
    Ok(())
}

fn run(config: &ClientConfig, session: &mut ClientSession<UdpTransport>) {
    let mut sim = CubeSimulation::new(NUM_CUBES);
    let mut avatar = ScriptedAvatar::new(0);
    let mut timestep = FixedTimestep::new(TICK_RATE);
    let start = Instant::now();
    let mut last_time = start;
    let mut last_grab = 0.0;
    let mut last_stats = 0.0;
    let mut frame: u64 = 0;

    loop {
        let wall = Instant::now();
        timestep.accumulate((wall - last_time).as_secs_f64());
        last_time = wall;

        while timestep.consume_tick() {
            let now = frame as f64 * timestep.dt();
            frame += 1;

            sim.step();
            session.update(now, &mut sim, &mut avatar);
            avatar.advance();

            for event in session.drain_events() {
                match event {
                    SessionEvent::Joined { slot } => {
                        info!("Joined as slot {slot}");
                        avatar = ScriptedAvatar::new(slot);
                    }
                    SessionEvent::Left { reason } => info!("Left server: {}", reason.as_str()),
                    SessionEvent::Error { message } => log::error!("{message}"),
                    other => log::debug!("{other:?}"),
                }
            }

            if now - last_grab >= config.grab_interval_secs {
                last_grab = now;
                toggle_grab(session, frame);
            }
            if now - last_stats >= config.stats_interval_secs {
                last_stats = now;
                log_stats(session);
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
}

fn toggle_grab(session: &mut ClientSession<UdpTransport>, frame: u64) {
    let Some(context) = session.context_mut() else {
        return;
    };
    let slot = context.local_slot();
    match context.holds().find(slot, Hand::Right) {
        Some(id) => {
            info!("Releasing cube {id}");
            context.release(id);
        }
        None => {
            let id = (slot * 7 + (frame / TICK_RATE as u64) as usize) % NUM_CUBES;
            if context.grab(id, Hand::Right) {
                info!("Grabbed cube {id}");
            }
        }
    }
}

fn log_stats(session: &ClientSession<UdpTransport>) {
    let Some(connection) = session
        .context()
        .and_then(|context| context.connection(cubesync::SERVER_SLOT))
    else {
        return;
    };
    let stats = &connection.stats;
    info!(
        "rtt {:.1}ms (+/-{:.1}), loss {:.1}%, sent {} ({} bytes), received {} ({} bytes)",
        stats.rtt_ms,
        stats.rtt_variance,
        stats.packet_loss_percent(),
        stats.packets_sent,
        stats.bytes_sent,
        stats.packets_received,
        stats.bytes_received,
    );
}
