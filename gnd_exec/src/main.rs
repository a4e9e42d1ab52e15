//! Main driver station executable entry point.
//!
//! # Architecture
//!
//! Operator input is read one command per line from stdin, in the same text form the line binding
//! uses on the wire, for example `JOYSTICKS 0,0.5,0,0` or `MODE TELEOP`. `STATUS` prints the link
//! state and `QUIT` (or end of input) exits.
//!
//! Threads:
//!
//!     - ConnMgr: hunts through the address pool and keeps one live session
//!     - Pinger: pings the robot to measure the round trip time
//!     - TmClient: follows the robot's telemetry (JSON binding only)
//!     - Stdin: reads operator commands and hands them to the main loop

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{info, warn};
use std::{
    io::{self, BufRead},
    sync::{Arc, atomic::{AtomicBool, Ordering}, mpsc},
    thread::{self, JoinHandle},
    time::Duration
};
use structopt::StructOpt;

// Internal
use comms_if::{
    codec::{Binding, LineCodec},
    net::{zmq, Address, AddressPool}
};
use gnd_lib::{
    conn_mgr::{ConnMgr, ConnMgrParams},
    driver::DriverStation,
    params::GndExecParams,
    tc_client::connector_for,
    tm_client::TmClient
};
use util::{
    host,
    logger::{logger_init, parse_level},
    session::Session,
    shutdown::{join_bounded, ShutdownSignal}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Period at which the main loop checks for shutdown while waiting for input.
const INPUT_POLL_PERIOD: Duration = Duration::from_millis(100);

/// Telemetry receive timeout, also the period at which the telemetry thread follows reconnects.
const TM_RECV_TIMEOUT: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "gnd_exec", about = "Driver station side of the teleoperation link")]
struct Args {
    /// Parameter file name, relative to the params directory
    #[structopt(long, default_value = "gnd_exec.toml")]
    params: String,

    /// Wire binding the robot serves, overriding the parameter file (json or line)
    #[structopt(long)]
    binding: Option<Binding>
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new(
        "gnd_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    let mut params: GndExecParams = util::params::load(&args.params)
        .wrap_err("Could not load gnd_exec params")?;

    if let Some(binding) = args.binding {
        params.binding = binding;
    }

    let log_level = parse_level(&params.log_level)
        .wrap_err("Invalid log level in gnd_exec params")?;
    logger_init(log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Teleoperation Driver Station\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    info!("Exec parameters loaded: {:#?}", params);

    // ---- SHUTDOWN HANDLING ----

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            shutdown.trigger();
        }).wrap_err("Failed to set the Ctrl-C handler")?;
    }

    // ---- CONNECTION ----

    let zmq_ctx = zmq::Context::new();

    let pool = AddressPool::new(params.addresses.clone())
        .wrap_err("Invalid robot address pool")?;
    let connector = connector_for(
        params.binding,
        &zmq_ctx,
        params.connect_timeout(),
        params.request_timeout()
    );

    let conn = Arc::new(ConnMgr::new(connector, pool, ConnMgrParams {
        hunt_retry: params.hunt_retry(),
        connected_retry: params.connected_retry(),
        link_timeout: params.link_timeout()
    }));
    {
        // Failed hunting attempts are also reported, only log actual changes
        let was_up = AtomicBool::new(false);
        conn.add_observer(Box::new(move |connected: bool, addr: Option<&Address>| {
            let changed = was_up.swap(connected, Ordering::Relaxed) != connected;
            match (connected, addr) {
                (true, Some(a)) => info!("Robot link up ({})", a),
                (false, _) if changed => warn!("Robot link down"),
                _ => ()
            }
        }));
    }
    conn.start().wrap_err("Failed to start the connection manager")?;

    let driver = Arc::new(DriverStation::new(conn.clone(), params.joystick_threshold));

    // ---- START THREADS ----

    let mut threads: Vec<(&str, JoinHandle<()>)> = Vec::new();

    threads.push(("Pinger", driver.spawn_pinger(params.ping_interval(), shutdown.clone())
        .wrap_err("Failed to start the pinger")?));

    match params.binding {
        Binding::Json => {
            threads.push(("TmClient", spawn_tm_follower(
                zmq_ctx.clone(),
                driver.clone(),
                params.tm_port,
                shutdown.clone()
            ).wrap_err("Failed to start the telemetry client")?));
        },
        Binding::Line => info!("Telemetry is not available on the line binding")
    }

    // Not joined, a read from stdin cannot be interrupted
    let input_rx = spawn_stdin_reader().wrap_err("Failed to start the stdin reader")?;

    info!("Initialisation complete, reading commands from stdin\n");

    // ---- MAIN LOOP ----

    while !shutdown.is_triggered() {
        let line = match input_rx.recv_timeout(INPUT_POLL_PERIOD) {
            Ok(l) => l,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("End of input");
                break
            }
        };

        let line = line.trim();
        match line.to_ascii_uppercase().as_str() {
            "" => continue,
            "QUIT" => break,
            "STATUS" => {
                print_status(&driver);
                continue
            },
            _ => ()
        }

        let packet = match LineCodec.parse_line(line) {
            Ok(p) => p,
            Err(e) => {
                warn!("Invalid command {:?}: {}", line, e);
                continue
            }
        };

        match driver.send(packet.tc) {
            Ok(Some(rsp)) if rsp.is_success() => info!("{:?} accepted", packet.tc.tc_type()),
            // Rejections are logged by the driver station, suppressed frames need no log
            Ok(_) => (),
            Err(e) => warn!("Could not send {:?}: {}", packet.tc.tc_type(), e)
        }
    }

    // ---- SHUTDOWN ----

    info!("Shutting down");
    shutdown.trigger();
    conn.stop();

    for (name, jh) in threads {
        join_bounded(name, jh, THREAD_JOIN_TIMEOUT);
    }

    session.exit();

    Ok(())
}

/// Follow the telemetry of whichever robot address is live, resubscribing after every reconnect.
fn spawn_tm_follower(
    ctx: zmq::Context,
    driver: Arc<DriverStation>,
    tm_port: u16,
    shutdown: ShutdownSignal
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("tm_client".into())
        .spawn(move || {
            let mut client: Option<TmClient> = None;

            while !shutdown.is_triggered() {
                let target = driver.conn().active_session().map(|a| a.with_port(tm_port));

                let stale = match (&client, &target) {
                    (Some(c), Some(t)) => c.address() != t,
                    (None, None) => false,
                    _ => true
                };

                if stale {
                    client = match &target {
                        Some(t) => match TmClient::new(&ctx, t, TM_RECV_TIMEOUT) {
                            Ok(c) => {
                                info!("Following telemetry from {}", t);
                                Some(c)
                            },
                            Err(e) => {
                                warn!("Could not subscribe to telemetry from {}: {}", t, e);
                                None
                            }
                        },
                        None => None
                    };
                }

                match &client {
                    Some(c) => match c.recv() {
                        Ok(Some(tm)) => driver.on_telemetry(tm),
                        Ok(None) => (),
                        Err(e) => warn!("Telemetry error: {}", e)
                    },
                    None => {
                        shutdown.wait_timeout(TM_RECV_TIMEOUT);
                    }
                }
            }
        })
}

/// Read stdin line by line on a background thread. The channel closes at end of input.
fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break
                        }
                    },
                    Err(e) => {
                        warn!("Could not read stdin: {}", e);
                        break
                    }
                }
            }
        })?;

    Ok(rx)
}

fn print_status(driver: &DriverStation) {
    let conn = driver.conn();

    match conn.active_session() {
        Some(addr) => info!(
            "Connected to {}, robot in {}, ping {}",
            addr,
            driver.mode(),
            match driver.last_ping_rtt() {
                Some(rtt) => format!("{:.1} ms", rtt.as_secs_f64() * 1e3),
                None => String::from("unknown")
            }
        ),
        None => info!("Not connected ({:?})", conn.state())
    }

    if conn.link_lost() {
        warn!("Link lost");
    }

    if let Some(tm) = driver.last_tm() {
        info!(
            "Telemetry: speeds {:?}, safe {}, clock {:?}, overtime {}",
            tm.motor_speeds, tm.safe, tm.match_time_s, tm.overtime
        );
    }
}
