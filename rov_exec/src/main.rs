//! Main robot-side executable entry point.
//!
//! # Architecture
//!
//! The executable is a small set of threads sharing one data store:
//!
//!     - TcServer: receives telecommands over the configured binding and executes them
//!     - Watchdog: polls the heartbeat and forces safe mode when the driver station goes silent
//!     - TmServer: publishes telemetry (JSON binding only)
//!     - Main loop: advances the match clock every cycle
//!
//! Ctrl-C triggers a shutdown signal observed by every thread. On the way out the robot is put into
//! safe mode, zeroing the motors, before the threads are joined.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{debug, info};
use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant}
};
use structopt::StructOpt;

// Internal
use comms_if::{codec::Binding, heartbeat::HeartbeatMonitor, net::zmq};
use rov_lib::{
    data_store::{self, DataStore, SafeModeCause},
    eqpt::{LogActuator, NoSensors},
    params::RovExecParams,
    tc_processor::TcProcessor,
    tc_server::{LineTcServer, TcServer, ZmqTcServer},
    tm_server::TmServer,
    watchdog
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

/// Maximum time to wait for each thread to stop on shutdown.
const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "rov_exec", about = "Robot side of the teleoperation link")]
struct Args {
    /// Parameter file name, relative to the params directory
    #[structopt(long, default_value = "rov_exec.toml")]
    params: String,

    /// Wire binding to serve, overriding the parameter file (json or line)
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

    // Initialise session
    let session = Session::new(
        "rov_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // ---- LOAD PARAMETERS ----

    let mut params: RovExecParams = util::params::load(&args.params)
        .wrap_err("Could not load rov_exec params")?;

    if let Some(binding) = args.binding {
        params.binding = binding;
    }

    // Initialise logger
    let log_level = parse_level(&params.log_level)
        .wrap_err("Invalid log level in rov_exec params")?;
    logger_init(log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Teleoperation Robot Executable\n");
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

    // ---- INITIALISE DATASTORE ----

    let ds = DataStore::new(Box::new(LogActuator)).into_shared();
    let hb = Arc::new(HeartbeatMonitor::new(params.heartbeat_timeout()));
    let processor = TcProcessor::new(params.binding.codec(), ds.clone(), hb.clone());

    // ---- START THREADS ----

    let zmq_ctx = zmq::Context::new();
    let mut threads: Vec<(&str, JoinHandle<()>)> = Vec::new();

    threads.push(("Watchdog", watchdog::spawn(
        hb.clone(),
        ds.clone(),
        params.watchdog_period(),
        shutdown.clone()
    ).wrap_err("Failed to start the watchdog")?));
    info!("Watchdog started");

    let tc_server = match params.binding {
        Binding::Json => TcServer::Zmq(
            ZmqTcServer::new(&zmq_ctx, &params.tc_endpoint, processor)
                .wrap_err("Failed to initialise the TcServer")?
        ),
        Binding::Line => TcServer::Line(
            LineTcServer::bind(&params.line_listen_addr, processor)
                .wrap_err("Failed to initialise the TcServer")?
        )
    };
    threads.push(("TcServer", tc_server.spawn(shutdown.clone())
        .wrap_err("Failed to start the TcServer")?));
    info!("TcServer started ({} binding)", params.binding);

    match params.binding {
        Binding::Json => {
            let tm_server = TmServer::new(&zmq_ctx, &params.tm_endpoint)
                .wrap_err("Failed to initialise the TmServer")?;
            threads.push(("TmServer", tm_server.spawn(
                ds.clone(),
                Box::new(NoSensors),
                params.tm_period(),
                shutdown.clone()
            ).wrap_err("Failed to start the TmServer")?));
            info!("TmServer started");
        },
        Binding::Line => info!("Telemetry is not published on the line binding")
    }

    info!("Initialisation complete, entering main loop\n");

    // ---- MAIN LOOP ----

    while !shutdown.wait_timeout(params.cycle_period()) {
        if let Some(event) = data_store::lock(&ds).update(Instant::now()) {
            debug!("Mode event: {:?}", event);
        }
    }

    // ---- SHUTDOWN ----

    info!("Shutting down");
    data_store::lock(&ds).make_safe(SafeModeCause::Shutdown);

    for (name, jh) in threads {
        join_bounded(name, jh, THREAD_JOIN_TIMEOUT);
    }

    session.exit();

    Ok(())
}
