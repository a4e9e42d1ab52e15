//! # Telecommand processor module
//!
//! The telecommand processor turns raw request bytes from any server into a response, executing
//! the telecommand against the data store on the way.
//!
//! Every message whose envelope decodes counts as contact with the driver station, including
//! those rejected for a bad field value. Garbage and unknown tags do not.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use std::{sync::Arc, time::Instant};

// Internal
use comms_if::{
    codec::WireCodec,
    heartbeat::HeartbeatMonitor,
    tc::{timestamp_now_s, RobotMode, Tc, TcErrorKind, TcPacket, TcResponse}
};
use crate::data_store::{self, SharedDataStore};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Decodes, executes and answers telecommands.
#[derive(Clone)]
pub struct TcProcessor {
    codec: Arc<dyn WireCodec>,

    ds: SharedDataStore,

    hb: Arc<HeartbeatMonitor>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TcProcessor {
    pub fn new(codec: Arc<dyn WireCodec>, ds: SharedDataStore, hb: Arc<HeartbeatMonitor>) -> Self {
        Self { codec, ds, hb }
    }

    pub fn codec(&self) -> &dyn WireCodec {
        self.codec.as_ref()
    }

    /// Process one raw request and return the raw response.
    pub fn dispatch(&self, raw: &[u8]) -> Vec<u8> {
        self.dispatch_at(raw, Instant::now())
    }

    /// Process one raw request received at `now`.
    pub fn dispatch_at(&self, raw: &[u8], now: Instant) -> Vec<u8> {
        let response = match self.codec.decode_tc(raw) {
            Ok(packet) => {
                self.hb.touch_at(now);
                self.exec(&packet, now)
            },
            Err(e) => {
                if e.is_recoverable() {
                    self.hb.touch_at(now);
                }
                warn!("Rejected telecommand: {}", e);
                TcResponse::error(e.kind(), e.to_string())
            }
        };

        trace!("Response: {:?}", response);

        self.codec.encode_response(&response)
    }

    /// Execute a telecommand.
    ///
    /// Mutates the datastore to drive the mode manager and locomotion control. The heartbeat is
    /// not touched here, that is the caller's job.
    pub fn exec(&self, packet: &TcPacket, now: Instant) -> TcResponse {
        // Handle different Tcs
        match packet.tc {
            Tc::Ping => {
                trace!("Recieved Ping");
                let mode = data_store::lock(&self.ds).mode();

                TcResponse::success()
                    .with_mode(mode)
                    .with_timestamp(Some(packet.timestamp_s.unwrap_or_else(timestamp_now_s)))
            },
            Tc::Joystick(frame) => {
                // Clamping cannot give a meaningful value for NaN or infinity
                if !frame.is_finite() {
                    return TcResponse::error(
                        TcErrorKind::Validation,
                        format!("Joystick axes must be finite, found {:?}", frame.to_array())
                    )
                }

                let mut ds = data_store::lock(&self.ds);
                let forwarded = ds.apply_drive(&frame);
                trace!("Joystick {:?}, forwarded: {}", frame.to_array(), forwarded);

                TcResponse::success().with_mode(ds.mode())
            },
            Tc::Button { id, action } => {
                let mut ds = data_store::lock(&self.ds);
                ds.record_button(id, action);

                TcResponse::success().with_mode(ds.mode())
            },
            Tc::SetMode(mode) => {
                debug!("Recieved SetMode({})", mode);
                data_store::lock(&self.ds).set_mode(mode, now);

                TcResponse::success().with_mode(mode)
            },
            Tc::Reset => {
                debug!("Recieved Reset");
                data_store::lock(&self.ds).reset();

                TcResponse::success().with_mode(RobotMode::Stopped)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use comms_if::{
        codec::{JsonCodec, LineCodec},
        eqpt::mech::MechDems,
        tc::TcStatus
    };
    use crate::{
        data_store::{DataStore, SafeModeCause},
        eqpt::RecordingActuator
    };

    struct Fixture {
        proc: TcProcessor,
        ds: SharedDataStore,
        hb: Arc<HeartbeatMonitor>,
        act: RecordingActuator
    }

    fn fixture(codec: Arc<dyn WireCodec>) -> Fixture {
        let act = RecordingActuator::new();
        let ds = DataStore::new(Box::new(act.clone())).into_shared();
        let hb = Arc::new(HeartbeatMonitor::new(Duration::from_secs(1)));

        // The link is up
        data_store::lock(&ds).make_unsafe(SafeModeCause::HeartbeatLost).unwrap();

        Fixture {
            proc: TcProcessor::new(codec, ds.clone(), hb.clone()),
            ds,
            hb,
            act
        }
    }

    fn json(f: &Fixture, req: &str) -> TcResponse {
        let raw = f.proc.dispatch(req.as_bytes());
        serde_json::from_slice(&raw).unwrap()
    }

    fn line(f: &Fixture, req: &str) -> String {
        String::from_utf8(f.proc.dispatch(req.as_bytes())).unwrap()
    }

    #[test]
    fn test_joystick_forwarded_only_in_teleop() {
        let f = fixture(Arc::new(JsonCodec));

        let rsp = json(&f, r#"{"type": "mode", "mode": "TELEOP"}"#);
        assert_eq!(rsp.mode, Some(RobotMode::Teleop));

        let req = r#"{"type": "joystick", "lx": 0, "ly": 0.5, "rx": 0, "ry": 0}"#;
        let rsp = json(&f, req);
        assert!(rsp.is_success());
        assert_eq!(f.act.demands(), vec![MechDems { drv_speed: [0.5; 4] }]);

        // Reset zeroes, then the same joystick is discarded
        assert!(json(&f, r#"{"type": "reset"}"#).is_success());
        let count = f.act.demands().len();
        assert_eq!(f.act.demands().last(), Some(&MechDems::zero()));

        let rsp = json(&f, req);
        assert!(rsp.is_success());
        assert_eq!(rsp.mode, Some(RobotMode::Stopped));
        assert_eq!(f.act.demands().len(), count);
    }

    #[test]
    fn test_ping_echoes_timestamp() {
        let f = fixture(Arc::new(JsonCodec));

        let rsp = json(&f, r#"{"type": "ping", "timestamp": 1234.5}"#);
        assert_eq!(rsp.status, TcStatus::Success);
        assert_eq!(rsp.timestamp, Some(1234.5));
        assert_eq!(rsp.mode, Some(RobotMode::Stopped));

        // Without a client timestamp the robot's clock is used
        let rsp = json(&f, r#"{"type": "ping"}"#);
        assert!(rsp.timestamp.unwrap() > 0.0);
    }

    #[test]
    fn test_contact_rules() {
        let f = fixture(Arc::new(JsonCodec));

        // Garbage and unknown tags are not contact
        let rsp = json(&f, "{not json");
        assert_eq!(rsp.error, Some(TcErrorKind::Malformed));
        let rsp = json(&f, r#"{"type": "dance"}"#);
        assert_eq!(rsp.error, Some(TcErrorKind::UnknownCommand));
        assert_eq!(f.hb.last_contact(), None);

        // A bad mode is rejected but counts as contact
        let rsp = json(&f, r#"{"type": "mode", "mode": "TURBO"}"#);
        assert_eq!(rsp.error, Some(TcErrorKind::Validation));
        assert!(f.hb.last_contact().is_some());
        assert_eq!(data_store::lock(&f.ds).mode(), RobotMode::Stopped);
    }

    #[test]
    fn test_line_binding() {
        let f = fixture(Arc::new(LineCodec));

        assert_eq!(line(&f, "MODE TELEOP"), "ACK");
        assert_eq!(line(&f, "JOYSTICKS 1,0,0,0"), "ACK");
        assert_eq!(f.act.demands(), vec![MechDems { drv_speed: [1.0, -1.0, -1.0, 1.0] }]);

        assert!(line(&f, "JOYSTICKS nan,0,0,0").starts_with("ERR "));
        assert_eq!(f.act.demands().len(), 1);

        assert!(line(&f, "WIBBLE").starts_with("ERR "));
        assert_eq!(line(&f, "BTN 4 UP"), "ACK");
        assert_eq!(line(&f, "RESET"), "ACK");
        assert_eq!(line(&f, "RESET"), "ACK");
        assert_eq!(data_store::lock(&f.ds).mode(), RobotMode::Stopped);
    }

    #[test]
    fn test_joystick_discarded_in_auto() {
        let f = fixture(Arc::new(LineCodec));

        assert_eq!(line(&f, "MODE AUTO"), "ACK");
        assert_eq!(line(&f, "JOYSTICKS 0,0.5,0,0"), "ACK");
        assert!(f.act.demands().is_empty());
        assert_eq!(data_store::lock(&f.ds).loco_ctrl_output, MechDems::zero());
    }

    #[test]
    fn test_joystick_not_forwarded_while_lost() {
        let f = fixture(Arc::new(LineCodec));

        assert_eq!(line(&f, "MODE TELEOP"), "ACK");
        data_store::lock(&f.ds).make_safe(SafeModeCause::HeartbeatLost);
        let count = f.act.demands().len();

        // Contact, but the watchdog has not cleared the lost flag yet
        assert_eq!(line(&f, "JOYSTICKS 0,0.5,0,0"), "ACK");
        assert_eq!(f.act.demands().len(), count);
    }
}
