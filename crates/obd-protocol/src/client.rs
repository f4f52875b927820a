//! ELM327 Transport Session
//!
//! Blocking request/response exchange with an ELM327-compatible adapter.
//! The link and the cached addressing live behind one mutex so that a
//! descriptor's `ATSH`/`ATCF`/`ATCM` and its request can never interleave
//! with another caller's traffic.

use crate::error::ObdError;
use crate::isotp::reassemble;
use crate::link::{LinkConfig, SerialLink};
use crate::protocol::ObdProtocol;
use crate::session::SessionState;
use parking_lot::{Mutex, MutexGuard};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Adapter prompt terminating every response
const PROMPT: u8 = b'>';

/// Initialization sequence: command and the text a healthy adapter answers with
const INIT_SEQUENCE: &[(&str, &str)] = &[
    ("ATZ", "ELM327"),
    ("ATE0", "OK"),
    ("ATL0", "OK"),
    ("ATS0", "OK"),
    ("ATH1", "OK"),
    ("ATSTFF", "OK"),
    ("ATFE", "OK"),
];

/// Text the adapter returned for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterReply {
    /// Everything before the prompt, CR/LF trimmed
    pub text: String,
    /// False when an expected substring was requested and is missing
    pub expectation_met: bool,
}

impl AdapterReply {
    /// Last non-empty line of the reply
    pub fn last_line(&self) -> &str {
        self.text
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or("")
    }
}

/// Link plus the addressing it is configured with
struct Link {
    port: Box<dyn SerialLink>,
    state: SessionState,
    timeout: Duration,
}

impl Link {
    fn exchange(&mut self, command: &str, expect: Option<&str>) -> Result<AdapterReply, ObdError> {
        debug!("Sending command to adapter: {}", command);
        self.port.discard_input()?;
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\r")?;
        self.port.flush()?;

        let deadline = Instant::now() + self.timeout;
        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            if Instant::now() >= deadline {
                warn!("Adapter did not answer {} within {:?}", command, self.timeout);
                return Err(ObdError::TransportTimeout(self.timeout.as_millis() as u64));
            }
            match self.port.read(&mut chunk) {
                Ok(0) => continue,
                Ok(n) => {
                    if let Some(end) = chunk[..n].iter().position(|&b| b == PROMPT) {
                        received.extend_from_slice(&chunk[..end]);
                        break;
                    }
                    received.extend_from_slice(&chunk[..n]);
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let text = String::from_utf8_lossy(&received)
            .trim_matches(|c| c == '\r' || c == '\n')
            .to_string();
        debug!("Response from adapter: {:?}", text);

        let expectation_met = match expect {
            Some(expected) if !text.contains(expected) => {
                warn!(
                    "Expected {:?} in response to {}, got {:?}",
                    expected, command, text
                );
                false
            }
            _ => true,
        };
        Ok(AdapterReply {
            text,
            expectation_met,
        })
    }

    fn send_at(&mut self, command: &str, expect: Option<&str>) -> Result<String, ObdError> {
        let reply = self.exchange(command, expect)?;
        if !reply.expectation_met {
            return Err(ObdError::UnexpectedResponse {
                command: command.to_string(),
                expected: expect.unwrap_or_default().to_string(),
                response: reply.text,
            });
        }
        Ok(reply.last_line().to_string())
    }

    /// Issue the setting only when the formatted value changed
    fn configure(&mut self, setting: Setting, value: u32) -> Result<bool, ObdError> {
        let formatted = self.state.format_id(value);
        if setting.cached(&mut self.state).as_deref() == Some(formatted.as_str()) {
            return Ok(false);
        }
        self.send_at(&format!("{}{formatted}", setting.command()), Some("OK"))?;
        *setting.cached(&mut self.state) = Some(formatted);
        Ok(true)
    }
}

/// Addressing values cached in [`SessionState`]
#[derive(Debug, Clone, Copy)]
enum Setting {
    BusId,
    RxFilter,
    RxMask,
}

impl Setting {
    fn command(self) -> &'static str {
        match self {
            Setting::BusId => "ATSH",
            Setting::RxFilter => "ATCF",
            Setting::RxMask => "ATCM",
        }
    }

    fn cached(self, state: &mut SessionState) -> &mut Option<String> {
        match self {
            Setting::BusId => &mut state.bus_id,
            Setting::RxFilter => &mut state.rx_filter,
            Setting::RxMask => &mut state.rx_mask,
        }
    }
}

/// ELM327 session owning the serial link
pub struct Elm327 {
    link: Mutex<Link>,
}

impl Elm327 {
    /// Open the configured serial device and initialize the adapter
    pub fn open(config: &LinkConfig) -> Result<Self, ObdError> {
        let port = config.open_serial()?;
        Self::with_link(port, config.response_timeout())
    }

    /// Initialize the adapter over an already open link
    pub fn with_link(port: Box<dyn SerialLink>, timeout: Duration) -> Result<Self, ObdError> {
        let session = Self {
            link: Mutex::new(Link {
                port,
                state: SessionState::default(),
                timeout,
            }),
        };
        session.initialize()?;
        Ok(session)
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock()
    }

    fn initialize(&self) -> Result<(), ObdError> {
        info!("Initializing ELM327 adapter");
        let mut link = self.lock();
        for &(command, expect) in INIT_SEQUENCE {
            link.send_at(command, Some(expect)).map_err(|e| {
                ObdError::Configuration(format!("adapter rejected {command}: {e}"))
            })?;
        }
        info!("ELM327 adapter initialized successfully");
        Ok(())
    }

    /// Send raw text and read until the prompt
    pub fn exchange(&self, command: &str, expect: Option<&str>) -> Result<AdapterReply, ObdError> {
        self.lock().exchange(command, expect)
    }

    /// Send an AT command; a missing expectation is an error. Returns the last line.
    pub fn send_at(&self, command: &str, expect: Option<&str>) -> Result<String, ObdError> {
        self.lock().send_at(command, expect)
    }

    /// Activate a CAN protocol variant
    pub fn select_protocol(&self, protocol: ObdProtocol) -> Result<(), ObdError> {
        if !protocol.is_can() {
            return Err(ObdError::Configuration(format!(
                "{protocol:?} is not an ISO-TP capable protocol"
            )));
        }
        info!("Setting OBD protocol to {:?}", protocol);
        let mut link = self.lock();
        link.send_at(protocol.to_elm_command(), Some("OK"))?;
        if link.state.extended != protocol.is_extended() {
            // Cached ids were formatted for the other width
            link.state = SessionState {
                extended: protocol.is_extended(),
                ..SessionState::default()
            };
        }
        Ok(())
    }

    /// Identifier for outgoing frames. Returns whether a command was sent.
    pub fn set_bus_id(&self, id: u32) -> Result<bool, ObdError> {
        self.lock().configure(Setting::BusId, id)
    }

    /// Receive filter. Returns whether a command was sent.
    pub fn set_rx_filter(&self, id: u32) -> Result<bool, ObdError> {
        self.lock().configure(Setting::RxFilter, id)
    }

    /// Receive mask. Returns whether a command was sent.
    pub fn set_rx_mask(&self, mask: u32) -> Result<bool, ObdError> {
        self.lock().configure(Setting::RxMask, mask)
    }

    /// Send a diagnostic request without touching addressing
    pub fn send_command(&self, command: &[u8]) -> Result<String, ObdError> {
        Ok(self.lock().exchange(&hex::encode_upper(command), None)?.text)
    }

    /// Address `tx`, listen on `rx`, then send a diagnostic request.
    ///
    /// Addressing and request happen under one lock acquisition.
    pub fn request(&self, command: &[u8], tx: u32, rx: u32) -> Result<String, ObdError> {
        Self::addressed_exchange(&mut self.lock(), command, tx, rx)
    }

    /// Like [`Elm327::request`], then reassemble the ISO-TP reply.
    ///
    /// The frame layout is read from the same lock acquisition that sent the
    /// request, so a concurrent protocol switch cannot change it in between.
    pub fn request_payload(&self, command: &[u8], tx: u32, rx: u32) -> Result<Vec<u8>, ObdError> {
        let mut link = self.lock();
        let response = Self::addressed_exchange(&mut link, command, tx, rx)?;
        reassemble(&response, link.state.extended)
    }

    fn addressed_exchange(
        link: &mut Link,
        command: &[u8],
        tx: u32,
        rx: u32,
    ) -> Result<String, ObdError> {
        link.configure(Setting::BusId, tx)?;
        link.configure(Setting::RxFilter, rx)?;
        let mask = link.state.full_mask();
        link.configure(Setting::RxMask, mask)?;
        Ok(link.exchange(&hex::encode_upper(command), None)?.text)
    }

    /// Whether 29-bit addressing is active
    pub fn is_extended(&self) -> bool {
        self.lock().state.extended
    }

    /// Snapshot of the cached addressing
    pub fn session_state(&self) -> Result<SessionState, ObdError> {
        Ok(self.lock().state.clone())
    }

    /// Voltage at the OBD port as measured by the adapter
    pub fn supply_voltage(&self) -> Result<f64, ObdError> {
        let line = self.send_at("ATRV", None)?;
        let volts: f64 = line
            .trim()
            .trim_end_matches(['V', 'v'])
            .parse()
            .map_err(|_| ObdError::InvalidResponse(format!("supply voltage {line:?}")))?;
        Ok((volts * 100.0).round() / 100.0)
    }

    /// Calibrate the adapter's voltage reading against an external measurement
    pub fn calibrate_supply_voltage(&self, volts: f64) -> Result<(), ObdError> {
        info!("Calibrating OBD voltage to {:.2} V", volts);
        self.send_at(&format!("ATCV{:04.0}", volts * 100.0), Some("OK"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLink;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn session() -> (Elm327, MockLink) {
        let link = MockLink::new();
        let session = Elm327::with_link(Box::new(link.clone()), TIMEOUT).unwrap();
        link.clear_commands();
        (session, link)
    }

    #[test]
    fn test_initialization_sequence() {
        let link = MockLink::new();
        Elm327::with_link(Box::new(link.clone()), TIMEOUT).unwrap();
        assert_eq!(
            link.commands(),
            vec!["ATZ", "ATE0", "ATL0", "ATS0", "ATH1", "ATSTFF", "ATFE"]
        );
    }

    #[test]
    fn test_initialization_rejected() {
        let link = MockLink::new();
        link.respond("ATH1", "?");
        let result = Elm327::with_link(Box::new(link), TIMEOUT);
        assert!(matches!(result, Err(ObdError::Configuration(_))));
    }

    #[test]
    fn test_redundant_bus_id_not_resent() {
        let (session, link) = session();
        assert!(session.set_bus_id(0x7E4).unwrap());
        assert!(!session.set_bus_id(0x7E4).unwrap());
        assert_eq!(link.commands(), vec!["ATSH7E4"]);

        assert!(session.set_bus_id(0x7E6).unwrap());
        assert_eq!(link.commands(), vec!["ATSH7E4", "ATSH7E6"]);
    }

    #[test]
    fn test_failed_configuration_keeps_cache() {
        let (session, link) = session();
        link.respond("ATCF7EC", "?");
        assert!(session.set_rx_filter(0x7EC).is_err());
        assert_eq!(session.session_state().unwrap().rx_filter, None);
        link.respond("ATCF7EC", "OK");
        assert!(session.set_rx_filter(0x7EC).unwrap());
    }

    #[test]
    fn test_extended_protocol_widens_ids() {
        let (session, link) = session();
        session
            .select_protocol(ObdProtocol::Iso15765_4Can29bit500)
            .unwrap();
        assert!(session.is_extended());
        session.set_rx_mask(0x1FFF_FFFF).unwrap();
        assert_eq!(link.commands(), vec!["ATSP7", "ATCM1FFFFFFF"]);
    }

    #[test]
    fn test_non_can_protocol_rejected() {
        let (session, link) = session();
        let err = session.select_protocol(ObdProtocol::J1850Pwm).unwrap_err();
        assert!(matches!(err, ObdError::Configuration(_)));
        assert!(link.commands().is_empty());
    }

    #[test]
    fn test_request_configures_addressing_once() {
        let (session, link) = session();
        link.respond("2101", "7EC0561010203FFAAAA");
        session
            .select_protocol(ObdProtocol::Iso15765_4Can11bit500)
            .unwrap();
        let reply = session.request(&[0x21, 0x01], 0x7E4, 0x7EC).unwrap();
        assert_eq!(reply, "7EC0561010203FFAAAA");
        session.request(&[0x21, 0x01], 0x7E4, 0x7EC).unwrap();
        assert_eq!(
            link.commands(),
            vec!["ATSP6", "ATSH7E4", "ATCF7EC", "ATCM7FF", "2101", "2101"]
        );
    }

    #[test]
    fn test_request_payload_uses_active_addressing() {
        let (session, link) = session();
        link.respond("2180", "18DAF1EE0561800A0B0CAAAA");
        session
            .select_protocol(ObdProtocol::Iso15765_4Can29bit500)
            .unwrap();
        let payload = session
            .request_payload(&[0x21, 0x80], 0x18DA_EEF1, 0x18DA_F1EE)
            .unwrap();
        assert_eq!(payload, vec![0x61, 0x80, 0x0A, 0x0B, 0x0C]);

        // Same reply read back in 11-bit layout no longer fits a frame line
        session
            .select_protocol(ObdProtocol::Iso15765_4Can11bit500)
            .unwrap();
        let err = session
            .request_payload(&[0x21, 0x80], 0x7E6, 0x7EE)
            .unwrap_err();
        assert!(matches!(err, ObdError::Framing(_)));
    }

    #[test]
    fn test_exchange_timeout() {
        let (session, link) = session();
        link.set_silent(true);
        let err = session.exchange("2101", None).unwrap_err();
        assert!(matches!(err, ObdError::TransportTimeout(50)));
        assert!(err.is_no_data());
    }

    #[test]
    fn test_missing_expectation_is_reported_not_fatal() {
        let (session, link) = session();
        link.respond("ATI", "ELM327 v2.1");
        let reply = session.exchange("ATI", Some("OBDLink")).unwrap();
        assert!(!reply.expectation_met);
        assert_eq!(reply.text, "ELM327 v2.1");
    }

    #[test]
    fn test_stale_input_discarded() {
        let (session, link) = session();
        link.inject_stale(b"NO DATA\r\r>");
        link.respond("0100", "7E8064100BE3FA813");
        let reply = session.exchange("0100", None).unwrap();
        assert_eq!(reply.text, "7E8064100BE3FA813");
    }

    #[test]
    fn test_supply_voltage() {
        let (session, link) = session();
        link.respond("ATRV", "12.637V");
        assert!((session.supply_voltage().unwrap() - 12.64).abs() < 1e-9);
        session.calibrate_supply_voltage(12.5).unwrap();
        assert_eq!(link.commands().last().unwrap(), "ATCV1250");
    }
}
