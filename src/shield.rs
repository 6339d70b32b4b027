use crate::acquisition_config::{
    channel_mask, source_mask, AnalogTrigger, CommandParams, DigitalTrigger, LedBlink,
    SampleRate, StopCondition, TriggerCondition,
};
use crate::codec::{
    decode_data_blob, CodecError, Command, DataBlob, Predicate, Source, BLOB_LEN, BLOB_MARKER,
    STRING_MARKER,
};
use crate::handlers::{
    Channel, HandlerConfig, HandlerRegistry, Sample, SampleHandler, StatusHandler, UnknownHandler,
};
use crate::status::StatusReport;
use crate::transport::{read_byte, read_line, read_up_to, trim_line_ending, SerialTransport, Transport};
use std::borrow::Cow;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

const ACK: u8 = b'!';
const NACK: u8 = b'?';

/// Sources queried by [`VernierShield::get_status`] when the caller has no
/// preference.
pub const DEFAULT_STATUS_SOURCES: [Source; 4] = [
    Source::Analog1Low,
    Source::Analog2Low,
    Source::Digital1,
    Source::Digital2,
];

#[derive(Debug, thiserror::Error)]
pub enum ShieldError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No acknowledge received after {attempts} attempts")]
    AcknowledgeTimeout { attempts: u32 },

    #[error("Unrecognized acknowledge byte 0x{byte:02x}")]
    UnrecognizedAcknowledge { byte: u8 },

    #[error("Truncated datablob: expected {expected} bytes but received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("{requested:?} cannot be read on demand")]
    NotReadable { requested: Source },
}

/// How long to keep waiting for the handshake byte after a command.
/// Only the read is retried, never the command itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after each read that came back empty.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(250))
    }
}

/// Handshake outcome. An ack only means the command and its parameters were
/// accepted, not that the device has carried it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeResult {
    Ack,
    Nack,
}

impl AcknowledgeResult {
    pub fn is_ack(self) -> bool {
        self == Self::Ack
    }
}

/// Acquisition state as far as the host can tell from its own commands.
/// The device may return to ready by itself when a stop condition is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShieldState {
    #[default]
    Ready,
    Armed,
}

/// What a single [`VernierShield::poll_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Nothing was waiting.
    Idle,
    /// A sample was handed to this channel's handler.
    Sample(Channel),
    /// A status line was handed to the status handler.
    Status,
    /// A well-formed blob carried a source tag that is not sample data. It
    /// went to the unknown-source handler and its raw fields are returned
    /// here as well.
    UnknownSource(DataBlob),
    /// A stray byte outside any frame was dropped.
    Discarded(u8),
}

/// Reply collected by [`VernierShield::await_single_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Blob(DataBlob),
    Line(String),
    /// Timed out, or the first byte was not a frame marker.
    Nothing,
}

enum Frame {
    Blob(DataBlob),
    Line(String),
    Stray(u8),
}

/// Driver for one Vernier sensor shield.
///
/// All calls block the calling thread; none are safe to make concurrently on
/// the same instance.
pub struct VernierShield<T: Transport = SerialTransport> {
    transport: T,
    handlers: HandlerRegistry,
    retry: RetryPolicy,
    state: ShieldState,
}

impl<T: Transport> VernierShield<T> {
    pub fn new(transport: T, handlers: HandlerConfig) -> Self {
        Self {
            transport,
            handlers: HandlerRegistry::new(handlers),
            retry: RetryPolicy::default(),
            state: ShieldState::Ready,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn state(&self) -> ShieldState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Release the link.
    pub fn close(self) {
        log::debug!("Closing shield link");
        drop(self.transport);
    }

    /// Install a sample handler, or restore the default with `None`.
    pub fn register_handler(&mut self, channel: Channel, handler: Option<SampleHandler>) {
        self.handlers.register(channel, handler);
    }

    pub fn register_status_handler(&mut self, handler: Option<StatusHandler>) {
        self.handlers.register_status(handler);
    }

    pub fn register_unknown_handler(&mut self, handler: Option<UnknownHandler>) {
        self.handlers.register_unknown(handler);
    }

    /// Send a command and wait for its handshake byte.
    pub fn send(&mut self, command: &Command) -> Result<AcknowledgeResult, ShieldError> {
        log::debug!("Sending {:02x?}", command.to_bytes());
        self.transport.write_all(&command.to_bytes())?;
        self.transport.flush()?;
        self.acknowledge()
    }

    fn acknowledge(&mut self) -> Result<AcknowledgeResult, ShieldError> {
        for attempt in 1..=self.retry.max_attempts {
            match read_byte(&mut self.transport)? {
                Some(ACK) => return Ok(AcknowledgeResult::Ack),
                Some(NACK) => {
                    log::debug!("Command rejected");
                    return Ok(AcknowledgeResult::Nack);
                }
                Some(byte) => return Err(ShieldError::UnrecognizedAcknowledge { byte }),
                None => {
                    log::debug!("No acknowledge yet (attempt {})", attempt);
                    if attempt < self.retry.max_attempts {
                        thread::sleep(self.retry.delay);
                    }
                }
            }
        }
        Err(ShieldError::AcknowledgeTimeout {
            attempts: self.retry.max_attempts,
        })
    }

    fn send_params(&mut self, params: impl CommandParams) -> Result<AcknowledgeResult, ShieldError> {
        let command = params.into_command()?;
        self.send(&command)
    }

    fn send_bare(&mut self, predicate: Predicate) -> Result<AcknowledgeResult, ShieldError> {
        self.send(&Command::new(predicate, &[])?)
    }

    fn read_frame(&mut self, lead: u8) -> Result<Frame, ShieldError> {
        match lead {
            BLOB_MARKER => {
                let mut payload = [0u8; BLOB_LEN];
                let received = read_up_to(&mut self.transport, &mut payload)?;
                if received < BLOB_LEN {
                    return Err(ShieldError::TruncatedFrame {
                        expected: BLOB_LEN,
                        received,
                    });
                }
                Ok(Frame::Blob(decode_data_blob(&payload)?))
            }
            STRING_MARKER => {
                let line = read_line(&mut self.transport)?;
                let line = trim_line_ending(&line);
                let text = String::from_utf8_lossy(line);
                if matches!(text, Cow::Owned(_)) {
                    log::debug!("Status line is not valid UTF-8: {:02x?}", line);
                }
                Ok(Frame::Line(text.into_owned()))
            }
            other => Ok(Frame::Stray(other)),
        }
    }

    /// Handle at most one frame if input is already waiting. Never blocks
    /// when nothing is pending; once a frame marker has been read the rest of
    /// the frame is read with the transport's timeout.
    pub fn poll_once(&mut self) -> Result<PollEvent, ShieldError> {
        if self.transport.bytes_to_read()? == 0 {
            return Ok(PollEvent::Idle);
        }
        let Some(lead) = read_byte(&mut self.transport)? else {
            return Ok(PollEvent::Idle);
        };

        match self.read_frame(lead)? {
            Frame::Blob(blob) => {
                let _span = tracing::trace_span!("dispatch_blob", source = blob.source).entered();
                match self.handlers.dispatch_blob(&blob) {
                    Some(channel) => Ok(PollEvent::Sample(channel)),
                    None => {
                        log::warn!(
                            "Datablob with unknown source tag {} (seq {}, raw {})",
                            blob.source,
                            blob.sequence,
                            blob.raw_value
                        );
                        Ok(PollEvent::UnknownSource(blob))
                    }
                }
            }
            Frame::Line(line) => {
                let _span = tracing::trace_span!("dispatch_status").entered();
                self.handlers.dispatch_status(&line);
                Ok(PollEvent::Status)
            }
            Frame::Stray(byte) => {
                log::debug!("Discarding stray byte 0x{:02x}", byte);
                Ok(PollEvent::Discarded(byte))
            }
        }
    }

    /// Keep polling until `duration` has passed. Returns how many polls did
    /// something other than find the input idle.
    pub fn run_for(&mut self, duration: Duration) -> Result<usize, ShieldError> {
        let deadline = Instant::now() + duration;
        let mut events = 0;
        while Instant::now() < deadline {
            if self.poll_once()? != PollEvent::Idle {
                events += 1;
            }
        }
        Ok(events)
    }

    /// Block for exactly one reply and return it instead of dispatching it.
    pub fn await_single_response(&mut self) -> Result<Response, ShieldError> {
        let Some(lead) = read_byte(&mut self.transport)? else {
            log::debug!("No response before timeout");
            return Ok(Response::Nothing);
        };
        match self.read_frame(lead)? {
            Frame::Blob(blob) => Ok(Response::Blob(blob)),
            Frame::Line(line) => Ok(Response::Line(line)),
            Frame::Stray(byte) => {
                log::debug!("Expected a response but got stray byte 0x{:02x}", byte);
                Ok(Response::Nothing)
            }
        }
    }

    /// Stop all acquisition and return to ready.
    pub fn halt_data(&mut self) -> Result<AcknowledgeResult, ShieldError> {
        let result = self.send_bare(Predicate::Halt)?;
        if result.is_ack() {
            self.state = ShieldState::Ready;
        }
        Ok(result)
    }

    /// Arm the ports given as 1-based indices (the source tags: 1, 2 digital,
    /// 3..=6 analog).
    pub fn arm_data(&mut self, channels: &[u8]) -> Result<AcknowledgeResult, ShieldError> {
        let command = Command::new(Predicate::Arm, &[channel_mask(channels)])?;
        let result = self.send(&command)?;
        if result.is_ack() {
            self.state = ShieldState::Armed;
        }
        Ok(result)
    }

    /// Arm the given sources.
    pub fn arm_sources(&mut self, sources: &[Source]) -> Result<AcknowledgeResult, ShieldError> {
        let indices: Vec<u8> = sources.iter().map(|s| s.tag()).collect();
        self.arm_data(&indices)
    }

    /// Zero the device's timestamp clock.
    pub fn sync_clocks(&mut self) -> Result<AcknowledgeResult, ShieldError> {
        self.send_bare(Predicate::SyncClocks)
    }

    pub fn set_sample_rate(&mut self, rate: SampleRate) -> Result<AcknowledgeResult, ShieldError> {
        self.send_params(rate)
    }

    /// Analog trigger on both channels. `level` is a raw ADC code.
    pub fn set_trigger_condition(
        &mut self,
        condition: TriggerCondition,
        level: u16,
    ) -> Result<AcknowledgeResult, ShieldError> {
        self.send_params(AnalogTrigger::new(condition, level))
    }

    pub fn set_trigger(&mut self, trigger: AnalogTrigger) -> Result<AcknowledgeResult, ShieldError> {
        self.send_params(trigger)
    }

    /// Stop after `points` samples; zero runs until halted.
    pub fn set_stop_condition(&mut self, points: u16) -> Result<AcknowledgeResult, ShieldError> {
        self.send_params(StopCondition::after(points))
    }

    /// Edge selection for the digital ports. A single [`DigitalEdge`]
    /// applies to both.
    ///
    /// [`DigitalEdge`]: crate::acquisition_config::DigitalEdge
    pub fn set_digital_trigger(
        &mut self,
        trigger: impl Into<DigitalTrigger>,
    ) -> Result<AcknowledgeResult, ShieldError> {
        self.send_params(trigger.into())
    }

    pub fn blink_led(&mut self, times: u8, period: u8) -> Result<AcknowledgeResult, ShieldError> {
        self.send_params(LedBlink { times, period })
    }

    /// Firmware version string, or `None` if the request was rejected or
    /// went unanswered.
    pub fn get_version(&mut self) -> Result<Option<String>, ShieldError> {
        if !self.send_bare(Predicate::Version)?.is_ack() {
            return Ok(None);
        }
        match self.await_single_response()? {
            Response::Line(line) => Ok(Some(line)),
            other => {
                log::warn!("Expected a version string, got {:?}", other);
                Ok(None)
            }
        }
    }

    /// Ask each source for its status line. Collection stops at the first
    /// reply that is not a line, since there is no way to resynchronise the
    /// rest of the sequence. `None` if the request was rejected.
    pub fn get_status(&mut self, sources: &[Source]) -> Result<Option<StatusReport>, ShieldError> {
        let command = Command::new(Predicate::PortStatus, &[source_mask(sources)])?;
        if !self.send(&command)?.is_ack() {
            return Ok(None);
        }

        let mut lines = Vec::with_capacity(sources.len());
        for _ in sources {
            match self.await_single_response()? {
                Response::Line(line) => lines.push(line),
                other => {
                    log::warn!(
                        "Status reply {} of {} missing, got {:?}",
                        lines.len() + 1,
                        sources.len(),
                        other
                    );
                    return Ok(Some(StatusReport::new(lines, false)));
                }
            }
        }
        Ok(Some(StatusReport::new(lines, true)))
    }

    /// Read one source right now, bypassing arming and triggers. `None` if
    /// the request was rejected or no blob came back.
    pub fn read_immediate(&mut self, source: Source) -> Result<Option<Sample>, ShieldError> {
        let predicate = match source {
            Source::Digital1 => Predicate::ReadDigital1,
            Source::Digital2 => Predicate::ReadDigital2,
            Source::Analog1Low => Predicate::ReadAnalog1Low,
            Source::Analog1High => Predicate::ReadAnalog1High,
            Source::Analog2Low => Predicate::ReadAnalog2Low,
            Source::Analog2High => Predicate::ReadAnalog2High,
            Source::Button => Predicate::ReadButton,
            Source::StringMarker => return Err(ShieldError::NotReadable { requested: source }),
        };
        if !self.send_bare(predicate)?.is_ack() {
            return Ok(None);
        }
        match self.await_single_response()? {
            Response::Blob(blob) => Ok(Some(Sample::from_blob(&blob))),
            other => {
                log::warn!("Expected a datablob for {:?}, got {:?}", source, other);
                Ok(None)
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for VernierShield<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VernierShield")
            .field("retry", &self.retry)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
