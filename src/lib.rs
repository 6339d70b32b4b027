//! # Vernier Shield
//!
//! A Rust library for driving an Arduino fitted with a Vernier sensor shield
//! over its binary serial protocol.
//!
//! The host sends single-byte predicate commands (with up to two 7-bit
//! parameter bytes) and gets a one byte `!`/`?` handshake back. Once armed,
//! the shield pushes 7 byte datablobs and newline-terminated status lines,
//! which the driver decodes and hands to per-channel handlers.
//!
//! ## Features
//!
//! - **Frame codec**: bit-exact command and datablob encoding in [`codec`]
//! - **Typed configuration**: sample rates, analog and digital triggers, stop
//!   conditions in [`acquisition_config`]
//! - **Cooperative polling**: a non-blocking [`VernierShield::poll_once`] and a
//!   timed [`VernierShield::run_for`] driven from the caller's thread
//! - **DataFrame output**: record samples into a `polars` frame with
//!   [`SampleRecorder`]
//! - **Testable transport**: everything runs against the [`Transport`] trait,
//!   with a [`ScriptedTransport`] for tests and dry runs
//!
//! ## Examples
//!
//! ### Collect analog samples
//!
//! ```rust,no_run
//! use vernier_shield::{
//!     Channel, HandlerConfig, SampleRate, SampleRecorder, ShieldConnector, ShieldSettings,
//!     Source, TriggerCondition,
//! };
//! use std::time::Duration;
//!
//! let recorder = SampleRecorder::new();
//! let handlers = HandlerConfig::new().on(Channel::Analog1, recorder.handler());
//!
//! let (mut shield, link) = ShieldConnector::connect(&ShieldSettings::new("/dev/ttyACM0"), handlers)?;
//! if !link.is_ready() {
//!     eprintln!("Shield did not greet us, trying anyway");
//! }
//!
//! shield.set_sample_rate(SampleRate::Hz100)?;
//! shield.set_trigger_condition(TriggerCondition::Immediate, 512)?;
//! shield.set_stop_condition(200)?;
//! shield.sync_clocks()?;
//! shield.arm_sources(&[Source::Analog1Low])?;
//! shield.run_for(Duration::from_secs(3))?;
//! shield.halt_data()?;
//!
//! println!("{}", recorder.to_dataframe()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Talking to a scripted device
//!
//! ```rust
//! use vernier_shield::{HandlerConfig, RetryPolicy, ScriptedTransport, VernierShield};
//! use std::time::Duration;
//!
//! let mut transport = ScriptedTransport::new();
//! transport.push(b"! v:1.0\r\n");
//!
//! let mut shield = VernierShield::new(transport, HandlerConfig::default())
//!     .with_retry_policy(RetryPolicy::new(5, Duration::ZERO));
//! assert_eq!(shield.get_version()?, Some("v:1.0".to_string()));
//! # Ok::<(), vernier_shield::ShieldError>(())
//! ```

pub mod acquisition_config;
pub mod codec;
pub mod connector;
pub mod handlers;
pub mod recorder;
pub mod shield;
pub mod status;
pub mod transport;

// Re-export the main types for convenience
pub use acquisition_config::{
    AnalogTrigger, AnalogTriggerBuilder, DigitalEdge, DigitalTrigger, LedBlink, SampleRate,
    StopCondition, TriggerCondition,
};

pub use codec::{CodecError, Command, DataBlob, Predicate, Source};

pub use connector::{ConnectorError, LinkState, ShieldConnector, ShieldSettings};

pub use handlers::{Channel, HandlerConfig, Sample};

pub use recorder::SampleRecorder;

pub use shield::{
    AcknowledgeResult, PollEvent, Response, RetryPolicy, ShieldError, ShieldState, VernierShield,
};

pub use status::StatusReport;

pub use transport::{SerialTransport, Transport};

/// In-memory transport that replays canned device output. Useful for dry
/// runs of acquisition code without hardware attached.
pub use transport::ScriptedTransport;
