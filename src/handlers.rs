//! Routing of decoded samples and status lines to user callbacks.
//!
//! Handlers run synchronously on the thread that polls the shield, inline
//! with frame decoding. A slow handler stalls polling.

use crate::codec::{DataBlob, Source};
use std::fmt;

/// One decoded, scaled reading as handed to a handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub sequence: u16,
    /// Raw 0/1 for digital ports and the button, volts for analog ports.
    pub value: f64,
    /// Seconds since the last clock sync.
    pub elapsed: f64,
    pub source: Source,
}

impl Sample {
    pub fn from_blob(blob: &DataBlob) -> Self {
        Self {
            sequence: blob.sequence,
            value: blob.scaled_value(),
            elapsed: blob.elapsed_seconds(),
            source: blob.source(),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:2}, {:5}, {:10}, {:10.6}",
            self.source.tag(),
            self.sequence,
            self.value,
            self.elapsed
        )
    }
}

pub type SampleHandler = Box<dyn FnMut(&Sample) + Send>;
pub type StatusHandler = Box<dyn FnMut(&str) + Send>;
/// Receives blobs whose source tag has no channel, fields untouched.
pub type UnknownHandler = Box<dyn FnMut(&DataBlob) + Send>;

/// Handler slot. Both input ranges of an analog port share one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Digital1,
    Digital2,
    Analog1,
    Analog2,
    Button,
}

impl Channel {
    pub const ALL: [Self; 5] = [
        Self::Digital1,
        Self::Digital2,
        Self::Analog1,
        Self::Analog2,
        Self::Button,
    ];

    /// Slot a source's samples go to. The string marker has none.
    pub fn for_source(source: Source) -> Option<Self> {
        match source {
            Source::Digital1 => Some(Self::Digital1),
            Source::Digital2 => Some(Self::Digital2),
            Source::Analog1Low | Source::Analog1High => Some(Self::Analog1),
            Source::Analog2Low | Source::Analog2High => Some(Self::Analog2),
            Source::Button => Some(Self::Button),
            Source::StringMarker => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

fn print_sample(sample: &Sample) {
    println!("{}", sample);
}

fn print_status(line: &str) {
    println!("{}", line);
}

fn print_unknown(blob: &DataBlob) {
    println!(
        "{:2}, {:5}, {:10}, {:10.6} (unknown source)",
        blob.source,
        blob.sequence,
        blob.raw_value,
        blob.elapsed_seconds()
    );
}

pub fn default_sample_handler() -> SampleHandler {
    Box::new(print_sample)
}

pub fn default_status_handler() -> StatusHandler {
    Box::new(print_status)
}

pub fn default_unknown_handler() -> UnknownHandler {
    Box::new(print_unknown)
}

/// Handlers to install when a shield is created. Anything left unset gets
/// the print-to-stdout default.
#[derive(Default)]
pub struct HandlerConfig {
    samples: [Option<SampleHandler>; 5],
    status: Option<StatusHandler>,
    unknown: Option<UnknownHandler>,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, channel: Channel, handler: impl FnMut(&Sample) + Send + 'static) -> Self {
        self.samples[channel.slot()] = Some(Box::new(handler));
        self
    }

    pub fn on_status(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.status = Some(Box::new(handler));
        self
    }

    /// Catch blobs whose source tag maps to no channel.
    pub fn on_unknown(mut self, handler: impl FnMut(&DataBlob) + Send + 'static) -> Self {
        self.unknown = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let custom: Vec<Channel> = Channel::ALL
            .into_iter()
            .filter(|c| self.samples[c.slot()].is_some())
            .collect();
        f.debug_struct("HandlerConfig")
            .field("custom_channels", &custom)
            .field("custom_status", &self.status.is_some())
            .field("custom_unknown", &self.unknown.is_some())
            .finish()
    }
}

/// Handler slots owned by one shield.
pub struct HandlerRegistry {
    samples: [SampleHandler; 5],
    status: StatusHandler,
    unknown: UnknownHandler,
}

impl HandlerRegistry {
    pub fn new(config: HandlerConfig) -> Self {
        let HandlerConfig {
            samples,
            status,
            unknown,
        } = config;
        Self {
            samples: samples.map(|h| h.unwrap_or_else(default_sample_handler)),
            status: status.unwrap_or_else(default_status_handler),
            unknown: unknown.unwrap_or_else(default_unknown_handler),
        }
    }

    /// Install `handler` for `channel`, or restore the default with `None`.
    pub fn register(&mut self, channel: Channel, handler: Option<SampleHandler>) {
        self.samples[channel.slot()] = handler.unwrap_or_else(default_sample_handler);
    }

    pub fn register_status(&mut self, handler: Option<StatusHandler>) {
        self.status = handler.unwrap_or_else(default_status_handler);
    }

    pub fn register_unknown(&mut self, handler: Option<UnknownHandler>) {
        self.unknown = handler.unwrap_or_else(default_unknown_handler);
    }

    /// Hand a blob to its channel's handler. Returns the channel it went to,
    /// or `None` when the source tag has no slot, in which case the blob went
    /// to the unknown-source handler as-is.
    pub fn dispatch_blob(&mut self, blob: &DataBlob) -> Option<Channel> {
        let Some(channel) = Channel::for_source(blob.source()) else {
            (self.unknown)(blob);
            return None;
        };
        let sample = Sample::from_blob(blob);
        (self.samples[channel.slot()])(&sample);
        Some(channel)
    }

    pub fn dispatch_status(&mut self, line: &str) {
        (self.status)(line);
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(HandlerConfig::default())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn blob(source: Source, raw_value: u16) -> DataBlob {
        DataBlob {
            sequence: 7,
            raw_value,
            source: source.tag(),
            elapsed_micros: 2_500_000,
        }
    }

    #[test]
    fn test_analog_ranges_share_a_slot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut registry = HandlerRegistry::new(HandlerConfig::new().on(
            Channel::Analog1,
            move |s: &Sample| sink.lock().unwrap().push(*s),
        ));

        assert_eq!(
            registry.dispatch_blob(&blob(Source::Analog1Low, 512)),
            Some(Channel::Analog1)
        );
        assert_eq!(
            registry.dispatch_blob(&blob(Source::Analog1High, 0)),
            Some(Channel::Analog1)
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].value, 2.5);
        assert_eq!(seen[0].elapsed, 2.5);
        assert_eq!(seen[1].value, -10.0);
        assert_eq!(seen[1].source, Source::Analog1High);
    }

    #[test]
    fn test_digital_value_passes_through() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut registry = HandlerRegistry::default();
        registry.register(
            Channel::Digital2,
            Some(Box::new(move |s: &Sample| *sink.lock().unwrap() = Some(*s))),
        );

        registry.dispatch_blob(&blob(Source::Digital2, 1));
        let sample = seen.lock().unwrap().expect("handler was called");
        assert_eq!(sample.value, 1.0);
        assert_eq!(sample.sequence, 7);
    }

    #[test]
    fn test_reset_to_default() {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let mut registry = HandlerRegistry::new(
            HandlerConfig::new().on(Channel::Button, move |_: &Sample| *sink.lock().unwrap() += 1),
        );
        registry.dispatch_blob(&blob(Source::Button, 1));
        registry.register(Channel::Button, None);
        registry.dispatch_blob(&blob(Source::Button, 0));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_string_marker_goes_to_unknown_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut registry = HandlerRegistry::new(
            HandlerConfig::new().on_unknown(move |b: &DataBlob| sink.lock().unwrap().push(*b)),
        );

        let stray = blob(Source::StringMarker, 3);
        assert_eq!(registry.dispatch_blob(&stray), None);
        assert_eq!(*seen.lock().unwrap(), vec![stray]);
        assert_eq!(Channel::for_source(Source::StringMarker), None);

        registry.register_unknown(None);
        registry.dispatch_blob(&stray);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_status_handler() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let mut registry = HandlerRegistry::new(
            HandlerConfig::new()
                .on_status(move |line: &str| sink.lock().unwrap().push(line.to_string())),
        );
        registry.dispatch_status("v:1.0");
        assert_eq!(*lines.lock().unwrap(), vec!["v:1.0".to_string()]);
    }

    #[test]
    fn test_registry_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<HandlerConfig>();
        assert_send::<HandlerRegistry>();
    }

    #[test]
    fn test_sample_display() {
        let sample = Sample::from_blob(&blob(Source::Digital1, 1));
        assert_eq!(sample.to_string(), " 1,     7,          1,   2.500000");
    }
}
