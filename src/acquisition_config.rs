use crate::codec::{CodecError, Command, Predicate, Source};

/// Anything that knows how to turn itself into a shield command.
pub trait CommandParams {
    fn into_command(self) -> Result<Command, CodecError>;
}

/// Coarse sampling periods the firmware knows about. The discriminant is the
/// index sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SampleRate {
    /// Take a sample each time the shield button is pressed.
    ButtonPress = 0,
    /// As fast as the firmware can go, roughly 1.5 ms per sample.
    Fastest = 1,
    Hz1000 = 2,
    Hz500 = 3,
    Hz200 = 4,
    Hz100 = 5,
    Hz50 = 6,
    Hz40 = 7,
    Hz20 = 8,
    #[default]
    Hz10 = 9,
    Hz5 = 10,
    Hz1 = 11,
    Every2s = 12,
    Every5s = 13,
    Every10s = 14,
    Every30s = 15,
}

impl SampleRate {
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl CommandParams for SampleRate {
    fn into_command(self) -> Result<Command, CodecError> {
        Command::new(Predicate::SetSampleRate, &[self.index()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TriggerCondition {
    /// Start sampling as soon as the shield is armed.
    #[default]
    Immediate = 0,
    FallBelow = 1,
    RiseAbove = 2,
}

impl TriggerCondition {
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Port selector sent with every analog trigger. Both analog channels.
const BOTH_CHANNELS: u8 = 0b11;

/// Largest threshold the two 7-bit trigger parameters can carry.
pub const MAX_TRIGGER_LEVEL: u16 = 0x7FF;

#[derive(Debug)]
pub struct AnalogTriggerBuilder {
    condition: TriggerCondition,
}

impl AnalogTriggerBuilder {
    pub fn rises_above(mut self, level: u16) -> AnalogTrigger {
        self.condition = TriggerCondition::RiseAbove;
        AnalogTrigger::new(self.condition, level)
    }

    pub fn falls_below(mut self, level: u16) -> AnalogTrigger {
        self.condition = TriggerCondition::FallBelow;
        AnalogTrigger::new(self.condition, level)
    }

    pub fn immediately(self) -> AnalogTrigger {
        AnalogTrigger::default()
    }
}

/// When analog sampling starts after arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogTrigger {
    pub condition: TriggerCondition,
    /// Threshold as a raw ADC code. Only the low 11 bits are transmitted.
    pub level: u16,
}

impl AnalogTrigger {
    pub fn new(condition: TriggerCondition, level: u16) -> Self {
        if level > MAX_TRIGGER_LEVEL {
            log::warn!(
                "Trigger level {} does not fit in 11 bits and will be truncated",
                level
            );
        }
        Self { condition, level }
    }

    pub fn start_capturing_when() -> AnalogTriggerBuilder {
        AnalogTriggerBuilder {
            condition: TriggerCondition::Immediate,
        }
    }

    /// The `[high, low]` parameter pair.
    pub fn params(&self) -> [u8; 2] {
        let level = self.level & MAX_TRIGGER_LEVEL;
        let high = (level >> 7) as u8 + (self.condition.bits() << 5) + (BOTH_CHANNELS << 3);
        let low = (level & 0x7F) as u8;
        [high, low]
    }
}

impl Default for AnalogTrigger {
    fn default() -> Self {
        Self {
            condition: TriggerCondition::Immediate,
            level: 512,
        }
    }
}

impl CommandParams for AnalogTrigger {
    fn into_command(self) -> Result<Command, CodecError> {
        Command::new(Predicate::SetTriggerCondition, &self.params())
    }
}

/// How many points (or time units) to collect before the shield stops on
/// its own. Zero means run until halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopCondition {
    pub points: u16,
}

/// Largest count the two 7-bit stop parameters can carry.
pub const MAX_STOP_POINTS: u16 = 0x3FFF;

impl StopCondition {
    pub const FOREVER: Self = Self { points: 0 };

    pub fn after(points: u16) -> Self {
        if points > MAX_STOP_POINTS {
            log::warn!(
                "Stop condition {} does not fit in 14 bits and will be truncated",
                points
            );
        }
        Self { points }
    }

    /// The `[high, low]` parameter pair.
    pub fn params(&self) -> [u8; 2] {
        [((self.points >> 7) & 0x7F) as u8, (self.points & 0x7F) as u8]
    }
}

impl CommandParams for StopCondition {
    fn into_command(self) -> Result<Command, CodecError> {
        Command::new(Predicate::SetStopCondition, &self.params())
    }
}

/// Transition that makes a digital port emit a datablob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DigitalEdge {
    /// Gate becomes blocked.
    LowToHigh = 0x1,
    /// Gate opens.
    HighToLow = 0x2,
    Any = 0x3,
}

impl DigitalEdge {
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Edge selection for both digital ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalTrigger {
    pub port1: DigitalEdge,
    pub port2: DigitalEdge,
}

impl DigitalTrigger {
    pub fn new(port1: DigitalEdge, port2: DigitalEdge) -> Self {
        Self { port1, port2 }
    }

    /// Same edge on both ports.
    pub fn both(edge: DigitalEdge) -> Self {
        Self::new(edge, edge)
    }

    /// Port 2 in the high nibble, port 1 in the low nibble.
    pub fn param(&self) -> u8 {
        (self.port2.bits() << 4) | self.port1.bits()
    }
}

impl Default for DigitalTrigger {
    fn default() -> Self {
        Self::both(DigitalEdge::Any)
    }
}

impl From<DigitalEdge> for DigitalTrigger {
    fn from(edge: DigitalEdge) -> Self {
        Self::both(edge)
    }
}

impl CommandParams for DigitalTrigger {
    fn into_command(self) -> Result<Command, CodecError> {
        Command::new(Predicate::SetDigitalTrigger, &[self.param()])
    }
}

/// Bit-mask of 1-based port indices, as taken by arm and status requests.
/// Index `n` sets bit `n - 1`; indices outside 1..=7 do not fit in a
/// parameter byte and are skipped.
pub fn channel_mask(indices: &[u8]) -> u8 {
    indices.iter().fold(0u8, |mask, &index| {
        if (1..=7).contains(&index) {
            mask | (1 << (index - 1))
        } else {
            log::warn!("Ignoring channel index {} outside 1..=7", index);
            mask
        }
    })
}

/// Mask of data sources, using each source's tag as its index.
pub fn source_mask(sources: &[Source]) -> u8 {
    let tags: Vec<u8> = sources.iter().map(|s| s.tag()).collect();
    channel_mask(&tags)
}

/// Diagnostic LED blink: up to 7 blinks with a 4-bit period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedBlink {
    pub times: u8,
    pub period: u8,
}

impl LedBlink {
    pub fn param(&self) -> u8 {
        ((self.times & 0x7) << 4) + (self.period & 0xF)
    }
}

impl Default for LedBlink {
    fn default() -> Self {
        Self { times: 1, period: 0 }
    }
}

impl CommandParams for LedBlink {
    fn into_command(self) -> Result<Command, CodecError> {
        Command::new(Predicate::BlinkLed, &[self.param()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_command() {
        let command = SampleRate::Hz100.into_command().unwrap();
        assert_eq!(command.to_bytes(), vec![0xAD, 5]);
        assert_eq!(SampleRate::default().index(), 9);
    }

    #[test]
    fn test_analog_trigger_packing() {
        let trigger = AnalogTrigger::start_capturing_when().rises_above(700);
        // 700 = 0b101_0111100
        assert_eq!(trigger.params(), [5 + (2 << 5) + (3 << 3), 0x3C]);

        let immediate = AnalogTrigger::start_capturing_when().immediately();
        assert_eq!(immediate.params(), [4 + (3 << 3), 0]);
        for byte in trigger.params() {
            assert_eq!(byte & 0x80, 0);
        }
    }

    #[test]
    fn test_analog_trigger_command() {
        let command = AnalogTrigger::start_capturing_when()
            .falls_below(100)
            .into_command()
            .unwrap();
        assert_eq!(command.to_bytes(), vec![0xB6, (1 << 5) + (3 << 3), 100]);
    }

    #[test]
    fn test_stop_condition_split() {
        assert_eq!(StopCondition::after(20).params(), [0, 20]);
        assert_eq!(StopCondition::after(300).params(), [2, 44]);
        assert_eq!(StopCondition::FOREVER.params(), [0, 0]);
        assert_eq!(StopCondition::after(MAX_STOP_POINTS).params(), [0x7F, 0x7F]);
    }

    #[test]
    fn test_stop_condition_truncates_wide_counts() {
        let stop = StopCondition::after(MAX_STOP_POINTS + 6);
        assert_eq!(stop.points, 0x4005);
        assert_eq!(stop.params(), [0, 5]);
    }

    #[test]
    fn test_digital_trigger_broadcast() {
        assert_eq!(DigitalTrigger::from(DigitalEdge::Any).param(), 0x33);
        assert_eq!(
            DigitalTrigger::new(DigitalEdge::LowToHigh, DigitalEdge::HighToLow).param(),
            0x21
        );
        let command = DigitalTrigger::default().into_command().unwrap();
        assert_eq!(command.to_bytes(), vec![0xB9, 0x33]);
    }

    #[test]
    fn test_channel_mask() {
        assert_eq!(channel_mask(&[2]), 0b0000_0010);
        assert_eq!(channel_mask(&[1, 2]), 0b0000_0011);
        assert_eq!(channel_mask(&[]), 0);
        assert_eq!(channel_mask(&[0, 3, 9]), 0b0000_0100);
    }

    #[test]
    fn test_source_mask() {
        let mask = source_mask(&[
            Source::Analog1Low,
            Source::Analog2Low,
            Source::Digital1,
            Source::Digital2,
        ]);
        assert_eq!(mask, 0b0000_1111);
        assert_eq!(source_mask(&[Source::Button]), 0b0100_0000);
    }

    #[test]
    fn test_led_blink_param() {
        assert_eq!(LedBlink { times: 3, period: 5 }.param(), 0x35);
        assert_eq!(LedBlink { times: 9, period: 0x1F }.param(), 0x1F);
    }
}
