use crate::handlers::{Sample, SampleHandler};
use polars::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const TIME_COLUMN_NAME: &str = "time";
const SEQUENCE_COLUMN_NAME: &str = "sequence";
const VALUE_COLUMN_NAME: &str = "value";
const SOURCE_COLUMN_NAME: &str = "source";

/// Collects samples from any number of channels into one in-memory table.
/// Clones share the same buffer.
///
/// ```rust
/// use vernier_shield::{Channel, HandlerConfig, SampleRecorder};
///
/// let recorder = SampleRecorder::new();
/// let handlers = HandlerConfig::new()
///     .on(Channel::Analog1, recorder.handler())
///     .on(Channel::Digital1, recorder.handler());
/// # let _ = handlers;
/// assert!(recorder.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleRecorder {
    samples: Arc<Mutex<Vec<Sample>>>,
}

impl SampleRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that appends to this recorder.
    pub fn handler(&self) -> impl FnMut(&Sample) + Send + 'static {
        let samples = Arc::clone(&self.samples);
        move |sample: &Sample| {
            samples
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(*sample);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn boxed_handler(&self) -> SampleHandler {
        Box::new(self.handler())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything recorded so far.
    pub fn samples(&self) -> Vec<Sample> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Samples as a `time / sequence / value / source` frame, in arrival
    /// order.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let samples = self.lock();

        let time: Vec<f64> = samples.iter().map(|s| s.elapsed).collect();
        let sequence: Vec<u32> = samples.iter().map(|s| u32::from(s.sequence)).collect();
        let value: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let source: Vec<&str> = samples.iter().map(|s| s.source.as_str()).collect();

        DataFrame::new(vec![
            Series::new(TIME_COLUMN_NAME.into(), time).into(),
            Series::new(SEQUENCE_COLUMN_NAME.into(), sequence).into(),
            Series::new(VALUE_COLUMN_NAME.into(), value).into(),
            Series::new(SOURCE_COLUMN_NAME.into(), source).into(),
        ])
    }
}
