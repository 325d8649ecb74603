use std::time::Duration;

/// Time spent in each stage for a single frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameTimes {
    pub decode: Duration,
    pub detect: Duration,
    pub annotate: Duration,
    pub encode: Duration,
}

impl FrameTimes {
    pub fn total(&self) -> Duration {
        self.decode + self.detect + self.annotate + self.encode
    }

    fn zip_with(&self, other: &Self, f: impl Fn(Duration, Duration) -> Duration) -> Self {
        Self {
            decode: f(self.decode, other.decode),
            detect: f(self.detect, other.detect),
            annotate: f(self.annotate, other.annotate),
            encode: f(self.encode, other.encode),
        }
    }
}

/// Collects per-frame times over a whole job.
#[derive(Debug, Default)]
pub struct AggregatedTimes {
    frames: Vec<FrameTimes>,
}

impl AggregatedTimes {
    pub fn push(&mut self, times: FrameTimes) {
        self.frames.push(times);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The first frame pays for lazy initialisation in the decoder and the
    /// model, so summaries can leave it out.
    fn samples(&self, skip_first: bool) -> &[FrameTimes] {
        if skip_first && self.frames.len() > 1 {
            &self.frames[1..]
        } else {
            &self.frames
        }
    }

    pub fn avg(&self, skip_first: bool) -> FrameTimes {
        let samples = self.samples(skip_first);
        if samples.is_empty() {
            return FrameTimes::default();
        }
        let sum = samples
            .iter()
            .fold(FrameTimes::default(), |acc, t| acc.zip_with(t, |a, b| a + b));
        let n = samples.len() as u32;
        FrameTimes {
            decode: sum.decode / n,
            detect: sum.detect / n,
            annotate: sum.annotate / n,
            encode: sum.encode / n,
        }
    }

    pub fn min(&self, skip_first: bool) -> FrameTimes {
        let samples = self.samples(skip_first);
        let Some(first) = samples.first() else {
            return FrameTimes::default();
        };
        samples
            .iter()
            .fold(*first, |acc, t| acc.zip_with(t, Duration::min))
    }

    pub fn max(&self, skip_first: bool) -> FrameTimes {
        self.samples(skip_first)
            .iter()
            .fold(FrameTimes::default(), |acc, t| acc.zip_with(t, Duration::max))
    }
}
