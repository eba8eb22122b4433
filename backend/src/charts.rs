use crate::ring_buffer::RingBuffer;
use mission_control_shared::{ChartChannel, ChartPoint, StampedSample};

pub const TIME_SERIES_CAP: usize = 500;
pub const TEMPERATURE_CAP: usize = 300;
pub const TRAJECTORY_CAP: usize = 200;

pub fn channel_cap(channel: ChartChannel) -> usize {
    match channel {
        ChartChannel::Temperature => TEMPERATURE_CAP,
        ChartChannel::Trajectory => TRAJECTORY_CAP,
        _ => TIME_SERIES_CAP,
    }
}

/// The `(x, y)` point a channel plots for this sample, if it has the fields.
pub fn derive_point(channel: ChartChannel, stamped: &StampedSample) -> Option<ChartPoint> {
    let s = &stamped.sample;
    let t = stamped.mission_elapsed_seconds;
    let (x, y) = match channel {
        ChartChannel::Altitude => (t, s.altitude_meters?),
        ChartChannel::Velocity => (t, s.velocity?),
        ChartChannel::AccelX => (t, s.accel_x?),
        ChartChannel::AccelY => (t, s.accel_y?),
        ChartChannel::AccelZ => (t, s.accel_z?),
        ChartChannel::TotalAccel => (t, s.total_accel()?),
        // pressure and temperature are plotted against altitude
        ChartChannel::Pressure => (s.altitude_meters?, s.pressure_hectopascals?),
        ChartChannel::Temperature => (s.altitude_meters?, s.temperature_celsius?),
        ChartChannel::Trajectory => (s.downrange_meters? / 1000.0, s.altitude_meters?),
    };
    Some(ChartPoint { x, y })
}

/// One independently capped series per chart channel.
#[derive(Debug, Clone)]
pub struct ChartSet {
    series: Vec<RingBuffer<ChartPoint>>,
}

impl Default for ChartSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartSet {
    pub fn new() -> Self {
        Self::with_caps(channel_cap)
    }

    pub fn with_caps(cap: impl Fn(ChartChannel) -> usize) -> Self {
        Self {
            series: ChartChannel::ALL
                .iter()
                .map(|&ch| RingBuffer::new(cap(ch)))
                .collect(),
        }
    }

    /// Appends the sample to every channel it has data for and returns those
    /// channels in `ChartChannel::ALL` order.
    pub fn append(&mut self, stamped: &StampedSample) -> Vec<ChartChannel> {
        let mut touched = Vec::new();
        for ch in ChartChannel::ALL {
            if let Some(point) = derive_point(ch, stamped) {
                self.series[ch.index()].push(point);
                touched.push(ch);
            }
        }
        touched
    }

    pub fn series(&self, channel: ChartChannel) -> &RingBuffer<ChartPoint> {
        &self.series[channel.index()]
    }

    /// The last `n` points of a channel, oldest first.
    pub fn latest(&self, channel: ChartChannel, n: usize) -> Vec<ChartPoint> {
        self.series(channel).tail(n).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(RingBuffer::is_empty)
    }

    pub fn clear(&mut self) {
        self.series.iter_mut().for_each(RingBuffer::clear);
    }
}

/// What the chart consumer sees after an ingest: the whole set, read-only,
/// and which channels just grew.
#[derive(Clone, Copy)]
pub struct ChartView<'a> {
    pub charts: &'a ChartSet,
    pub touched: &'a [ChartChannel],
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_control_shared::TelemetrySample;

    fn stamped(t: f64, sample: TelemetrySample) -> StampedSample {
        StampedSample {
            seq: 1,
            received_at_ms: 0,
            mission_elapsed_seconds: t,
            sample,
        }
    }

    #[test]
    fn only_channels_with_data_are_touched() {
        let mut charts = ChartSet::new();
        let touched = charts.append(&stamped(
            2.0,
            TelemetrySample {
                altitude_meters: Some(300.0),
                temperature_celsius: Some(18.0),
                accel_x: Some(0.1),
                ..Default::default()
            },
        ));
        assert_eq!(
            touched,
            vec![
                ChartChannel::Altitude,
                ChartChannel::AccelX,
                ChartChannel::Temperature
            ]
        );
        assert_eq!(
            charts.latest(ChartChannel::Temperature, 1),
            vec![ChartPoint { x: 300.0, y: 18.0 }]
        );
        assert!(charts.series(ChartChannel::Pressure).is_empty());
    }

    #[test]
    fn trajectory_uses_kilometres_downrange() {
        let point = derive_point(
            ChartChannel::Trajectory,
            &stamped(
                0.0,
                TelemetrySample {
                    altitude_meters: Some(1500.0),
                    downrange_meters: Some(2500.0),
                    ..Default::default()
                },
            ),
        );
        assert_eq!(point, Some(ChartPoint { x: 2.5, y: 1500.0 }));
    }

    #[test]
    fn altitude_series_evicts_fifo_at_cap() {
        let mut charts = ChartSet::new();
        for i in 0..=TIME_SERIES_CAP {
            charts.append(&stamped(
                i as f64,
                TelemetrySample {
                    altitude_meters: Some(i as f64),
                    ..Default::default()
                },
            ));
        }
        let series = charts.series(ChartChannel::Altitude);
        assert_eq!(series.len(), TIME_SERIES_CAP);
        let ys: Vec<f64> = series.iter().map(|p| p.y).collect();
        assert_eq!(ys.first(), Some(&1.0));
        assert_eq!(ys.last(), Some(&(TIME_SERIES_CAP as f64)));
        assert!(ys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn caps_are_independent_per_channel() {
        let mut charts = ChartSet::with_caps(|ch| match ch {
            ChartChannel::Temperature => 2,
            _ => 10,
        });
        for i in 0..5 {
            charts.append(&stamped(
                i as f64,
                TelemetrySample {
                    altitude_meters: Some(100.0 * i as f64),
                    temperature_celsius: Some(20.0 - i as f64),
                    ..Default::default()
                },
            ));
        }
        assert_eq!(charts.series(ChartChannel::Altitude).len(), 5);
        assert_eq!(
            charts
                .latest(ChartChannel::Temperature, 10)
                .iter()
                .map(|p| p.y)
                .collect::<Vec<_>>(),
            vec![17.0, 16.0]
        );
        charts.clear();
        assert!(charts.is_empty());
    }
}
