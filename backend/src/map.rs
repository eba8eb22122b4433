use crate::ring_buffer::RingBuffer;
use mission_control_shared::MapFix;
use serde::Serialize;

pub const DEFAULT_PATH_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl From<MapFix> for GeoPoint {
    fn from(fix: MapFix) -> Self {
        Self {
            lat: fix.lat,
            lng: fix.lng,
        }
    }
}

/// Rocket marker plus the flown path, anchored at the launch site.
#[derive(Debug, Clone)]
pub struct FlightTrack {
    launch_site: GeoPoint,
    marker: Option<MapFix>,
    path: RingBuffer<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMsg {
    pub launch_site: GeoPoint,
    pub marker: Option<MapFix>,
    pub path: Vec<GeoPoint>,
}

impl FlightTrack {
    pub fn new(launch_site: GeoPoint, path_cap: usize) -> Self {
        Self {
            launch_site,
            marker: None,
            path: RingBuffer::new(path_cap),
        }
    }

    /// Moves the marker and extends the path. The first fix starts the path
    /// at the launch site.
    pub fn update(&mut self, fix: MapFix) {
        if self.path.is_empty() {
            self.path.push(self.launch_site);
        }
        self.marker = Some(fix);
        self.path.push(fix.into());
    }

    pub fn reset(&mut self) {
        self.marker = None;
        self.path.clear();
    }

    pub fn marker(&self) -> Option<MapFix> {
        self.marker
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    pub fn snapshot(&self) -> TrackMsg {
        TrackMsg {
            launch_site: self.launch_site,
            marker: self.marker,
            path: self.path.iter().copied().collect(),
        }
    }
}
