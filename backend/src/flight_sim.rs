use crate::map::GeoPoint;
use mission_control_shared::TelemetrySample;
use rand::RngExt;

const METERS_PER_DEG_LAT: f64 = 111_320.0;
const SEA_LEVEL_HPA: f64 = 1013.25;
const PAD_TEMPERATURE_C: f64 = 25.0;

const BOOST_END_S: f64 = 8.0;
const APOGEE_S: f64 = 30.0;
const LANDED_S: f64 = 150.0;
const BURNOUT_ALT_M: f64 = 1_500.0;
const APOGEE_ALT_M: f64 = 6_000.0;
const BURNOUT_VS: f64 = 375.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Pad,
    Boost,
    Coast,
    Descent,
    Landed,
}

/// Simulated vehicle for driving the pipeline without hardware.
///
/// Sits on the pad until `ignite`, then flies a boost/coast/descent profile
/// downrange from the launch site along `heading_deg`.
#[derive(Debug, Clone)]
pub struct FlightSim {
    launch_site: GeoPoint,
    heading_deg: f64,
    ignited_at_ms: Option<u64>,
}

impl FlightSim {
    pub fn new(launch_site: GeoPoint) -> Self {
        Self {
            launch_site,
            heading_deg: 60.0,
            ignited_at_ms: None,
        }
    }

    pub fn ignite(&mut self, now_ms: u64) {
        if self.ignited_at_ms.is_none() {
            self.ignited_at_ms = Some(now_ms);
        }
    }

    pub fn reset(&mut self) {
        self.ignited_at_ms = None;
    }

    pub fn is_ignited(&self) -> bool {
        self.ignited_at_ms.is_some()
    }

    fn flight_time_s(&self, now_ms: u64) -> Option<f64> {
        self.ignited_at_ms
            .map(|t0| now_ms.saturating_sub(t0) as f64 / 1000.0)
    }

    fn phase(t: Option<f64>) -> Phase {
        match t {
            None => Phase::Pad,
            Some(t) if t < BOOST_END_S => Phase::Boost,
            Some(t) if t < APOGEE_S => Phase::Coast,
            Some(t) if t < LANDED_S => Phase::Descent,
            Some(_) => Phase::Landed,
        }
    }

    pub fn next_sample<R: RngExt + ?Sized>(&self, now_ms: u64, rng: &mut R) -> TelemetrySample {
        let t = self.flight_time_s(now_ms);
        let phase = Self::phase(t);
        let t = t.unwrap_or(0.0);

        let (altitude, vertical_speed, horizontal_speed, accel_z, pitch) = match phase {
            Phase::Pad | Phase::Landed => (0.0, 0.0, 0.0, 1.0, 90.0),
            Phase::Boost => {
                let p = t / BOOST_END_S;
                (BURNOUT_ALT_M * p * p, BURNOUT_VS * p, 40.0 * p, 3.0, 88.0)
            }
            Phase::Coast => {
                let p = (t - BOOST_END_S) / (APOGEE_S - BOOST_END_S);
                let rise = 1.0 - (1.0 - p) * (1.0 - p);
                (
                    BURNOUT_ALT_M + (APOGEE_ALT_M - BURNOUT_ALT_M) * rise,
                    BURNOUT_VS * (1.0 - p),
                    40.0,
                    0.1,
                    88.0 - 60.0 * p,
                )
            }
            Phase::Descent => {
                let p = (t - APOGEE_S) / (LANDED_S - APOGEE_S);
                (APOGEE_ALT_M * (1.0 - p), -50.0, 5.0, 0.9, 0.0)
            }
        };
        let altitude = (altitude + rng.random_range(-0.5..0.5)).max(0.0);

        let downrange = match phase {
            Phase::Pad => 0.0,
            Phase::Boost => 20.0 * t * t / BOOST_END_S,
            Phase::Coast => 160.0 + 40.0 * (t - BOOST_END_S),
            Phase::Descent => 1_040.0 + 5.0 * (t - APOGEE_S),
            Phase::Landed => 1_640.0,
        };
        let position = self.offset(downrange);

        let pressure = SEA_LEVEL_HPA * (1.0 - altitude / 44_330.0).powf(5.255);
        let temperature = PAD_TEMPERATURE_C - altitude * 0.0065;
        let velocity = vertical_speed.hypot(horizontal_speed);
        let density = 1.225 * pressure / SEA_LEVEL_HPA;
        let ignited = self.is_ignited();

        TelemetrySample {
            latitude: Some(position.lat + rng.random_range(-0.00002..0.00002)),
            longitude: Some(position.lng + rng.random_range(-0.00002..0.00002)),
            altitude_meters: Some(altitude),
            downrange_meters: Some(downrange),
            velocity: Some(velocity),
            vertical_speed: Some(vertical_speed),
            horizontal_speed: Some(horizontal_speed),
            dynamic_pressure: Some(0.5 * density * velocity * velocity),
            accel_x: Some(rng.random_range(-0.05..0.05)),
            accel_y: Some(rng.random_range(-0.05..0.05)),
            accel_z: Some(accel_z + rng.random_range(-0.03..0.03)),
            roll: Some(rng.random_range(-2.0..2.0)),
            pitch: Some(pitch + rng.random_range(-0.5..0.5)),
            yaw: Some(self.heading_deg + rng.random_range(-1.0..1.0)),
            angular_rate: Some(rng.random_range(0.0..1.5)),
            temperature_celsius: Some(temperature + rng.random_range(-0.2..0.2)),
            pressure_hectopascals: Some(pressure),
            ignition_active: Some(ignited && phase == Phase::Boost),
            comm_link_ok: Some(true),
            satellite_count: Some(rng.random_range(8..=12)),
        }
    }

    fn offset(&self, downrange_m: f64) -> GeoPoint {
        let heading = self.heading_deg.to_radians();
        let north = downrange_m * heading.cos();
        let east = downrange_m * heading.sin();
        let lat = self.launch_site.lat + north / METERS_PER_DEG_LAT;
        let lng = self.launch_site.lng
            + east / (METERS_PER_DEG_LAT * self.launch_site.lat.to_radians().cos());
        GeoPoint { lat, lng }
    }
}

/// A single mid-flight reading with the ranges the dashboard's test button
/// used.
pub fn sample_burst<R: RngExt + ?Sized>(launch_site: GeoPoint, rng: &mut R) -> TelemetrySample {
    TelemetrySample {
        latitude: Some(launch_site.lat + rng.random_range(0.0..0.01)),
        longitude: Some(launch_site.lng + rng.random_range(0.0..0.01)),
        altitude_meters: Some(rng.random_range(1_000.0..1_500.0)),
        downrange_meters: Some(rng.random_range(5_000.0..6_000.0)),
        velocity: Some(rng.random_range(150.0..200.0)),
        vertical_speed: Some(rng.random_range(20.0..30.0)),
        horizontal_speed: Some(rng.random_range(140.0..160.0)),
        dynamic_pressure: Some(rng.random_range(25_000.0..30_000.0)),
        accel_x: Some(rng.random_range(0.1..0.2)),
        accel_y: Some(rng.random_range(-0.05..0.05)),
        accel_z: Some(rng.random_range(2.5..3.0)),
        roll: Some(rng.random_range(-2.0..2.0)),
        pitch: Some(rng.random_range(85.0..90.0)),
        yaw: Some(rng.random_range(1.0..3.0)),
        angular_rate: Some(rng.random_range(0.5..1.5)),
        temperature_celsius: Some(rng.random_range(25.0..35.0)),
        pressure_hectopascals: Some(rng.random_range(800.0..900.0)),
        ignition_active: Some(true),
        comm_link_ok: Some(true),
        satellite_count: Some(12),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: GeoPoint = GeoPoint {
        lat: 18.7291,
        lng: 73.4642,
    };

    #[test]
    fn pad_samples_stay_at_launch_site() {
        let sim = FlightSim::new(SITE);
        let mut rng = rand::rng();
        let s = sim.next_sample(1_000, &mut rng);
        assert!(s.altitude_meters.unwrap() < 1.0);
        assert_eq!(s.ignition_active, Some(false));
        assert!((s.latitude.unwrap() - SITE.lat).abs() < 0.001);
        assert!(s.is_valid());
    }

    #[test]
    fn profile_climbs_then_descends() {
        let mut sim = FlightSim::new(SITE);
        let mut rng = rand::rng();
        sim.ignite(0);

        let boost = sim.next_sample(4_000, &mut rng);
        let coast = sim.next_sample(20_000, &mut rng);
        let descent = sim.next_sample(60_000, &mut rng);
        let landed = sim.next_sample(200_000, &mut rng);

        assert_eq!(boost.ignition_active, Some(true));
        assert!(boost.accel_z.unwrap() > 2.5);
        assert!(coast.altitude_meters.unwrap() > boost.altitude_meters.unwrap());
        assert!(descent.vertical_speed.unwrap() < 0.0);
        assert!(descent.altitude_meters.unwrap() < APOGEE_ALT_M);
        assert!(landed.altitude_meters.unwrap() < 1.0);
        assert!(landed.downrange_meters.unwrap() > coast.downrange_meters.unwrap());
    }

    #[test]
    fn ignite_is_sticky_until_reset() {
        let mut sim = FlightSim::new(SITE);
        sim.ignite(1_000);
        sim.ignite(5_000);
        assert_eq!(sim.flight_time_s(6_000), Some(5.0));
        sim.reset();
        assert!(!sim.is_ignited());
    }

    #[test]
    fn burst_stays_in_dashboard_ranges() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let s = sample_burst(SITE, &mut rng);
            let alt = s.altitude_meters.unwrap();
            assert!((1_000.0..1_500.0).contains(&alt));
            assert!((SITE.lat..SITE.lat + 0.01).contains(&s.latitude.unwrap()));
            assert_eq!(s.satellite_count, Some(12));
        }
    }
}
