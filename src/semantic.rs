//! Identification of well-known fields by name, so the predictor engine and
//! any downstream consumer can find "the time field" or "motor 0" without
//! depending on the declared field order.
//!
//! Grounded on the reference decoder's `identifyMainFields` /
//! `identifyGPSFields` / `identifyGPSHomeFields` / `identifySlowFields`:
//! unset indexes are `None` rather than the original's `-1` sentinel.

const MAX_MOTORS: usize = 8;
const MAX_SERVOS: usize = 8;

#[derive(Debug, Default, Clone)]
pub struct MainFieldIndexes {
    pub loop_iteration: Option<usize>,
    pub time: Option<usize>,
    pub motor: Vec<Option<usize>>,
    pub rc_command: [Option<usize>; 4],
    pub axis_p: [Option<usize>; 3],
    pub axis_i: [Option<usize>; 3],
    pub axis_d: [Option<usize>; 3],
    pub gyro: [Option<usize>; 3],
    pub acc_smooth: [Option<usize>; 3],
    pub mag_adc: [Option<usize>; 3],
    pub servo: Vec<Option<usize>>,
    pub vbat_latest: Option<usize>,
    pub amperage_latest: Option<usize>,
    pub baro_alt: Option<usize>,
    pub sonar_raw: Option<usize>,
    pub rssi: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct GpsFieldIndexes {
    pub time: Option<usize>,
    pub num_sat: Option<usize>,
    pub altitude: Option<usize>,
    pub speed: Option<usize>,
    pub ground_course: Option<usize>,
    pub coord: [Option<usize>; 2],
}

#[derive(Debug, Default, Clone)]
pub struct GpsHomeFieldIndexes {
    pub coord: [Option<usize>; 2],
}

#[derive(Debug, Default, Clone)]
pub struct SlowFieldIndexes {
    pub flight_mode_flags: Option<usize>,
    pub state_flags: Option<usize>,
    pub failsafe_phase: Option<usize>,
}

/// Parses a trailing `[N]` bracket suffix off a field name, if present.
fn bracket_index(name: &str) -> Option<(&str, usize)> {
    let open = name.find('[')?;
    if !name.ends_with(']') {
        return None;
    }
    let base = &name[..open];
    let index: usize = name[open + 1..name.len() - 1].parse().ok()?;
    Some((base, index))
}

pub fn identify_main_fields(names: &[String]) -> MainFieldIndexes {
    let mut out = MainFieldIndexes::default();
    out.motor = vec![None; MAX_MOTORS];
    out.servo = vec![None; MAX_SERVOS];

    for (ix, name) in names.iter().enumerate() {
        if name == "loopIteration" {
            out.loop_iteration = Some(ix);
        } else if name == "time" {
            out.time = Some(ix);
        } else if name == "vbatLatest" {
            out.vbat_latest = Some(ix);
        } else if name == "amperageLatest" {
            out.amperage_latest = Some(ix);
        } else if name == "BaroAlt" {
            out.baro_alt = Some(ix);
        } else if name == "sonarRaw" {
            out.sonar_raw = Some(ix);
        } else if name == "rssi" {
            out.rssi = Some(ix);
        } else if let Some((base, i)) = bracket_index(name) {
            match base {
                "motor" if i < MAX_MOTORS => out.motor[i] = Some(ix),
                "servo" if i < MAX_SERVOS => out.servo[i] = Some(ix),
                "rcCommand" if i < 4 => out.rc_command[i] = Some(ix),
                "axisP" if i < 3 => out.axis_p[i] = Some(ix),
                "axisI" if i < 3 => out.axis_i[i] = Some(ix),
                "axisD" if i < 3 => out.axis_d[i] = Some(ix),
                "gyroADC" | "gyroData" if i < 3 => out.gyro[i] = Some(ix),
                "accSmooth" if i < 3 => out.acc_smooth[i] = Some(ix),
                "magADC" if i < 3 => out.mag_adc[i] = Some(ix),
                _ => {}
            }
        }
    }
    out
}

pub fn identify_gps_fields(names: &[String]) -> GpsFieldIndexes {
    let mut out = GpsFieldIndexes::default();
    for (ix, name) in names.iter().enumerate() {
        if name == "time" {
            out.time = Some(ix);
        } else if name == "GPS_numSat" {
            out.num_sat = Some(ix);
        } else if name == "GPS_altitude" {
            out.altitude = Some(ix);
        } else if name == "GPS_speed" {
            out.speed = Some(ix);
        } else if name == "GPS_ground_course" {
            out.ground_course = Some(ix);
        } else if let Some(("GPS_coord", i)) = bracket_index(name) {
            if i < 2 {
                out.coord[i] = Some(ix);
            }
        }
    }
    out
}

pub fn identify_gps_home_fields(names: &[String]) -> GpsHomeFieldIndexes {
    let mut out = GpsHomeFieldIndexes::default();
    for (ix, name) in names.iter().enumerate() {
        if let Some(("GPS_home", i)) = bracket_index(name) {
            if i < 2 {
                out.coord[i] = Some(ix);
            }
        }
    }
    out
}

pub fn identify_slow_fields(names: &[String]) -> SlowFieldIndexes {
    let mut out = SlowFieldIndexes::default();
    for (ix, name) in names.iter().enumerate() {
        if name == "flightModeFlags" {
            out.flight_mode_flags = Some(ix);
        } else if name == "stateFlags" {
            out.state_flags = Some(ix);
        } else if name == "failsafePhase" {
            out.failsafe_phase = Some(ix);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_motor_and_time() {
        let names: Vec<String> = vec!["loopIteration", "time", "motor[0]", "motor[1]"]
            .into_iter()
            .map(String::from)
            .collect();
        let ix = identify_main_fields(&names);
        assert_eq!(ix.loop_iteration, Some(0));
        assert_eq!(ix.time, Some(1));
        assert_eq!(ix.motor[0], Some(2));
        assert_eq!(ix.motor[1], Some(3));
        assert_eq!(ix.motor[2], None);
    }

    #[test]
    fn identifies_gps_home_pair() {
        let names: Vec<String> = vec!["GPS_home[0]", "GPS_home[1]"]
            .into_iter()
            .map(String::from)
            .collect();
        let ix = identify_gps_home_fields(&names);
        assert_eq!(ix.coord[0], Some(0));
        assert_eq!(ix.coord[1], Some(1));
    }
}
