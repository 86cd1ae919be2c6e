//! Rider-facing distance strings ("approaching", "2 stops", "1.3 miles").

const MILES_PER_KM: f64 = 0.621371;
const FEET_PER_MILE: f64 = 5280.0;

/// Presentable distance of a vehicle from a call.
///
/// Far vehicles are described in miles, a vehicle on its last leg as
/// "at stop" or "approaching", everything else by stop count.
pub fn presentable_distance(
    stops_from_call: usize,
    distance_to_call_km: f64,
    distance_to_immediate_next_stop_km: f64,
) -> String {
    let miles_to_call = distance_to_call_km * MILES_PER_KM;
    let miles_to_next = distance_to_immediate_next_stop_km * MILES_PER_KM;

    if miles_to_next > 0.5 || (stops_from_call > 3 && miles_to_call > 0.5) {
        return miles(miles_to_call);
    }
    match stops_from_call {
        0 => {
            let feet = miles_to_call * FEET_PER_MILE;
            if feet < 100.0 {
                "at stop".to_string()
            } else if feet < 500.0 {
                "approaching".to_string()
            } else {
                miles(miles_to_call)
            }
        }
        1 => "1 stop".to_string(),
        n => format!("{n} stops"),
    }
}

fn miles(value: f64) -> String {
    let rounded = format!("{value:.1}");
    if rounded == "1.0" {
        format!("{rounded} mile")
    } else {
        format!("{rounded} miles")
    }
}
