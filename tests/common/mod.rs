#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rehau_nea_smart::{Controller, Error, Observer, Referentials, Result, Transport};
use serde_json::{Value, json};

/// Captures every publish instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Published payloads parsed back into JSON.
    pub fn bodies(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|(_, body)| serde_json::from_str(body).unwrap())
            .collect()
    }
}

impl Transport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        if self.fail {
            return Err(Error::Protocol("broker unavailable".into()));
        }
        self.sent.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

pub fn counter() -> (Arc<AtomicUsize>, Observer) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let observer: Observer = Arc::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    (count, observer)
}

pub fn calls(count: &AtomicUsize) -> usize {
    count.load(Ordering::SeqCst)
}

pub fn dictionary(pairs: &[(&str, &str)]) -> Referentials {
    Referentials::from_map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    )
}

fn channel(id: &str, temp_zone: i32, setpoint_used: Value, mode: u8, humidity: i32) -> Value {
    json!({
        "_id": id,
        "humidity": humidity,
        "demand": 0,
        "setpoint_used": setpoint_used,
        "temp_zone": temp_zone,
        "mode_permanent": mode,
        "setpoint_c_normal": 770,
        "setpoint_c_reduced": 800,
        "setpoint_h_normal": 698,
        "setpoint_h_reduced": 644,
        "setpoint_h_standby": 450
    })
}

/// Two installations:
/// - `inst-1` (heating, connected): zone `z1` with one channel at 700 raw,
///   zone `z2` with two absent channels at 200 and 220 raw.
/// - `inst-2` (offline): zone `z3` with a zero target.
pub fn documents() -> Vec<Value> {
    vec![
        json!({
            "_id": "id-1",
            "unique": "inst-1",
            "outside_temp": 500,
            "outsideTempFiltered": 518,
            "connectionState": true,
            "lastConnection": "2024-01-15T08:30:00.000Z",
            "user": {"heatcool_auto_01": "01"},
            "groups": [{
                "_id": "g1",
                "name": "Ground floor",
                "zones": [
                    {
                        "_id": "z1",
                        "name": "Living",
                        "number": 1,
                        "channels": [channel("c1", 700, json!(698), 0, 45)]
                    },
                    {
                        "_id": "z2",
                        "name": "Hall",
                        "number": 2,
                        "channels": [
                            channel("c2", 200, Value::Null, 1, 0),
                            channel("c3", 220, Value::Null, 1, 0)
                        ]
                    }
                ]
            }]
        }),
        json!({
            "_id": "id-2",
            "unique": "inst-2",
            "outside_temp": 410,
            "outsideTempFiltered": 410,
            "connectionState": false,
            "lastConnection": "2024-01-15T08:30:00.000Z",
            "user": {"heatcool_auto_01": "01"},
            "groups": [{
                "_id": "g2",
                "name": "Annex",
                "zones": [{
                    "_id": "z3",
                    "name": "Office",
                    "number": 3,
                    "channels": [channel("c4", 700, json!(0), 2, 0)]
                }]
            }]
        }),
    ]
}

/// Controller loaded with [`documents`] and a `type`/`zone` dictionary.
pub fn controller(transport: RecordingTransport) -> Controller<RecordingTransport> {
    let mut controller = Controller::builder(transport).build().unwrap();
    controller.load_installations(&documents()).unwrap();
    controller.set_referentials(dictionary(&[("type", "t"), ("zone", "z")]));
    controller
}
