//! Shared fakes for the behaviour tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use kisan_core::{
    ClassifiedError, GeoPoint, KisanConfig, MarketEntity, RawFailure, RemoteFetch, RemoteFuture,
    RemoteRequest,
};
use serde_json::{json, Value};

/// What the scripted remote does for one call.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(Value),
    Fail(ClassifiedError),
    /// Never answers; only a caller-side timeout ends the call.
    Hang,
}

impl Step {
    pub fn offline() -> Self {
        Self::Fail(RawFailure::Transport(String::from("network unreachable")).classify())
    }

    pub fn status(status: u16) -> Self {
        Self::Fail(
            RawFailure::Status {
                status,
                body: String::new(),
            }
            .classify(),
        )
    }
}

/// Remote whose answers are scripted per endpoint. Each endpoint plays its
/// steps in order and keeps repeating the last one.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<RemoteRequest>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, endpoint: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(endpoint.to_owned(), steps.into());
    }

    pub fn always(&self, endpoint: &str, step: Step) {
        self.script(endpoint, vec![step]);
    }

    pub fn calls(&self) -> Vec<RemoteRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|request| request.endpoint == endpoint)
            .count()
    }

    fn next_step(&self, endpoint: &str) -> Step {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        let Some(steps) = scripts.get_mut(endpoint) else {
            return Step::status(404);
        };
        if steps.len() > 1 {
            steps.pop_front().unwrap_or_else(|| Step::status(404))
        } else {
            steps.front().cloned().unwrap_or_else(|| Step::status(404))
        }
    }
}

impl RemoteFetch for ScriptedRemote {
    fn fetch<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a> {
        let step = self.next_step(&request.endpoint);
        self.calls.lock().expect("calls lock").push(request);
        Box::pin(async move {
            match step {
                Step::Reply(value) => Ok(value),
                Step::Fail(error) => Err(error),
                Step::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!("pending never resolves")
                }
            }
        })
    }
}

/// Configuration with fast retries and no real network.
pub fn fast_config(home: &std::path::Path) -> KisanConfig {
    KisanConfig::default()
        .with_home(home)
        .with_retry(2, Duration::from_millis(5))
        .with_tier_timeout(Duration::from_secs(5))
        .with_request_timeout(Duration::from_secs(1))
}

pub fn delhi() -> GeoPoint {
    GeoPoint::new(28.6139, 77.2090).expect("valid")
}

pub fn azadpur() -> MarketEntity {
    MarketEntity::new(
        "Azadpur",
        "Delhi",
        "North West Delhi",
        GeoPoint::new(28.7041, 77.1025).expect("valid"),
        vec![String::from("Onion"), String::from("Potato")],
    )
    .expect("valid market")
}

pub fn ludhiana() -> MarketEntity {
    MarketEntity::new(
        "Ludhiana",
        "Punjab",
        "Ludhiana",
        GeoPoint::new(30.9010, 75.8573).expect("valid"),
        vec![String::from("Wheat")],
    )
    .expect("valid market")
}

/// Listing payload as the remote service returns it.
pub fn live_listing() -> Value {
    json!([
        {
            "name": "Azadpur",
            "state": "Delhi",
            "district": "North West Delhi",
            "latitude": 28.7041,
            "longitude": 77.1025,
            "crops_available": ["Onion", "Potato", "Tomato"]
        },
        {
            "name": "Okhla",
            "state": "Delhi",
            "district": "South Delhi",
            "latitude": 28.5355,
            "longitude": 77.2910,
            "crops_available": ["Tomato", "Okra"]
        },
        {
            "name": "Ludhiana",
            "state": "Punjab",
            "district": "Ludhiana",
            "latitude": 30.9010,
            "longitude": 75.8573,
            "crops_available": ["Wheat"]
        }
    ])
}
