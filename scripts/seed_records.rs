//! Seed script for the travel records store
//!
//! Inserts a handful of sample travel records into the configured data
//! directory (`TRAVEL_DATA_DIR`, default `travel_data`). Run while the server
//! is stopped; Sled holds an exclusive lock on the directory.
//!
//! Run: cargo run --bin seed_records

use serde_json::{json, Value};

use travel_records::config::AppConfig;
use travel_records::storage::{Document, Storage, ID_FIELD};
use travel_records::validation::validate_create;

fn samples() -> Vec<Value> {
    vec![
        json!({"name": "Spring Break", "from": "NYC", "to": "LA", "days": 5, "transport": "plane"}),
        json!({"name": "Coast Drive", "from": "SF", "to": "LA", "days": 2, "transport": "car"}),
        json!({"name": "Rail Pass", "from": "Paris", "to": "Berlin", "days": 3, "transport": "train"}),
        json!({"name": "Island Hop", "from": "Athens", "to": "Santorini", "days": 7, "transport": "ferry",
               "stops": ["Mykonos", "Naxos"]}),
        json!({"name": "Business Trip", "from": "London", "to": "Dublin", "days": 1, "transport": "plane"}),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt().with_target(false).init();

    let storage = Storage::open(&config.data_dir)?;
    tracing::info!(data_dir = %config.data_dir.display(), "seeding travel records");

    let mut inserted = 0;
    for sample in samples() {
        let doc: Document = match sample {
            Value::Object(doc) => doc,
            _ => continue,
        };
        // Same checks the API applies to POST /api/records.
        if let Err(e) = validate_create(&doc) {
            tracing::warn!(error = %e, "skipping invalid sample");
            continue;
        }
        let record = storage.insert(doc)?;
        tracing::info!(record_id = %record[ID_FIELD], name = %record["name"], "inserted");
        inserted += 1;
    }

    storage.flush()?;
    tracing::info!(inserted, "seeding complete");
    Ok(())
}
